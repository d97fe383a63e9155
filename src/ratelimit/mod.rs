//! Rate limiting logic and state management.

mod clock;
mod counter;
mod decorator;
mod handler;
mod limiter;
mod registry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{WindowCounter, WINDOW};
pub use decorator::RateLimitedChannel;
pub use handler::{
    CompositeHandler, Dimension, LimitHandler, MetricsHandler, NoopHandler, ToleranceHandler,
    ViolationCounts,
};
pub use limiter::{LimiterStats, PeerRateLimiter};
pub use registry::{CounterTable, Registry};
