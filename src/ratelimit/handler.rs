//! Consequence policies invoked when a peer exceeds a limit.
//!
//! The limiter only reports violations. What happens next (counting,
//! disconnecting, banning) is up to the [`LimitHandler`] the host installs.
//! Errors returned by a handler are logged by the limiter and go no further,
//! so a handler that wants to drop a peer has to do it from inside its
//! callback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::HandlerError;

/// Which limit a message exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Per network address
    Address,
    /// Per peer identity
    Identity,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Address => write!(f, "address"),
            Dimension::Identity => write!(f, "identity"),
        }
    }
}

/// Receives limit violations, once per offending message and dimension.
///
/// Called synchronously on the task that read the message, so
/// implementations must not block.
pub trait LimitHandler: Send + Sync {
    /// A message pushed its address over the per-address limit.
    fn on_address_limit_exceeded(&self) -> Result<(), HandlerError>;

    /// A message pushed its peer over the per-identity limit.
    fn on_identity_limit_exceeded(&self) -> Result<(), HandlerError>;

    /// Dispatch on `dimension`.
    fn on_limit_exceeded(&self, dimension: Dimension) -> Result<(), HandlerError> {
        match dimension {
            Dimension::Address => self.on_address_limit_exceeded(),
            Dimension::Identity => self.on_identity_limit_exceeded(),
        }
    }
}

impl<H: LimitHandler + ?Sized> LimitHandler for Arc<H> {
    fn on_address_limit_exceeded(&self) -> Result<(), HandlerError> {
        (**self).on_address_limit_exceeded()
    }

    fn on_identity_limit_exceeded(&self) -> Result<(), HandlerError> {
        (**self).on_identity_limit_exceeded()
    }
}

/// Handler that accepts every violation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl LimitHandler for NoopHandler {
    fn on_address_limit_exceeded(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_identity_limit_exceeded(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Violation totals per dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationCounts {
    pub address: u64,
    pub identity: u64,
}

/// Handler that counts violations per dimension.
#[derive(Debug, Default)]
pub struct MetricsHandler {
    address: AtomicU64,
    identity: AtomicU64,
}

impl MetricsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current totals.
    pub fn snapshot(&self) -> ViolationCounts {
        ViolationCounts {
            address: self.address.load(Ordering::Relaxed),
            identity: self.identity.load(Ordering::Relaxed),
        }
    }
}

impl LimitHandler for MetricsHandler {
    fn on_address_limit_exceeded(&self) -> Result<(), HandlerError> {
        self.address.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_identity_limit_exceeded(&self) -> Result<(), HandlerError> {
        self.identity.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

type ToleranceAction = Box<dyn Fn(Dimension) + Send + Sync>;

/// Handler that runs an action once violations reach a tolerance.
///
/// Each dimension is counted separately. When a dimension's count reaches
/// `tolerance`, `action` runs and the callback returns
/// [`HandlerError::ToleranceExceeded`]; this repeats for every further
/// violation. A tolerance of `0` never fires.
pub struct ToleranceHandler {
    tolerance: u64,
    address: AtomicU64,
    identity: AtomicU64,
    action: ToleranceAction,
}

impl ToleranceHandler {
    /// Create a handler that calls `action` once `tolerance` is reached.
    pub fn new<F>(tolerance: u64, action: F) -> Self
    where
        F: Fn(Dimension) + Send + Sync + 'static,
    {
        Self {
            tolerance,
            address: AtomicU64::new(0),
            identity: AtomicU64::new(0),
            action: Box::new(action),
        }
    }

    /// The configured tolerance.
    pub fn tolerance(&self) -> u64 {
        self.tolerance
    }

    /// Violation totals seen so far.
    pub fn snapshot(&self) -> ViolationCounts {
        ViolationCounts {
            address: self.address.load(Ordering::Relaxed),
            identity: self.identity.load(Ordering::Relaxed),
        }
    }

    fn record(&self, dimension: Dimension) -> Result<(), HandlerError> {
        let counter = match dimension {
            Dimension::Address => &self.address,
            Dimension::Identity => &self.identity,
        };
        let count = counter.fetch_add(1, Ordering::Relaxed) + 1;

        if self.tolerance == 0 || count < self.tolerance {
            return Ok(());
        }

        debug!(
            dimension = %dimension,
            count = count,
            tolerance = self.tolerance,
            "Violation tolerance reached"
        );
        (self.action)(dimension);
        Err(HandlerError::ToleranceExceeded {
            dimension,
            count,
            tolerance: self.tolerance,
        })
    }
}

impl fmt::Debug for ToleranceHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToleranceHandler")
            .field("tolerance", &self.tolerance)
            .field("counts", &self.snapshot())
            .finish()
    }
}

impl LimitHandler for ToleranceHandler {
    fn on_address_limit_exceeded(&self) -> Result<(), HandlerError> {
        self.record(Dimension::Address)
    }

    fn on_identity_limit_exceeded(&self) -> Result<(), HandlerError> {
        self.record(Dimension::Identity)
    }
}

/// Fans each violation out to several handlers.
///
/// Every handler is invoked, in order, even when an earlier one fails; the
/// first error is returned.
#[derive(Default)]
pub struct CompositeHandler {
    handlers: Vec<Arc<dyn LimitHandler>>,
}

impl CompositeHandler {
    pub fn new(handlers: Vec<Arc<dyn LimitHandler>>) -> Self {
        Self { handlers }
    }

    /// Append a handler.
    pub fn with(mut self, handler: Arc<dyn LimitHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether there are no handlers.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn dispatch(&self, dimension: Dimension) -> Result<(), HandlerError> {
        let mut first_err = None;
        for handler in &self.handlers {
            if let Err(e) = handler.on_limit_exceeded(dimension) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl LimitHandler for CompositeHandler {
    fn on_address_limit_exceeded(&self) -> Result<(), HandlerError> {
        self.dispatch(Dimension::Address)
    }

    fn on_identity_limit_exceeded(&self) -> Result<(), HandlerError> {
        self.dispatch(Dimension::Identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FailingHandler;

    impl LimitHandler for FailingHandler {
        fn on_address_limit_exceeded(&self) -> Result<(), HandlerError> {
            Err(HandlerError::Rejected("address".to_string()))
        }

        fn on_identity_limit_exceeded(&self) -> Result<(), HandlerError> {
            Err(HandlerError::Rejected("identity".to_string()))
        }
    }

    #[test]
    fn test_dimension_display() {
        assert_eq!(Dimension::Address.to_string(), "address");
        assert_eq!(Dimension::Identity.to_string(), "identity");
    }

    #[test]
    fn test_metrics_handler_counts_per_dimension() {
        let handler = MetricsHandler::new();
        for _ in 0..3 {
            handler.on_address_limit_exceeded().unwrap();
        }
        handler.on_limit_exceeded(Dimension::Identity).unwrap();

        assert_eq!(
            handler.snapshot(),
            ViolationCounts {
                address: 3,
                identity: 1
            }
        );
    }

    #[test]
    fn test_tolerance_handler_fires_at_tolerance() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let handler = ToleranceHandler::new(3, move |d| sink.lock().push(d));

        assert!(handler.on_identity_limit_exceeded().is_ok());
        assert!(handler.on_identity_limit_exceeded().is_ok());
        assert_eq!(
            handler.on_identity_limit_exceeded(),
            Err(HandlerError::ToleranceExceeded {
                dimension: Dimension::Identity,
                count: 3,
                tolerance: 3,
            })
        );
        // The address dimension has its own count
        assert!(handler.on_address_limit_exceeded().is_ok());

        assert_eq!(*fired.lock(), vec![Dimension::Identity]);
    }

    #[test]
    fn test_tolerance_zero_never_fires() {
        let fired = Arc::new(AtomicU64::new(0));
        let sink = fired.clone();
        let handler = ToleranceHandler::new(0, move |_| {
            sink.fetch_add(1, Ordering::Relaxed);
        });

        for _ in 0..100 {
            assert!(handler.on_address_limit_exceeded().is_ok());
        }
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        assert_eq!(handler.snapshot().address, 100);
    }

    #[test]
    fn test_composite_invokes_all_and_returns_first_error() {
        let metrics = Arc::new(MetricsHandler::new());
        let composite = CompositeHandler::default()
            .with(Arc::new(FailingHandler))
            .with(metrics.clone());

        assert_eq!(composite.len(), 2);
        assert_eq!(
            composite.on_address_limit_exceeded(),
            Err(HandlerError::Rejected("address".to_string()))
        );
        assert_eq!(metrics.snapshot().address, 1);
    }

    #[test]
    fn test_empty_composite_is_ok() {
        let composite = CompositeHandler::new(Vec::new());
        assert!(composite.is_empty());
        assert!(composite.on_identity_limit_exceeded().is_ok());
    }
}
