//! Floodgate - Inbound message rate limiting for peer-to-peer protocols
//!
//! This crate wraps a peer's duplex message channel and counts every message
//! read from it, per network address and per peer identity, within a
//! one-second window. Messages are always delivered; when a peer goes over a
//! limit the host's [`LimitHandler`](ratelimit::LimitHandler) is notified and
//! decides what to do about it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use floodgate::p2p::{message_pipe, MessageChannel, NodeId, PeerInfo, PipeEnd, PipeError};
//! use floodgate::ratelimit::{MetricsHandler, PeerRateLimiter, RateLimitedChannel};
//!
//! async fn echo(mut rw: RateLimitedChannel<'_, PipeEnd>) -> Result<(), PipeError> {
//!     loop {
//!         let msg = rw.read_message().await?;
//!         rw.write_message(msg).await?;
//!     }
//! }
//!
//! # async fn run() {
//! let limiter = PeerRateLimiter::new(None, Arc::new(MetricsHandler::new()));
//! let peer = PeerInfo::new(NodeId::from_prefix(&[0xaa]), "10.0.0.1");
//! let (_remote, local) = message_pipe();
//!
//! let result = limiter.decorate(&peer, local, |_, rw| echo(rw)).await;
//! # let _ = result;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod p2p;
pub mod ratelimit;
