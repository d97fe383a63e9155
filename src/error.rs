//! Error types for Floodgate.

use thiserror::Error;

use crate::ratelimit::Dimension;

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A peer identifier that is not 32 bytes of hex
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;

/// Error returned by a [`LimitHandler`](crate::ratelimit::LimitHandler) callback.
///
/// The limiter logs these and moves on; they never leave `decorate`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// A dimension was exceeded at least `tolerance` times.
    #[error("{dimension} limit exceeded {count} times (tolerance {tolerance})")]
    ToleranceExceeded {
        dimension: Dimension,
        count: u64,
        tolerance: u64,
    },

    /// The handler refused the violation for its own reasons.
    #[error("handler rejected violation: {0}")]
    Rejected(String),
}
