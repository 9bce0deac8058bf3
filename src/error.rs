//! Error types for the outbox.
//!
//! The crate funnels every failure through [`OutboxError`] so callers can
//! branch on what went wrong without parsing strings. The propagation policy
//! is: nothing panics across the public boundary; invalid input and transport
//! failures are reported through `Result`, while tolerated conditions (late
//! acknowledgements, timeouts, truncation) only bump diagnostics counters and
//! emit log events.

use crate::transport::MessageId;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type OutboxResult<T> = std::result::Result<T, OutboxError>;

/// Everything that can go wrong at the public boundary.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Caller handed in input the outbox refuses to store.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Reserved: with eviction enabled the tiered allocator cannot saturate,
    /// so this only surfaces in future hard-limit modes.
    #[error("no slot available for tracking")]
    NoCapacity,

    /// The transport returned an error from its publish upcall.
    #[error("transport publish failed: {0}")]
    Transport(#[source] anyhow::Error),

    /// The transport returned a negative message id.
    #[error("transport rejected publish with id {0}")]
    TransportRejected(MessageId),

    /// Configuration file could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but failed semantic validation.
    #[error("configuration validation error: {0}")]
    Configuration(String),

    /// A pool buffer could not be allocated.
    #[error("buffer allocation failed: {0}")]
    Alloc(#[from] std::collections::TryReserveError),
}
