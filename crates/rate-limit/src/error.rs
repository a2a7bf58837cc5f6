//! Error types for rate limiting.

use crate::storage::StorageError;

/// Errors that can occur while constructing or releasing a rate limiter.
///
/// Admission checks never produce these; they always end in an admit or reject decision.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The configured limiter type is not recognized.
    #[error("unknown rate limiter type: {0} (supported: 'memory', 'redis')")]
    UnknownKind(String),

    /// The configured rate cannot drive a limiter.
    #[error("invalid rate of {0} requests per second, the rate must be a positive finite number")]
    InvalidRate(f64),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
