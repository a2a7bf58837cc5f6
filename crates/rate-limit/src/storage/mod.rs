//! Storage backends for rate limiting.

use std::time::Duration;

mod bucket;
pub mod memory;
pub mod redis;
mod redis_pool;
mod registry;

pub use bucket::Bucket;
pub use memory::InMemoryStorage;
pub use redis::{RedisStorage, Window};
pub use registry::BucketRegistry;

/// The admission contract every limiter backend satisfies.
///
/// Callers never learn which backend answered: the decision is a plain boolean and backend
/// failures during a check are absorbed by the backend itself.
#[allow(async_fn_in_trait)]
pub trait RateLimitStorage: Send + Sync {
    /// Decide whether one request for `key` may proceed. Never fails.
    async fn admit(&self, key: &str) -> bool;

    /// Release any held resources. Calling it again after success is a no-op.
    async fn release(&self) -> Result<(), StorageError>;
}

/// Errors that can occur in storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached or a connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed a command.
    #[error("Query error: {0}")]
    Query(String),

    /// The backend did not answer in time.
    #[error("Backend did not respond within {0:?}")]
    Timeout(Duration),

    /// The backend answered with something other than a counter.
    #[error("Unexpected response from backend: {0}")]
    UnexpectedResponse(String),
}
