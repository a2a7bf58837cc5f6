//! Per-key admission control for Turnstile.
//!
//! This crate decides, for an opaque client key, whether one more request may proceed:
//! - In memory, with one token bucket per key, for single-process deployments
//! - In Redis, with one atomic window counter per key, for fleets sharing a budget
//!
//! [`RateLimitManager`] picks the backend from configuration. Admission checks never fail;
//! the Redis backend admits requests it cannot check.

#![deny(missing_docs)]

mod error;
mod manager;
pub mod storage;

pub use error::RateLimitError;
pub use manager::{LimiterKind, RateLimitManager};
pub use storage::{Bucket, BucketRegistry, InMemoryStorage, RateLimitStorage, RedisStorage, StorageError, Window};
