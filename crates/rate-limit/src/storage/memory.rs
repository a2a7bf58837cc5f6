//! In-memory rate limit storage using one token bucket per key.

use std::time::{Duration, Instant};

use config::MemoryConfig;

use super::{Bucket, BucketRegistry, RateLimitStorage, StorageError};

/// In-memory rate limit storage implementation for single-process deployments.
///
/// Every key owns a [`Bucket`] holding one second worth of burst. Idle buckets are evicted
/// opportunistically: each check looks at the time since the last sweep and, once the cleanup
/// interval has passed, removes buckets idle for longer than the idle timeout.
pub struct InMemoryStorage {
    registry: BucketRegistry,
    rate: f64,
    capacity: f64,
    idle_timeout: Duration,
    cleanup_interval: Duration,
}

impl InMemoryStorage {
    /// Create a new in-memory storage instance with its own registry.
    ///
    /// The rate is not validated here. Callers outside [`crate::RateLimitManager`] must pass a
    /// positive finite rate.
    pub fn new(requests_per_second: f64, config: &MemoryConfig) -> Self {
        Self::with_registry(BucketRegistry::new(), requests_per_second, config)
    }

    /// Create a storage instance around an existing registry.
    pub fn with_registry(registry: BucketRegistry, requests_per_second: f64, config: &MemoryConfig) -> Self {
        Self {
            registry,
            rate: requests_per_second,
            capacity: requests_per_second,
            idle_timeout: config.idle_timeout,
            cleanup_interval: config.cleanup_interval,
        }
    }

    /// Check and consume a token for `key`.
    pub fn check(&self, key: &str) -> bool {
        let allowed = self
            .registry
            .with_bucket(key, || Bucket::new(self.rate, self.capacity), |bucket| bucket.try_consume());

        if allowed {
            log::trace!("Request allowed for key '{key}'");
        } else {
            log::debug!("Request blocked for key '{key}' - rate limit exceeded");
        }

        self.maybe_cleanup();

        allowed
    }

    /// The bucket registry backing this storage.
    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    fn maybe_cleanup(&self) {
        let Some(evicted) = self
            .registry
            .sweep_if_due(Instant::now(), self.cleanup_interval, self.idle_timeout)
        else {
            return;
        };

        log::debug!(
            "Evicted {evicted} idle rate limit buckets, {} remaining",
            self.registry.len()
        );
    }
}

impl RateLimitStorage for InMemoryStorage {
    async fn admit(&self, key: &str) -> bool {
        self.check(key)
    }

    async fn release(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
