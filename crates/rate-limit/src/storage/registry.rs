//! The per-key bucket registry of the in-memory limiter.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::Bucket;

/// Concurrent map from client key to its bucket.
///
/// Lookups lock a single shard of the map, so traffic on one key never waits on an unrelated
/// key beyond a shard lookup. The registry also remembers when it was last swept; only
/// [`BucketRegistry::sweep_if_due`] touches that bookkeeping.
#[derive(Debug)]
pub struct BucketRegistry {
    buckets: DashMap<String, Arc<Bucket>>,
    /// Reference point for `last_sweep_nanos`.
    origin: Instant,
    /// Nanoseconds after `origin` when the last sweep finished.
    last_sweep_nanos: AtomicU64,
    /// Held for the duration of a sweep.
    sweep_lock: Mutex<()>,
}

impl BucketRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::new_at(Instant::now())
    }

    pub(crate) fn new_at(origin: Instant) -> Self {
        Self {
            buckets: DashMap::new(),
            origin,
            last_sweep_nanos: AtomicU64::new(0),
            sweep_lock: Mutex::new(()),
        }
    }

    /// Return the bucket for `key`, creating it with `create` if the key is unseen.
    ///
    /// Concurrent first requests for the same key all receive the same bucket. The returned
    /// handle may outlive the bucket's registration if a sweep evicts it; admission goes through
    /// [`BucketRegistry::with_bucket`] instead.
    pub fn get_or_insert_with(&self, key: &str, create: impl FnOnce() -> Bucket) -> Arc<Bucket> {
        self.with_bucket(key, create, Arc::clone)
    }

    /// Run `f` on the bucket for `key`, creating it with `create` if the key is unseen.
    ///
    /// The registry entry stays locked while `f` runs, so a concurrent sweep cannot evict the
    /// bucket between lookup and use. `f` must not access the registry.
    pub fn with_bucket<R>(
        &self,
        key: &str,
        create: impl FnOnce() -> Bucket,
        f: impl FnOnce(&Arc<Bucket>) -> R,
    ) -> R {
        if let Some(bucket) = self.buckets.get(key) {
            return f(bucket.value());
        }

        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(create()));

        f(bucket.value())
    }

    /// Sweep idle buckets if at least `interval` passed since the last sweep.
    ///
    /// Returns the number of evicted buckets, or `None` when no sweep ran. A caller that finds
    /// another sweep in progress skips instead of waiting.
    pub fn sweep_if_due(&self, now: Instant, interval: Duration, idle_timeout: Duration) -> Option<usize> {
        if !self.sweep_due(now, interval) {
            return None;
        }

        let _guard = self.sweep_lock.try_lock()?;

        // Another caller may have finished a sweep between the check and the lock.
        if !self.sweep_due(now, interval) {
            return None;
        }

        let before = self.buckets.len();

        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill()) < idle_timeout);

        let evicted = before.saturating_sub(self.buckets.len());
        self.last_sweep_nanos.store(self.nanos_since_origin(now), Ordering::Release);

        Some(evicted)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether `key` currently owns a bucket.
    pub fn contains(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Drop every bucket.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    fn sweep_due(&self, now: Instant, interval: Duration) -> bool {
        let last_sweep = Duration::from_nanos(self.last_sweep_nanos.load(Ordering::Acquire));
        let since_origin = now.saturating_duration_since(self.origin);

        since_origin.saturating_sub(last_sweep) >= interval
    }

    fn nanos_since_origin(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.origin).as_nanos()).unwrap_or(u64::MAX)
    }
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
