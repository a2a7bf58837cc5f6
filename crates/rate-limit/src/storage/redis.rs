//! Redis-based rate limit storage using fixed windows and an atomic counter script.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use config::RedisConfig;
use redis::{Script, Value};

use super::redis_pool::{Pool, create_pool};
use super::{RateLimitStorage, StorageError};

/// Separator between the namespace, the client key and the window index.
const DELIMITER: char = ':';

/// Longest expiry Redis accepts once converted to an absolute millisecond deadline, with margin.
const MAX_TTL_SECONDS: u64 = (i64::MAX / 1000 / 2) as u64;

/// Absorbs float error in `rate * window` so that e.g. `0.3 * (1 / 0.3)` does not round up to 2.
const LIMIT_TOLERANCE: f64 = 1e-9;

/// Increments the window counter and arms its expiry on creation, in one atomic step.
///
/// KEYS[1] is the counter key, ARGV[1] the expiry in seconds. Returns the new count.
const ADMIT_SCRIPT: &str = r"
local current = redis.call('INCR', KEYS[1])

if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end

return current
";

/// The fixed window a rate maps to.
///
/// Rates of one request per second or more count in one-second windows. Slower rates stretch
/// the window to `1 / rate` seconds so that every window admits at least one request: 0.2
/// requests per second becomes one request per five-second window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    size: Duration,
    seconds: u64,
    limit: u64,
}

impl Window {
    /// Derive the window for a rate in requests per second.
    pub fn for_rate(requests_per_second: f64) -> Self {
        let size = if requests_per_second >= 1.0 {
            Duration::from_secs(1)
        } else {
            Duration::try_from_secs_f64(1.0 / requests_per_second).unwrap_or(Duration::MAX)
        };

        // Window indexes and expiries count whole seconds.
        let seconds = size.as_secs().max(1);
        let limit = (requests_per_second * size.as_secs_f64() - LIMIT_TOLERANCE).ceil().max(1.0) as u64;

        Self { size, seconds, limit }
    }

    /// Index of the window containing `now`. Identical on every process whose clock agrees.
    pub fn index(&self, now: SystemTime) -> u64 {
        now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() / self.seconds
    }

    /// Admissions allowed per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Exact window length.
    pub fn size(&self) -> Duration {
        self.size
    }

    /// Expiry given to a fresh counter: two windows, so a counter created near a boundary
    /// outlives its window. Capped so that `EXPIRE` never rejects it.
    pub fn ttl_seconds(&self) -> u64 {
        self.seconds.saturating_mul(2).min(MAX_TTL_SECONDS)
    }

    /// Whether the post-increment `count` is still within the limit.
    pub fn admits(&self, count: i64) -> bool {
        count <= i64::try_from(self.limit).unwrap_or(i64::MAX)
    }
}

/// Redis-based rate limit storage implementation for fleets of processes.
///
/// Every process computes the same counter key for a client in a given window, and the
/// increment plus expiry runs as one Lua script, so the fleet shares a single budget without
/// any coordination beyond Redis itself.
///
/// Admission checks fail open: a Redis error, a timeout or an unexpected reply admits the
/// request. Limiting protects the service, and an unreachable Redis must not take legitimate
/// traffic down with it.
pub struct RedisStorage {
    pool: Pool,
    script: Script,
    namespace: String,
    window: Window,
    response_timeout: Duration,
}

impl RedisStorage {
    /// Create a new Redis storage instance and verify the server answers.
    pub async fn new(requests_per_second: f64, config: &RedisConfig) -> Result<Self, StorageError> {
        let pool = create_pool(config)
            .map_err(|e| StorageError::Connection(format!("Failed to create Redis connection pool: {e}")))?;

        let storage = Self::with_pool(pool, requests_per_second, config);
        storage.ping().await?;

        Ok(storage)
    }

    fn with_pool(pool: Pool, requests_per_second: f64, config: &RedisConfig) -> Self {
        Self {
            pool,
            script: Script::new(ADMIT_SCRIPT),
            namespace: config.namespace.clone(),
            window: Window::for_rate(requests_per_second),
            response_timeout: config.response_timeout,
        }
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to get Redis connection from pool: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to ping Redis server: {e}")))?;

        Ok(())
    }

    /// The window this storage counts in.
    pub fn window(&self) -> Window {
        self.window
    }

    /// The counter key for `key` in the window containing `now`.
    pub fn record_key(&self, key: &str, now: SystemTime) -> String {
        let index = self.window.index(now);
        format!("{}{DELIMITER}{key}{DELIMITER}{index}", self.namespace)
    }

    /// Run the admission check, surfacing backend failures instead of failing open.
    pub async fn try_admit(&self, key: &str) -> Result<bool, StorageError> {
        let record = self.record_key(key, SystemTime::now());

        let count = tokio::time::timeout(self.response_timeout, self.increment(&record))
            .await
            .map_err(|_| StorageError::Timeout(self.response_timeout))??;

        log::debug!(
            "Counter '{record}' at {count} of {} allowed per {:?}",
            self.window.limit,
            self.window.size
        );

        Ok(self.window.admits(count))
    }

    async fn increment(&self, record: &str) -> Result<i64, StorageError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let reply: Value = self
            .script
            .key(record)
            .arg(self.window.ttl_seconds())
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        match reply {
            Value::Int(count) => Ok(count),
            other => Err(StorageError::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}

impl RateLimitStorage for RedisStorage {
    async fn admit(&self, key: &str) -> bool {
        match self.try_admit(key).await {
            Ok(allowed) => allowed,
            Err(e) => {
                log::warn!("Rate limit check for key '{key}' failed, allowing the request: {e}");
                true
            }
        }
    }

    async fn release(&self) -> Result<(), StorageError> {
        if !self.pool.is_closed() {
            log::debug!("Closing Redis connection pool");
            self.pool.close();
        }

        Ok(())
    }
}
