//! Rate limiting configuration structures.

use std::{path::PathBuf, time::Duration};

use duration_str::{deserialize_duration, deserialize_option_duration};
use serde::Deserialize;

/// Rate limiting configuration, the `[rate_limit]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Limiter implementation: `memory` (or empty) for a single process, `redis` for a fleet.
    ///
    /// Kept as a raw string, the limiter factory trims and lowercases it before matching.
    #[serde(rename = "type")]
    pub kind: String,
    /// Allowed requests per second per client key. Takes precedence over `limit` and `interval`.
    pub requests_per_second: Option<f64>,
    /// Allowed requests per `interval` when `requests_per_second` is not set.
    pub limit: u32,
    /// Window for `limit`.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Settings for the in-memory limiter.
    pub memory: MemoryConfig,
    /// Settings for the Redis limiter.
    pub redis: RedisConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            kind: String::new(),
            requests_per_second: None,
            limit: 1,
            interval: Duration::from_secs(1),
            memory: MemoryConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

impl RateLimitConfig {
    /// The per-key rate in requests per second.
    ///
    /// `limit = 1` with `interval = "5s"` gives `0.2`. The result is not validated here; a zero
    /// interval yields a non-finite rate which the limiter factory rejects.
    pub fn effective_rate(&self) -> f64 {
        match self.requests_per_second {
            Some(rate) => rate,
            None => f64::from(self.limit) / self.interval.as_secs_f64(),
        }
    }
}

/// In-memory limiter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Buckets untouched for longer than this are evicted.
    #[serde(deserialize_with = "deserialize_duration")]
    pub idle_timeout: Duration,
    /// Minimum time between two eviction sweeps.
    #[serde(deserialize_with = "deserialize_duration")]
    pub cleanup_interval: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

/// Redis limiter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    /// Redis connection URL (redis:// or rediss:// for TLS). Carries credentials and database.
    pub url: String,
    /// Namespace prepended to every counter key.
    pub namespace: String,
    /// Upper bound for a single admission call, connection checkout included.
    #[serde(deserialize_with = "deserialize_duration")]
    pub response_timeout: Duration,
    /// Connection pool configuration.
    pub pool: RedisPoolConfig,
    /// TLS configuration.
    pub tls: Option<RedisTlsConfig>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            namespace: "ratelimit".to_string(),
            response_timeout: Duration::from_secs(1),
            pool: RedisPoolConfig::default(),
            tls: None,
        }
    }
}

/// Redis connection pool configuration (deadpool).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisPoolConfig {
    /// Maximum number of connections.
    pub max_size: Option<usize>,
    /// Timeout for creating connections.
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub timeout_create: Option<Duration>,
    /// Timeout for waiting for a connection.
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub timeout_wait: Option<Duration>,
    /// Timeout for recycling a connection.
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub timeout_recycle: Option<Duration>,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_size: Some(16),
            timeout_create: Some(Duration::from_secs(5)),
            timeout_wait: Some(Duration::from_secs(5)),
            timeout_recycle: Some(Duration::from_secs(300)),
        }
    }
}

/// Redis TLS configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisTlsConfig {
    /// Path to CA certificate file.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to client certificate file (for mutual TLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to client key file (for mutual TLS).
    pub client_key_path: Option<PathBuf>,
}
