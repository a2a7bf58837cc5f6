//! Rate limit manager: selects and owns the configured storage backend.

use std::{fmt, str::FromStr};

use config::RateLimitConfig;

use crate::error::RateLimitError;
use crate::storage::{InMemoryStorage, RateLimitStorage, RedisStorage, StorageError};

/// The limiter implementations a configuration can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterKind {
    /// Token buckets in process memory.
    Memory,
    /// Window counters shared through Redis.
    Redis,
}

impl FromStr for LimiterKind {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            _ => Err(RateLimitError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for LimiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Redis => f.write_str("redis"),
        }
    }
}

/// Storage backend for rate limiting.
enum Storage {
    Memory(InMemoryStorage),
    Redis(RedisStorage),
}

/// Per-key admission control over whichever backend the configuration selected.
///
/// Callers only see [`RateLimitManager::admit`] and [`RateLimitManager::release`]; which
/// backend answers is decided once, in [`RateLimitManager::new`].
pub struct RateLimitManager {
    storage: Storage,
    requests_per_second: f64,
}

impl RateLimitManager {
    /// Create a new rate limit manager with the configured storage backend.
    ///
    /// Fails on an unknown limiter type, on a rate that is not a positive finite number, and,
    /// for Redis, when the server cannot be reached.
    pub async fn new(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let kind: LimiterKind = config.kind.parse()?;
        let requests_per_second = config.effective_rate();

        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(RateLimitError::InvalidRate(requests_per_second));
        }

        let storage = match kind {
            LimiterKind::Memory => Storage::Memory(InMemoryStorage::new(requests_per_second, &config.memory)),
            LimiterKind::Redis => {
                let storage = RedisStorage::new(requests_per_second, &config.redis).await?;
                Storage::Redis(storage)
            }
        };

        log::info!("Rate limiter initialized (type: {kind}, {requests_per_second:.2} requests per second per key)");

        Ok(Self {
            storage,
            requests_per_second,
        })
    }

    /// The selected backend.
    pub fn kind(&self) -> LimiterKind {
        match self.storage {
            Storage::Memory(_) => LimiterKind::Memory,
            Storage::Redis(_) => LimiterKind::Redis,
        }
    }

    /// The effective per-key rate.
    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    /// Decide whether one request for `key` may proceed.
    pub async fn admit(&self, key: &str) -> bool {
        match &self.storage {
            Storage::Memory(storage) => storage.admit(key).await,
            Storage::Redis(storage) => storage.admit(key).await,
        }
    }

    /// Release backend resources. Safe to call more than once.
    pub async fn release(&self) -> Result<(), RateLimitError> {
        RateLimitStorage::release(self).await.map_err(RateLimitError::from)
    }
}

impl RateLimitStorage for RateLimitManager {
    async fn admit(&self, key: &str) -> bool {
        RateLimitManager::admit(self, key).await
    }

    async fn release(&self) -> Result<(), StorageError> {
        match &self.storage {
            Storage::Memory(storage) => storage.release().await,
            Storage::Redis(storage) => storage.release().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use config::RedisConfig;

    use super::*;

    fn config(kind: &str, requests_per_second: f64) -> RateLimitConfig {
        RateLimitConfig {
            kind: kind.to_string(),
            requests_per_second: Some(requests_per_second),
            ..Default::default()
        }
    }

    #[test]
    fn kind_parsing_is_lenient() {
        assert_eq!("memory".parse::<LimiterKind>().unwrap(), LimiterKind::Memory);
        assert_eq!("MEMORY".parse::<LimiterKind>().unwrap(), LimiterKind::Memory);
        assert_eq!("".parse::<LimiterKind>().unwrap(), LimiterKind::Memory);
        assert_eq!("  Redis ".parse::<LimiterKind>().unwrap(), LimiterKind::Redis);
    }

    #[test]
    fn unknown_kind_names_the_value() {
        let error = "bogus".parse::<LimiterKind>().unwrap_err();

        assert_eq!(
            error.to_string(),
            "unknown rate limiter type: bogus (supported: 'memory', 'redis')"
        );
    }

    #[tokio::test]
    async fn memory_variants_build_working_limiters() {
        for kind in ["memory", "MEMORY", ""] {
            let manager = RateLimitManager::new(&config(kind, 10.0)).await.unwrap();

            assert_eq!(manager.kind(), LimiterKind::Memory);
            assert!(manager.admit("192.168.1.1").await, "first request for {kind:?}");

            manager.release().await.unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_kind_yields_no_limiter() {
        let result = RateLimitManager::new(&config("bogus", 10.0)).await;

        assert!(matches!(result, Err(RateLimitError::UnknownKind(kind)) if kind == "bogus"));
    }

    #[tokio::test]
    async fn rate_must_be_positive_and_finite() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = RateLimitManager::new(&config("memory", rate)).await;
            assert!(matches!(result, Err(RateLimitError::InvalidRate(_))), "rate {rate}");
        }

        let zero_interval = RateLimitConfig {
            interval: Duration::ZERO,
            ..Default::default()
        };

        let result = RateLimitManager::new(&zero_interval).await;
        assert!(matches!(result, Err(RateLimitError::InvalidRate(_))));
    }

    #[tokio::test]
    async fn rate_from_limit_and_interval() {
        let config = RateLimitConfig {
            limit: 1,
            interval: Duration::from_secs(5),
            ..Default::default()
        };

        let manager = RateLimitManager::new(&config).await.unwrap();

        assert!((manager.requests_per_second() - 0.2).abs() < f64::EPSILON);
        assert!(manager.admit("10.0.0.1").await);
        assert!(!manager.admit("10.0.0.1").await);
    }

    #[tokio::test]
    async fn unreachable_redis_fails_construction() {
        let config = RateLimitConfig {
            kind: "redis".to_string(),
            requests_per_second: Some(1.0),
            redis: RedisConfig {
                url: "redis://127.0.0.1:1/0".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let result = RateLimitManager::new(&config).await;

        assert!(matches!(
            result,
            Err(RateLimitError::Storage(StorageError::Connection(_)))
        ));
    }

    #[tokio::test]
    async fn manager_satisfies_the_admission_contract() {
        async fn exhaust(limiter: &impl RateLimitStorage, key: &str) -> usize {
            let mut allowed = 0;

            while limiter.admit(key).await {
                allowed += 1;
            }

            allowed
        }

        let manager = RateLimitManager::new(&config("memory", 3.0)).await.unwrap();

        assert_eq!(exhaust(&manager, "a").await, 3);
        assert_eq!(exhaust(&manager, "b").await, 3);
        assert!(RateLimitStorage::release(&manager).await.is_ok());
    }
}
