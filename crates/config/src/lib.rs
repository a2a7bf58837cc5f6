//! Turnstile configuration structures to map the turnstile.toml configuration.

#![deny(missing_docs)]

mod loader;
mod rate_limit;

use std::path::Path;

pub use rate_limit::*;
use serde::Deserialize;

/// Main configuration structure for Turnstile.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Config {
    /// Load configuration from a file path, expanding `{{ env.VAR }}` references.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }
}
