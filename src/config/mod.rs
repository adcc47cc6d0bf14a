//! Environment-backed configuration.
//!
//! All settings have defaults. Override with `FINDEX_*` environment variables.

pub mod error;


pub use error::ConfigError;

use std::env;

use crate::constants::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS};

/// Core configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `FINDEX_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Max entries in the response cache. Default: `1_000`.
    pub cache_capacity: u64,

    /// Default response TTL in seconds when the caller supplies none.
    /// Default: `60`.
    pub cache_ttl_seconds: u32,

    /// Bootstrap API key that authenticates every action without being
    /// stored. Empty disables it.
    pub bootstrap_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECS,
            bootstrap_key: String::new(),
        }
    }
}

impl Config {
    const ENV_CACHE_CAPACITY: &'static str = "FINDEX_CACHE_CAPACITY";
    const ENV_CACHE_TTL: &'static str = "FINDEX_CACHE_TTL";
    const ENV_BOOTSTRAP_KEY: &'static str = "FINDEX_BOOTSTRAP_KEY";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cache_capacity = Self::parse_number_from_env(
            Self::ENV_CACHE_CAPACITY,
            defaults.cache_capacity,
        )?;
        let cache_ttl_seconds =
            Self::parse_number_from_env(Self::ENV_CACHE_TTL, defaults.cache_ttl_seconds)?;
        let bootstrap_key =
            env::var(Self::ENV_BOOTSTRAP_KEY).unwrap_or(defaults.bootstrap_key);

        let config = Self {
            cache_capacity,
            cache_ttl_seconds,
            bootstrap_key,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates basic invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity {
                value: self.cache_capacity,
            });
        }
        if self.cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidCacheTtl {
                value: self.cache_ttl_seconds,
            });
        }
        Ok(())
    }

    fn parse_number_from_env<T: std::str::FromStr<Err = std::num::ParseIntError>>(
        name: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        match env::var(name) {
            Ok(value) => value.parse().map_err(|e| ConfigError::NumberParseError {
                name,
                value,
                source: e,
            }),
            Err(_) => Ok(default),
        }
    }
}
