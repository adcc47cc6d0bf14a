//! Configuration error types.

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting could not be parsed.
    #[error("failed to parse {name}='{value}': {source}")]
    NumberParseError {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Cache capacity must be non-zero.
    #[error("invalid cache capacity '{value}': must be greater than 0")]
    InvalidCacheCapacity { value: u64 },

    /// Cache TTL must be non-zero.
    #[error("invalid cache ttl '{value}': must be greater than 0")]
    InvalidCacheTtl { value: u32 },
}
