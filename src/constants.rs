//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants (e.g. wire lengths) from primary ones to avoid drift.

/// Maximum number of sort keys a single search may carry.
pub const MAX_SORT_FIELDS: usize = 3;

/// Per-field cap on prefix-expanded candidate terms.
pub const PREFIX_CANDIDATES_CAP: usize = 10;

/// When the collection has no default sorting field, token expansion is
/// ordered by descending document frequency and truncated to this many terms.
pub const FREQUENCY_ORDERED_TOP_K: usize = 4;

/// Default per-field drop-tokens threshold (typo budget).
pub const DROP_TOKENS_THRESHOLD: u32 = 10;

/// Length of the API key prefix embedded in scoped keys.
pub const KEY_PREFIX_LEN: usize = 4;

/// Base64 length of a 32-byte HMAC-SHA256 digest, including padding.
pub const HMAC_BASE64_LEN: usize = 44;

/// Sentinel expiry meaning "never expires".
pub const FAR_FUTURE_TIMESTAMP: u64 = 64723363199;

/// Action string scoped keys are restricted to.
pub const DOCUMENTS_SEARCH_ACTION: &str = "documents:search";

/// Default response-cache TTL in seconds when the caller supplies none.
pub const DEFAULT_CACHE_TTL_SECS: u32 = 60;

/// Default response-cache capacity (entries).
pub const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Store key holding the next API key id.
pub const KEY_NEXT_ID_KEY: &str = "$API_KEY_NEXT_ID";

/// Store key prefix under which API keys are persisted.
pub const KEYS_PREFIX: &str = "$API_KEYS";

/// Meters per kilometer, for geo sort parameter units.
pub const METERS_PER_KM: f64 = 1000.0;

/// Meters per mile, for geo sort parameter units.
pub const METERS_PER_MI: f64 = 1609.34;
