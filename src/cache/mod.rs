//! Fingerprint-keyed response cache.
//!
//! A bounded in-memory map from request fingerprint to the serialized
//! response. The backing store is a sharded concurrent cache so lookups from
//! parallel request handlers never contend on a single order list; per-entry
//! TTL is enforced at read time from the entry's creation instant, so an
//! expired entry is a miss even before eviction reclaims it.


use std::time::{Duration, Instant};

use moka::sync::Cache;
use tracing::debug;

use crate::constants::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL_SECS};

/// One cached response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status_code: u16,
    pub content_type: String,
    pub body: String,
    pub ttl_seconds: u32,
    created_at: Instant,
}

impl CachedResponse {
    pub fn new(status_code: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status_code,
            content_type: content_type.into(),
            body: body.into(),
            ttl_seconds: DEFAULT_CACHE_TTL_SECS,
            created_at: Instant::now(),
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u32) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Only 2xx responses may enter the cache.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) < Duration::from_secs(self.ttl_seconds as u64)
    }

    #[cfg(test)]
    fn backdate(mut self, elapsed: Duration) -> Self {
        self.created_at = Instant::now() - elapsed;
        self
    }
}

/// Bounded response cache keyed by request fingerprint.
pub struct ResponseCache {
    entries: Cache<u64, CachedResponse>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Looks up a fingerprint, honoring the entry's TTL.
    pub fn find(&self, fingerprint: u64) -> Option<CachedResponse> {
        let entry = self.entries.get(&fingerprint)?;
        if entry.is_fresh(Instant::now()) {
            debug!(fingerprint, "response cache hit");
            Some(entry)
        } else {
            debug!(fingerprint, "response cache entry expired");
            self.entries.remove(&fingerprint);
            None
        }
    }

    /// Inserts a successful response; non-2xx payloads are ignored.
    pub fn insert(&self, fingerprint: u64, response: CachedResponse) {
        if !response.is_success() {
            return;
        }
        debug!(fingerprint, ttl = response.ttl_seconds, "caching response");
        self.entries.insert(fingerprint, response);
    }

    /// Atomically empties the cache.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
