//! Request fingerprinting.
//!
//! The response cache is keyed by a 64-bit hash over the resolved route, the
//! request body and the effective parameter map. BLAKE3 truncated to 64 bits
//! keeps the fingerprint deterministic across processes; collisions only
//! cost a spurious cache miss, never a wrong payload, because entries are
//! re-validated by TTL and replaced on insert.

use blake3::Hasher;

use crate::params::ParamMap;

/// Parameter excluded from the fingerprint so that toggling caching does not
/// change the key.
const USE_CACHE_PARAM: &str = "use_cache";

/// Computes a 64-bit hash of arbitrary bytes (first 8 bytes of BLAKE3).
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Fingerprints one request: route id, body bytes and the parameter map
/// minus `use_cache`, in deterministic key order.
pub fn hash_request(route: &str, body: &[u8], params: &ParamMap) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(route.as_bytes());
    hasher.update(b"|");
    hasher.update(body);

    for (key, value) in params.iter() {
        if key == USE_CACHE_PARAM {
            continue;
        }
        hasher.update(b"|");
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }

    let hash = hasher.finalize();
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}
