//! Authentication and scoped-key verification.
//!
//! Direct keys are matched by full value against the in-memory table. A key
//! that misses the table may be a *scoped* key: a base64 envelope carrying an
//! HMAC-SHA256 digest, the parent key's prefix and an embedded JSON parameter
//! map, signed under the parent value. Scoped keys are restricted to the
//! search action and inherit the tighter of the two expiries.
//!
//! The table, persisted through the [`Store`](crate::store::Store), is read
//! on every request and mutated only by administrative calls; a single
//! reader-writer lock covers both the map and the id counter so that
//! `create -> authenticate` sequences are linearizable per key.

pub mod key;


pub use key::ApiKey;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::constants::{
    DOCUMENTS_SEARCH_ACTION, HMAC_BASE64_LEN, KEYS_PREFIX, KEY_NEXT_ID_KEY, KEY_PREFIX_LEN,
};
use crate::error::{Error, Result};
use crate::store::{Store, StoreStatus};

type HmacSha256 = Hmac<Sha256>;

/// Outcome of a successful authentication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthResult {
    /// Parameters embedded in a scoped key; empty for direct keys.
    pub embedded_params: Map<String, Value>,
}

#[derive(Default)]
struct AuthState {
    keys: HashMap<String, ApiKey>,
    next_id: u32,
    bootstrap_key: String,
}

/// API key table with persistence and scoped-key verification.
pub struct AuthManager {
    store: Arc<dyn Store>,
    state: RwLock<AuthState>,
}

impl AuthManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            state: RwLock::new(AuthState::default()),
        }
    }

    /// Loads the key table and id counter from the store.
    ///
    /// Idempotent: repeated calls rebuild the same state without leaking
    /// records or advancing the counter.
    pub fn init(&self, bootstrap_key: &str) -> Result<()> {
        let mut state = self.state.write();

        state.bootstrap_key = bootstrap_key.to_string();

        state.next_id = match self.store.get(KEY_NEXT_ID_KEY) {
            StoreStatus::Found(raw) => raw.parse().map_err(|_| {
                Error::internal("Error while fetching the next API key id from the store.")
            })?,
            StoreStatus::NotFound => 0,
            StoreStatus::Error(_) => {
                return Err(Error::internal(
                    "Error while fetching the next API key id from the store.",
                ))
            }
        };

        let key_json_strs = self.store.scan_fill(KEYS_PREFIX);
        info!(count = key_json_strs.len(), "indexing API keys found on disk");

        state.keys.clear();
        for json_str in key_json_strs {
            let api_key = ApiKey::load(&json_str)?;
            state.keys.insert(api_key.value.clone(), api_key);
        }

        Ok(())
    }

    /// Number of keys currently loaded.
    pub fn num_keys(&self) -> usize {
        self.state.read().keys.len()
    }

    /// Creates a key, assigning the next id from the persistent counter.
    ///
    /// The in-memory insert happens only after the store insert succeeds, so
    /// a store failure leaves the table untouched.
    pub fn create_key(&self, mut api_key: ApiKey) -> Result<ApiKey> {
        let mut state = self.state.write();

        if state.keys.contains_key(&api_key.value) || api_key.value == state.bootstrap_key {
            return Err(Error::conflict("API key generation conflict."));
        }

        // Counter bump and store write stay inside one critical section so a
        // restart reconstructs the same maximum id.
        self.store.increment(KEY_NEXT_ID_KEY, 1);
        api_key.id = state.next_id;
        state.next_id += 1;

        let store_key = format!("{KEYS_PREFIX}/{}", api_key.id);
        if !self.store.insert(&store_key, &api_key.to_json().to_string()) {
            return Err(Error::internal("Could not store generated API key."));
        }

        state.keys.insert(api_key.value.clone(), api_key.clone());
        info!(id = api_key.id, prefix = api_key.value_prefix(), "created API key");
        Ok(api_key)
    }

    /// Fetches a key by id from the store.
    pub fn get_key(&self, id: u32, truncate: bool) -> Result<Value> {
        let store_key = format!("{KEYS_PREFIX}/{id}");
        match self.store.get(&store_key) {
            StoreStatus::Found(json_str) => {
                let api_key = ApiKey::load(&json_str)?;
                Ok(if truncate {
                    api_key.to_view_json()
                } else {
                    api_key.to_json()
                })
            }
            StoreStatus::NotFound => Err(Error::not_found()),
            StoreStatus::Error(_) => Err(Error::internal("Error while fetching key from store.")),
        }
    }

    /// Lists all keys in truncated form.
    pub fn list_keys(&self) -> Result<Vec<Value>> {
        let _guard = self.state.read();
        let mut keys = Vec::new();
        for json_str in self.store.scan_fill(KEYS_PREFIX) {
            keys.push(ApiKey::load(&json_str)?.to_view_json());
        }
        Ok(keys)
    }

    /// Removes a key by id.
    ///
    /// The in-memory entry is erased only after the store remove succeeds.
    pub fn remove_key(&self, id: u32) -> Result<Value> {
        let key_json = self.get_key(id, false)?;
        let api_key = ApiKey::load(&key_json.to_string())?;

        let store_key = format!("{KEYS_PREFIX}/{id}");
        if !self.store.remove(&store_key) {
            return Err(Error::internal("Could not delete API key."));
        }

        let mut state = self.state.write();
        state.keys.remove(&api_key.value);
        info!(id, prefix = api_key.value_prefix(), "removed API key");
        Ok(api_key.to_view_json())
    }

    /// Validates `presented` for `action` over `collections`.
    ///
    /// Direct keys return an empty parameter map; scoped keys return the
    /// embedded map for merging by the caller.
    pub fn authenticate(
        &self,
        presented: &str,
        action: &str,
        collections: &[String],
    ) -> Result<AuthResult> {
        let state = self.state.read();

        if presented == state.bootstrap_key && !state.bootstrap_key.is_empty() {
            return Ok(AuthResult::default());
        }

        if let Some(api_key) = state.keys.get(presented) {
            return if auth_against_key(api_key, action, collections, false) {
                Ok(AuthResult::default())
            } else {
                Err(Error::forbidden())
            };
        }

        // could be a scoped API key
        let embedded_params = self.verify_scoped_key(&state, presented, action, collections)?;
        Ok(AuthResult { embedded_params })
    }

    /// Scoped-key path: decode the envelope, find parent candidates by
    /// prefix in id-ascending order, verify the digest in constant time.
    fn verify_scoped_key(
        &self,
        state: &AuthState,
        presented: &str,
        action: &str,
        collections: &[String],
    ) -> Result<Map<String, Value>> {
        if action != DOCUMENTS_SEARCH_ACTION {
            error!("Scoped API keys can only be used for searches.");
            return Err(Error::forbidden());
        }

        let payload = BASE64
            .decode(presented)
            .map_err(|_| Error::forbidden())?;

        if payload.len() < HMAC_BASE64_LEN + KEY_PREFIX_LEN {
            error!("Malformed scoped API key.");
            return Err(Error::forbidden());
        }

        // layout: [digest][parent_prefix][custom_params_json]
        let digest_b64 = &payload[..HMAC_BASE64_LEN];
        let parent_prefix = &payload[HMAC_BASE64_LEN..HMAC_BASE64_LEN + KEY_PREFIX_LEN];
        let custom_params = &payload[HMAC_BASE64_LEN + KEY_PREFIX_LEN..];

        let digest = BASE64
            .decode(digest_b64)
            .map_err(|_| Error::forbidden())?;

        // Two parents may share a prefix; iterate id-ascending, first
        // matching HMAC wins.
        let mut candidates: Vec<&ApiKey> = state
            .keys
            .values()
            .filter(|key| key.value.as_bytes().starts_with(parent_prefix))
            .collect();
        candidates.sort_by_key(|key| key.id);

        for parent in candidates {
            if !auth_against_key(parent, action, collections, true) {
                error!(
                    "{}",
                    fmt_error(
                        "Parent key does not allow queries against queried collection.",
                        &parent.value
                    )
                );
                return Err(Error::forbidden());
            }

            let mut mac = HmacSha256::new_from_slice(parent.value.as_bytes())
                .map_err(|e| Error::internal(format!("HMAC failure: {e}")))?;
            mac.update(custom_params);
            if mac.verify_slice(&digest).is_err() {
                continue;
            }

            let embedded: Value = serde_json::from_slice(custom_params).map_err(|e| {
                error!("JSON error: {e}");
                Error::forbidden()
            })?;
            let Some(embedded) = embedded.as_object() else {
                error!(
                    "{}",
                    fmt_error("Scoped API key contains invalid search parameters.", &parent.value)
                );
                return Err(Error::forbidden());
            };

            if let Some(expires_at) = embedded.get("expires_at") {
                let Some(embedded_expiry) = expires_at.as_u64() else {
                    error!(
                        "{}",
                        fmt_error(
                            "Wrong format for `expires_at`. It should be an unsigned integer.",
                            &parent.value
                        )
                    );
                    return Err(Error::forbidden());
                };

                // the smaller of the two expiries takes precedence
                let effective_expiry = parent.expires_at.min(embedded_expiry);
                if unix_now() > effective_expiry {
                    error!("{}", fmt_error("Scoped API key has expired.", &parent.value));
                    return Err(Error::forbidden());
                }
            }

            return Ok(embedded.clone());
        }

        Err(Error::forbidden())
    }
}

/// Checks expiry, action grants and collection grants of one key.
///
/// `search_only` enforces the scoped-key parent constraint: the key must
/// carry exactly the search action and nothing broader.
fn auth_against_key(
    api_key: &ApiKey,
    action: &str,
    collections: &[String],
    search_only: bool,
) -> bool {
    if unix_now() > api_key.expires_at {
        error!("{}", fmt_error("Rejecting expired API key.", &api_key.value));
        return false;
    }

    if search_only {
        if api_key.actions.len() != 1 || api_key.actions[0] != DOCUMENTS_SEARCH_ACTION {
            error!(
                "{}",
                fmt_error(
                    &format!("Parent API key must allow only `{DOCUMENTS_SEARCH_ACTION}` action."),
                    &api_key.value
                )
            );
            return false;
        }
    } else if !action_is_allowed(&api_key.actions, action) {
        return false;
    }

    // even if one collection is not allowed, the entire request is rejected
    collections
        .iter()
        .all(|requested| collection_is_allowed(&api_key.collections, requested))
}

fn action_is_allowed(allowed_actions: &[String], action: &str) -> bool {
    for allowed in allowed_actions {
        if allowed == "*" || (action != "*" && allowed == action) {
            return true;
        }

        // e.g. `documents:*` covers `documents:search` and `documents:create`
        if let Some(allowed_resource) = allowed.strip_suffix(":*") {
            if action.split(':').next() == Some(allowed_resource) {
                return true;
            }
        }
    }
    false
}

fn collection_is_allowed(allowed_collections: &[String], requested: &str) -> bool {
    for allowed in allowed_collections {
        if allowed == "*" || allowed == requested || requested.is_empty() {
            return true;
        }

        // a grant may be a regex, matched against the full collection name
        if let Ok(re) = Regex::new(&format!("\\A(?:{allowed})\\z")) {
            if re.is_match(requested) {
                return true;
            }
        }
    }
    false
}

/// Builds the scoped-key wire form for a parent value and embedded params:
/// `base64( HMAC_SHA256_b64(parent, json) || parent_prefix || json )`.
pub fn generate_scoped_key(parent_value: &str, custom_params: &Value) -> Result<String> {
    let custom_json = serde_json::to_string(custom_params)
        .map_err(|e| Error::internal(format!("Could not serialize scoped params: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(parent_value.as_bytes())
        .map_err(|e| Error::internal(format!("HMAC failure: {e}")))?;
    mac.update(custom_json.as_bytes());
    let digest_b64 = BASE64.encode(mac.finalize().into_bytes());

    let prefix_end = parent_value
        .char_indices()
        .nth(KEY_PREFIX_LEN)
        .map(|(i, _)| i)
        .unwrap_or(parent_value.len());

    let mut payload = Vec::new();
    payload.extend_from_slice(digest_b64.as_bytes());
    payload.extend_from_slice(parent_value[..prefix_end].as_bytes());
    payload.extend_from_slice(custom_json.as_bytes());

    Ok(BASE64.encode(payload))
}

/// Error text carrying only the key prefix and a SHA-256 of the full value.
fn fmt_error(message: &str, key_value: &str) -> String {
    let prefix_end = key_value
        .char_indices()
        .nth(KEY_PREFIX_LEN)
        .map(|(i, _)| i)
        .unwrap_or(key_value.len());
    let sha256 = Sha256::digest(key_value.as_bytes());
    format!(
        "{message} Key prefix: {}, SHA256: {:x}",
        &key_value[..prefix_end],
        sha256
    )
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
