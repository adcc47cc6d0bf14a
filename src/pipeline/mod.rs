//! End-to-end request pipeline.
//!
//! [`SearchCore`] owns the process-wide state — the API key table, the
//! response cache and the per-collection handles — and runs the request
//! flow: authenticate, merge embedded parameters, consult the cache,
//! evaluate, populate the cache. Each collection handle carries its own
//! reader-writer locks so admin mutations never block queries on other
//! collections, and every query observes one consistent snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::AuthManager;
use crate::cache::{CachedResponse, ResponseCache};
use crate::collection::Collection;
use crate::config::Config;
use crate::constants::DOCUMENTS_SEARCH_ACTION;
use crate::curation::{Override, OverrideIndex};
use crate::error::{Error, Result};
use crate::hashing;
use crate::params::ParamMap;
use crate::schema::{Field, Schema};
use crate::search::{self, SearchParams, SearchResponse};
use crate::store::Store;
use crate::synonym::{Synonym, SynonymIndex};

const JSON_CONTENT_TYPE: &str = "application/json";

/// One collection with its synonym and override indexes.
///
/// The three locks are acquired in shared mode for the whole of one query
/// evaluation, so in-flight searches never see a half-applied mutation.
pub struct CollectionHandle {
    collection: RwLock<Collection>,
    synonyms: RwLock<SynonymIndex>,
    overrides: RwLock<OverrideIndex>,
}

impl CollectionHandle {
    fn new(collection: Collection) -> Self {
        Self {
            collection: RwLock::new(collection),
            synonyms: RwLock::new(SynonymIndex::new()),
            overrides: RwLock::new(OverrideIndex::new()),
        }
    }

    /// Runs a read-only closure over the collection.
    pub fn read<T>(&self, f: impl FnOnce(&Collection) -> T) -> T {
        f(&self.collection.read())
    }
}

/// The query-time core: authentication, caching and per-collection search.
pub struct SearchCore {
    config: Config,
    auth: AuthManager,
    cache: ResponseCache,
    collections: RwLock<HashMap<String, Arc<CollectionHandle>>>,
}

impl SearchCore {
    /// Builds the core over a store and loads persisted API keys.
    pub fn new(store: Arc<dyn Store>, config: Config) -> Result<Self> {
        let auth = AuthManager::new(store);
        auth.init(&config.bootstrap_key)?;
        let cache = ResponseCache::with_capacity(config.cache_capacity);

        Ok(Self {
            config,
            auth,
            cache,
            collections: RwLock::new(HashMap::new()),
        })
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    // ---- collection management ----

    pub fn create_collection(
        &self,
        name: &str,
        fields: Vec<Field>,
        default_sorting_field: Option<&str>,
    ) -> Result<()> {
        let schema = Schema::new(fields, default_sorting_field)?;

        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(Error::conflict(format!(
                "A collection with name `{name}` already exists."
            )));
        }

        info!(collection = name, "creating collection");
        collections.insert(
            name.to_string(),
            Arc::new(CollectionHandle::new(Collection::new(name, schema))),
        );
        Ok(())
    }

    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .remove(name)
            .map(|_| info!(collection = name, "dropped collection"))
            .ok_or_else(|| collection_not_found(name))
    }

    pub fn collection(&self, name: &str) -> Result<Arc<CollectionHandle>> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| collection_not_found(name))
    }

    // ---- document management ----

    pub fn add_document(&self, collection_name: &str, document: Value) -> Result<String> {
        let handle = self.collection(collection_name)?;
        let doc_id = handle.collection.write().add(document)?;
        Ok(doc_id)
    }

    pub fn remove_document(&self, collection_name: &str, doc_id: &str) -> Result<Value> {
        let handle = self.collection(collection_name)?;
        let result = handle.collection.write().remove(doc_id);
        result
    }

    // ---- synonym and override management ----

    pub fn add_synonym(&self, collection_name: &str, synonym: Synonym) -> Result<()> {
        let handle = self.collection(collection_name)?;
        let result = handle.synonyms.write().upsert(synonym);
        result
    }

    pub fn remove_synonym(&self, collection_name: &str, id: &str) -> Result<Synonym> {
        let handle = self.collection(collection_name)?;
        let result = handle.synonyms.write().remove(id);
        result
    }

    pub fn list_synonyms(&self, collection_name: &str) -> Result<Vec<Synonym>> {
        let handle = self.collection(collection_name)?;
        let synonyms = handle.synonyms.read();
        Ok(synonyms.list().into_iter().cloned().collect())
    }

    pub fn add_override(&self, collection_name: &str, rule: Override) -> Result<()> {
        let handle = self.collection(collection_name)?;
        handle.overrides.write().upsert(rule);
        Ok(())
    }

    pub fn remove_override(&self, collection_name: &str, id: &str) -> Result<Override> {
        let handle = self.collection(collection_name)?;
        let result = handle.overrides.write().remove(id);
        result
    }

    pub fn list_overrides(&self, collection_name: &str) -> Result<Vec<Override>> {
        let handle = self.collection(collection_name)?;
        let overrides = handle.overrides.read();
        Ok(overrides.list().cloned().collect())
    }

    // ---- search ----

    /// Evaluates a search against one collection under a consistent snapshot.
    pub fn search(
        &self,
        collection_name: &str,
        params: &SearchParams,
    ) -> Result<SearchResponse> {
        let handle = self.collection(collection_name)?;

        let collection = handle.collection.read();
        let synonyms = handle.synonyms.read();
        let overrides = handle.overrides.read();

        search::execute(&collection, &synonyms, &overrides, params)
    }

    /// The full request path: authenticate, merge scoped-key parameters,
    /// consult the response cache, evaluate, cache the serialized payload.
    pub fn authenticated_search(
        &self,
        presented_key: &str,
        collection_name: &str,
        req_params: &mut ParamMap,
    ) -> Result<CachedResponse> {
        let auth_result = self.auth.authenticate(
            presented_key,
            DOCUMENTS_SEARCH_ACTION,
            &[collection_name.to_string()],
        )?;

        // embedded params have higher priority than the caller's
        req_params.merge_embedded(&auth_result.embedded_params)?;

        let use_cache = req_params.use_cache();
        let route = format!("{DOCUMENTS_SEARCH_ACTION}:{collection_name}");
        let fingerprint = hashing::hash_request(&route, &[], req_params);

        if use_cache {
            if let Some(cached) = self.cache.find(fingerprint) {
                return Ok(cached);
            }
        }

        let params = SearchParams::from_param_map(req_params)?;
        let response = self.search(collection_name, &params)?;

        let body = serde_json::to_string(&response)
            .map_err(|e| Error::internal(format!("Could not serialize response: {e}")))?;

        let ttl = req_params
            .cache_ttl()
            .unwrap_or(self.config.cache_ttl_seconds);
        let payload = CachedResponse::new(200, JSON_CONTENT_TYPE, body).with_ttl(ttl);

        // only successful responses enter the cache
        if use_cache {
            debug!(fingerprint, "caching search response");
            self.cache.insert(fingerprint, payload.clone());
        }

        Ok(payload)
    }

    /// Atomically empties the response cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn collection_not_found(name: &str) -> Error {
    Error::NotFound(format!("No collection with name `{name}` found."))
}
