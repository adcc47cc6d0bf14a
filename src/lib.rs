//! Findex library crate: the query-time core of a document search engine.
//!
//! # Public API Surface
//!
//! The exports are organized by module:
//!
//! ## Core Types (Stable)
//! - [`SearchCore`], [`CollectionHandle`] - Request pipeline and collection registry
//! - [`Config`], [`ConfigError`] - Environment-backed configuration
//! - [`Error`] - Five-kind error taxonomy with HTTP code mapping
//!
//! ## Query Evaluation
//! - [`SearchParams`], [`RawSortField`] - Effective request parameters
//! - [`SearchResponse`], [`Hit`], [`GroupedHit`], [`FacetCount`] - Shaped results
//! - [`SortKey`], [`SortDirection`] - Validated sort keys (numeric, text match, geo)
//!
//! ## Curation & Synonyms
//! - [`Override`], [`OverrideIndex`] - Query rewriting, pinning, hiding, dynamic filters
//! - [`Synonym`], [`SynonymIndex`] - One-way/multi-way expansion and reduction
//!
//! ## Authentication
//! - [`AuthManager`], [`ApiKey`], [`AuthResult`] - Key table and scoped-key verification
//! - [`generate_scoped_key`] - Scoped-key wire format construction
//!
//! ## Infrastructure
//! - [`Store`], [`MemoryStore`], [`StoreStatus`] - Key-value store seam
//! - [`ResponseCache`], [`CachedResponse`] - Fingerprint-keyed response cache
//! - [`ParamMap`] - Canonical request parameters with merge precedence
//! - Hashing functions for request fingerprints

pub mod auth;
pub mod cache;
pub mod collection;
pub mod config;
pub mod constants;
pub mod curation;
pub mod error;
pub mod hashing;
pub mod params;
pub mod pipeline;
pub mod schema;
pub mod search;
pub mod store;
pub mod synonym;
pub mod tokenizer;

pub use auth::{generate_scoped_key, ApiKey, AuthManager, AuthResult};
pub use cache::{CachedResponse, ResponseCache};
pub use collection::{Collection, FilterClause, FilterExpr};
pub use config::{Config, ConfigError};
pub use curation::{CurationOutcome, Include, MatchType, Override, OverrideIndex};
pub use error::{Error, Result};
pub use hashing::{hash_request, hash_to_u64};
pub use params::ParamMap;
pub use pipeline::{CollectionHandle, SearchCore};
pub use schema::{Field, FieldType, Schema};
pub use search::{
    FacetCount, FacetValueCount, GroupedHit, Hit, RawSortField, SearchParams, SearchResponse,
    SortDirection, SortKey, TEXT_MATCH_FIELD,
};
pub use store::{MemoryStore, ScanIter, Store, StoreStatus};
pub use synonym::{Synonym, SynonymIndex};
