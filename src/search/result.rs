//! Search response types.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// One ranked hit.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
    pub document: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curated: Option<bool>,
    pub text_match: u64,
    /// Rounded great-circle distance per geo sort field, when geo sorting.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub geo_distance_meters: BTreeMap<String, i64>,
}

impl Hit {
    pub fn doc_id(&self) -> &str {
        self.document
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// A group of hits sharing the same group-by value tuple.
#[derive(Debug, Clone, Serialize)]
pub struct GroupedHit {
    pub group_key: Vec<Value>,
    pub hits: Vec<Hit>,
}

/// Per-field facet value counts.
#[derive(Debug, Clone, Serialize)]
pub struct FacetCount {
    pub field_name: String,
    pub counts: Vec<FacetValueCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacetValueCount {
    pub value: String,
    pub count: u64,
}

/// The shaped result of one search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Matching count after overrides and hide filters; group count when
    /// grouping is active.
    pub found: usize,
    /// Total live documents in the collection.
    pub out_of: usize,
    pub page: usize,
    pub hits: Vec<Hit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grouped_hits: Vec<GroupedHit>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facet_counts: Vec<FacetCount>,
}

impl SearchResponse {
    /// Hit document ids in rank order, a convenience for assertions.
    pub fn hit_ids(&self) -> Vec<&str> {
        self.hits.iter().map(Hit::doc_id).collect()
    }
}
