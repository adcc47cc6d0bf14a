//! In-memory collection: schema, inverted index, forward store and filters.
//!
//! A collection holds the documents the evaluator ranks. Text fields feed a
//! per-field inverted index keyed by normalized token; numeric, geo and raw
//! string values are kept in sidecar maps for sorting, filtering, faceting
//! and grouping. Sequence ids are assigned in insertion order and are the
//! final ranking tie-break.

pub mod filter;
pub mod geo;

pub use filter::{FilterClause, FilterExpr, NumericOp};

use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};
use crate::tokenizer;

/// A document collection with its inverted index.
#[derive(Debug)]
pub struct Collection {
    name: String,
    schema: Schema,
    next_seq_id: u32,
    docs: BTreeMap<u32, Value>,
    id_to_seq: HashMap<String, u32>,
    /// field -> token -> ascending seq ids
    text_index: HashMap<String, BTreeMap<String, Vec<u32>>>,
    numeric_values: HashMap<String, HashMap<u32, f64>>,
    geo_values: HashMap<String, HashMap<u32, (f64, f64)>>,
    /// Raw (untokenized) string values, used by filters, facets and grouping.
    string_values: HashMap<String, HashMap<u32, Vec<String>>>,
}

impl Collection {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            next_seq_id: 0,
            docs: BTreeMap::new(),
            id_to_seq: HashMap::new(),
            text_index: HashMap::new(),
            numeric_values: HashMap::new(),
            geo_values: HashMap::new(),
            string_values: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_documents(&self) -> usize {
        self.docs.len()
    }

    /// Adds a document, assigning a sequence id and indexing its fields.
    ///
    /// The document `id` defaults to the sequence id when absent. Duplicate
    /// ids conflict; schema violations are rejected before any state change.
    pub fn add(&mut self, document: Value) -> Result<String> {
        let obj = document
            .as_object()
            .ok_or_else(|| Error::invalid("Document must be a JSON object."))?;

        let doc_id = match obj.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(_) => return Err(Error::invalid("Document `id` must be a string.")),
            None => self.next_seq_id.to_string(),
        };

        if self.id_to_seq.contains_key(&doc_id) {
            return Err(Error::conflict(format!(
                "A document with id {doc_id} already exists."
            )));
        }

        self.validate_against_schema(obj)?;

        let seq_id = self.next_seq_id;
        self.next_seq_id += 1;

        let mut document = document;
        if let Some(map) = document.as_object_mut() {
            map.entry("id".to_string())
                .or_insert_with(|| Value::String(doc_id.clone()));
        }

        for field in self.schema.fields().iter().cloned().collect::<Vec<_>>() {
            let Some(value) = document.get(&field.name) else {
                continue;
            };
            self.index_field_value(&field.name, field.field_type, seq_id, value);
        }

        self.id_to_seq.insert(doc_id.clone(), seq_id);
        self.docs.insert(seq_id, document);

        debug!(collection = %self.name, doc_id = %doc_id, seq_id, "indexed document");
        Ok(doc_id)
    }

    /// Removes a document by id, unwinding all index entries.
    pub fn remove(&mut self, doc_id: &str) -> Result<Value> {
        let seq_id = *self
            .id_to_seq
            .get(doc_id)
            .ok_or_else(|| Error::NotFound(format!("Could not find a document with id: {doc_id}")))?;

        for postings in self.text_index.values_mut() {
            postings.retain(|_, seqs| {
                seqs.retain(|s| *s != seq_id);
                !seqs.is_empty()
            });
        }
        for values in self.numeric_values.values_mut() {
            values.remove(&seq_id);
        }
        for values in self.geo_values.values_mut() {
            values.remove(&seq_id);
        }
        for values in self.string_values.values_mut() {
            values.remove(&seq_id);
        }

        self.id_to_seq.remove(doc_id);
        let doc = self.docs.remove(&seq_id);
        doc.ok_or_else(|| Error::internal("Forward store out of sync with id map."))
    }

    pub fn get(&self, doc_id: &str) -> Option<&Value> {
        self.id_to_seq.get(doc_id).and_then(|seq| self.docs.get(seq))
    }

    pub fn seq_for_id(&self, doc_id: &str) -> Option<u32> {
        self.id_to_seq.get(doc_id).copied()
    }

    pub fn doc_by_seq(&self, seq_id: u32) -> Option<&Value> {
        self.docs.get(&seq_id)
    }

    pub fn doc_id_of(&self, seq_id: u32) -> Option<&str> {
        self.docs
            .get(&seq_id)
            .and_then(|d| d.get("id"))
            .and_then(Value::as_str)
    }

    /// All live sequence ids in ascending order.
    pub fn seq_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.docs.keys().copied()
    }

    /// Posting list for an exact token in a field.
    pub fn postings(&self, field: &str, token: &str) -> Option<&[u32]> {
        self.text_index
            .get(field)?
            .get(token)
            .map(Vec::as_slice)
    }

    /// Terms starting with `prefix` in a field, with their document frequency,
    /// in lexicographic term order.
    pub fn prefix_terms(&self, field: &str, prefix: &str) -> Vec<(String, usize)> {
        let Some(postings) = self.text_index.get(field) else {
            return Vec::new();
        };
        postings
            .range(prefix.to_string()..)
            .take_while(|(term, _)| term.starts_with(prefix))
            .map(|(term, seqs)| (term.clone(), seqs.len()))
            .collect()
    }

    /// All terms of a field with their document frequency.
    pub fn field_terms(&self, field: &str) -> impl Iterator<Item = (&str, usize)> {
        self.text_index
            .get(field)
            .into_iter()
            .flat_map(|postings| postings.iter().map(|(t, s)| (t.as_str(), s.len())))
    }

    pub fn numeric_value(&self, field: &str, seq_id: u32) -> Option<f64> {
        self.numeric_values.get(field)?.get(&seq_id).copied()
    }

    pub fn geo_value(&self, field: &str, seq_id: u32) -> Option<(f64, f64)> {
        self.geo_values.get(field)?.get(&seq_id).copied()
    }

    pub fn string_values(&self, field: &str, seq_id: u32) -> Option<&[String]> {
        self.string_values
            .get(field)?
            .get(&seq_id)
            .map(Vec::as_slice)
    }

    /// Evaluates a parsed filter, yielding the matching sequence ids.
    pub fn evaluate_filter(&self, expr: &FilterExpr) -> HashSet<u32> {
        self.docs
            .keys()
            .copied()
            .filter(|seq| self.matches_all_clauses(*seq, expr))
            .collect()
    }

    /// Counts facet values for `facet_fields` over `candidates`, most
    /// frequent first (ties by value).
    pub fn facet_counts(
        &self,
        facet_fields: &[String],
        candidates: &[u32],
    ) -> Vec<(String, Vec<(String, u64)>)> {
        facet_fields
            .iter()
            .map(|field| {
                let mut counts: HashMap<&str, u64> = HashMap::new();
                for seq in candidates {
                    if let Some(values) = self.string_values(field, *seq) {
                        for value in values {
                            *counts.entry(value.as_str()).or_insert(0) += 1;
                        }
                    }
                }
                let mut counts: Vec<(String, u64)> = counts
                    .into_iter()
                    .map(|(v, c)| (v.to_string(), c))
                    .collect();
                counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                (field.clone(), counts)
            })
            .collect()
    }

    fn matches_all_clauses(&self, seq_id: u32, expr: &FilterExpr) -> bool {
        expr.clauses.iter().all(|clause| match clause {
            FilterClause::Numeric { field, op, value } => {
                match self.numeric_value(field, seq_id) {
                    Some(actual) => match op {
                        NumericOp::Eq => actual == *value,
                        NumericOp::Gt => actual > *value,
                        NumericOp::Gte => actual >= *value,
                        NumericOp::Lt => actual < *value,
                        NumericOp::Lte => actual <= *value,
                    },
                    None => false,
                }
            }
            FilterClause::NumericIn { field, values } => self
                .numeric_value(field, seq_id)
                .map(|actual| values.contains(&actual))
                .unwrap_or(false),
            FilterClause::Text { field, tokens } => {
                self.text_clause_matches(field, seq_id, tokens)
            }
            FilterClause::TextIn {
                field,
                alternatives,
            } => alternatives
                .iter()
                .any(|tokens| self.text_clause_matches(field, seq_id, tokens)),
            FilterClause::Bool { field, value } => self
                .docs
                .get(&seq_id)
                .and_then(|d| d.get(field))
                .and_then(Value::as_bool)
                .map(|actual| actual == *value)
                .unwrap_or(false),
            FilterClause::GeoRadius {
                field,
                lat,
                lng,
                radius_meters,
            } => self
                .geo_value(field, seq_id)
                .map(|point| geo::distance_meters(point, (*lat, *lng)) <= *radius_meters)
                .unwrap_or(false),
        })
    }

    fn text_clause_matches(&self, field: &str, seq_id: u32, tokens: &[String]) -> bool {
        self.string_values(field, seq_id)
            .map(|values| {
                values.iter().any(|value| {
                    let value_tokens = tokenizer::tokenize(value);
                    contains_subsequence(&value_tokens, tokens)
                })
            })
            .unwrap_or(false)
    }

    fn index_field_value(&mut self, field: &str, field_type: FieldType, seq_id: u32, value: &Value) {
        match field_type {
            FieldType::String => {
                if let Some(text) = value.as_str() {
                    self.index_text(field, seq_id, text);
                    self.store_string(field, seq_id, vec![text.to_string()]);
                }
            }
            FieldType::StringArray => {
                if let Some(items) = value.as_array() {
                    let mut raw = Vec::with_capacity(items.len());
                    for item in items {
                        if let Some(text) = item.as_str() {
                            self.index_text(field, seq_id, text);
                            raw.push(text.to_string());
                        }
                    }
                    self.store_string(field, seq_id, raw);
                }
            }
            FieldType::Int32 | FieldType::Int64 | FieldType::Float => {
                if let Some(number) = value.as_f64() {
                    self.numeric_values
                        .entry(field.to_string())
                        .or_default()
                        .insert(seq_id, number);
                }
            }
            FieldType::Geopoint => {
                if let Some(pair) = value.as_array() {
                    if let (Some(lat), Some(lng)) =
                        (pair.first().and_then(Value::as_f64), pair.get(1).and_then(Value::as_f64))
                    {
                        self.geo_values
                            .entry(field.to_string())
                            .or_default()
                            .insert(seq_id, (lat, lng));
                    }
                }
            }
            FieldType::Bool => {}
        }
    }

    fn index_text(&mut self, field: &str, seq_id: u32, text: &str) {
        let postings = self.text_index.entry(field.to_string()).or_default();
        for token in tokenizer::tokenize(text) {
            let seqs = postings.entry(token).or_default();
            if seqs.last() != Some(&seq_id) {
                seqs.push(seq_id);
            }
        }
    }

    fn store_string(&mut self, field: &str, seq_id: u32, values: Vec<String>) {
        self.string_values
            .entry(field.to_string())
            .or_default()
            .insert(seq_id, values);
    }

    fn validate_against_schema(&self, obj: &serde_json::Map<String, Value>) -> Result<()> {
        for field in self.schema.fields() {
            let value = match obj.get(&field.name) {
                Some(v) => v,
                None if field.optional => continue,
                None => {
                    return Err(Error::invalid(format!(
                        "Field `{}` has been declared in the schema, but is not found in the document.",
                        field.name
                    )))
                }
            };

            let ok = match field.field_type {
                FieldType::String => value.is_string(),
                FieldType::StringArray => value
                    .as_array()
                    .map(|a| a.iter().all(Value::is_string))
                    .unwrap_or(false),
                FieldType::Int32 | FieldType::Int64 => value.is_i64() || value.is_u64(),
                FieldType::Float => value.is_number(),
                FieldType::Bool => value.is_boolean(),
                FieldType::Geopoint => value
                    .as_array()
                    .map(|a| a.len() == 2 && a.iter().all(Value::is_number))
                    .unwrap_or(false),
            };

            if !ok {
                return Err(Error::invalid(format!(
                    "Field `{}` must be a {}.",
                    field.name,
                    type_label(field.field_type)
                )));
            }
        }
        Ok(())
    }
}

fn type_label(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::StringArray => "string array",
        FieldType::Int32 => "32-bit integer",
        FieldType::Int64 => "64-bit integer",
        FieldType::Float => "float",
        FieldType::Bool => "bool",
        FieldType::Geopoint => "geopoint of [lat, lng]",
    }
}

fn contains_subsequence(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use serde_json::json;

    fn products() -> Collection {
        let schema = Schema::new(
            vec![
                Field::new("name", FieldType::String),
                Field::new("category", FieldType::String).faceted(),
                Field::new("points", FieldType::Int32),
            ],
            Some("points"),
        )
        .unwrap();

        let mut coll = Collection::new("products", schema);
        coll.add(json!({"id": "0", "name": "Amazing Shoes", "category": "shoes", "points": 3}))
            .unwrap();
        coll.add(json!({"id": "1", "name": "Track Gym", "category": "shoes", "points": 5}))
            .unwrap();
        coll
    }

    #[test]
    fn test_add_assigns_sequence_ids() {
        let coll = products();
        assert_eq!(coll.num_documents(), 2);
        assert_eq!(coll.seq_for_id("0"), Some(0));
        assert_eq!(coll.seq_for_id("1"), Some(1));
    }

    #[test]
    fn test_duplicate_id_conflicts() {
        let mut coll = products();
        let err = coll
            .add(json!({"id": "0", "name": "X", "category": "y", "points": 1}))
            .unwrap_err();
        assert_eq!(err.http_code(), 409);
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let mut coll = products();
        let err = coll.add(json!({"id": "9", "name": "X", "category": "y"})).unwrap_err();
        assert!(err.to_string().contains("`points`"));
    }

    #[test]
    fn test_postings_and_prefix_terms() {
        let coll = products();
        assert_eq!(coll.postings("name", "shoes"), Some(&[0u32][..]));
        assert!(coll.postings("name", "sandals").is_none());

        let terms = coll.prefix_terms("name", "t");
        assert_eq!(terms, vec![("track".to_string(), 1)]);
    }

    #[test]
    fn test_remove_unwinds_index() {
        let mut coll = products();
        coll.remove("0").unwrap();
        assert!(coll.postings("name", "amazing").is_none());
        assert!(coll.get("0").is_none());
        assert_eq!(coll.num_documents(), 1);
    }

    #[test]
    fn test_filter_evaluation() {
        let coll = products();
        let expr = filter::parse("category: shoes && points:>3", coll.schema()).unwrap();
        let matched = coll.evaluate_filter(&expr);
        assert_eq!(matched, HashSet::from([1]));
    }

    #[test]
    fn test_facet_counts() {
        let coll = products();
        let counts = coll.facet_counts(&["category".to_string()], &[0, 1]);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].1, vec![("shoes".to_string(), 2)]);
    }
}
