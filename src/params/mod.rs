//! Request parameter map and merge precedence.
//!
//! Parameters live in a sorted map so that fingerprinting iterates them in a
//! canonical order. Scoped keys contribute embedded parameters merged over
//! the caller's with defined precedence: `filter_by` values conjoin, other
//! embedded values win on the scoped path.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::collection::filter;
use crate::error::{Error, Result};

/// String-valued request parameters in canonical key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamMap {
    entries: BTreeMap<String, String>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }

    /// True when `use_cache` is set to `1` or `true`.
    pub fn use_cache(&self) -> bool {
        matches!(self.get("use_cache"), Some("1") | Some("true"))
    }

    /// Caller (or embedded) cache TTL in seconds, when parseable.
    pub fn cache_ttl(&self) -> Option<u32> {
        self.get("cache_ttl").and_then(|v| v.parse().ok())
    }

    /// Merges one embedded value under the documented precedence:
    /// `expires_at` is skipped by the caller, absent keys insert, `filter_by`
    /// conjoins, and everything else overwrites only when `overwrite` is set.
    pub fn add_item(&mut self, key: &str, value: &Value, overwrite: bool) -> Result<()> {
        let str_value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => {
                return Err(Error::invalid(format!(
                    "Parameter `{key}` must be a string, number or boolean."
                )))
            }
        };

        match self.entries.get_mut(key) {
            None => {
                self.entries.insert(key.to_string(), str_value);
            }
            Some(existing) if key == "filter_by" => {
                *existing = filter::conjoin(existing, &str_value);
            }
            Some(existing) if overwrite => {
                *existing = str_value;
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Merges all embedded scoped-key parameters; embedded values have the
    /// higher priority on this path.
    pub fn merge_embedded(&mut self, embedded: &Map<String, Value>) -> Result<()> {
        for (key, value) in embedded {
            if key == "expires_at" {
                continue;
            }
            self.add_item(key, value, true)?;
        }
        Ok(())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ParamMap {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut map = Self::new();
        for (k, v) in pairs {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_key_inserts() {
        let mut params = ParamMap::new();
        params.add_item("per_page", &json!(50), false).unwrap();
        assert_eq!(params.get("per_page"), Some("50"));
    }

    #[test]
    fn test_filter_by_conjoins() {
        let mut params = ParamMap::from([("filter_by", "points:>10")]);
        params.add_item("filter_by", &json!("brand: nike"), true).unwrap();
        assert_eq!(params.get("filter_by"), Some("points:>10 && brand: nike"));
    }

    #[test]
    fn test_overwrite_flag() {
        let mut params = ParamMap::from([("per_page", "10")]);

        params.add_item("per_page", &json!(50), false).unwrap();
        assert_eq!(params.get("per_page"), Some("10"));

        params.add_item("per_page", &json!(50), true).unwrap();
        assert_eq!(params.get("per_page"), Some("50"));
    }

    #[test]
    fn test_unsupported_value_type_rejected() {
        let mut params = ParamMap::new();
        let err = params.add_item("q", &json!(["a", "b"]), true).unwrap_err();
        assert_eq!(err.http_code(), 400);
    }

    #[test]
    fn test_merge_embedded_skips_expires_at() {
        let mut params = ParamMap::new();
        let embedded = json!({"filter_by": "a:1", "expires_at": 123})
            .as_object()
            .cloned()
            .unwrap();
        params.merge_embedded(&embedded).unwrap();

        assert_eq!(params.get("filter_by"), Some("a:1"));
        assert!(!params.contains("expires_at"));
    }

    #[test]
    fn test_use_cache_flag_forms() {
        assert!(ParamMap::from([("use_cache", "1")]).use_cache());
        assert!(ParamMap::from([("use_cache", "true")]).use_cache());
        assert!(!ParamMap::from([("use_cache", "0")]).use_cache());
        assert!(!ParamMap::new().use_cache());
    }
}
