//! In-memory store used by tests and embedded deployments.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use super::{ScanIter, Store, StoreStatus};

/// BTreeMap-backed store; prefix scans ride on the sorted key order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> StoreStatus {
        match self.entries.read().get(key) {
            Some(value) => StoreStatus::Found(value.clone()),
            None => StoreStatus::NotFound,
        }
    }

    fn insert(&self, key: &str, value: &str) -> bool {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        true
    }

    fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key);
        true
    }

    fn increment(&self, key: &str, delta: i64) {
        let mut entries = self.entries.write();
        let current: i64 = entries
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        entries.insert(key.to_string(), (current + delta).to_string());
    }

    fn scan_fill(&self, prefix: &str) -> Vec<String> {
        self.scan(prefix).map(|(_, v)| v).collect()
    }

    fn scan(&self, prefix: &str) -> ScanIter {
        let entries = self.entries.read();
        let matches: Vec<(String, String)> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        matches.into_iter()
    }
}
