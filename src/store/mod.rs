//! Key-value store interface consumed by the core.
//!
//! Durability and replication live behind this seam; the core only needs
//! point reads, prefix scans, a counter increment and insert/remove. An
//! in-memory implementation is provided for tests and embedded use.

pub mod memory;

pub use memory::MemoryStore;

/// Outcome of a point read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// Key present, value attached.
    Found(String),
    /// Key absent.
    NotFound,
    /// The store itself failed.
    Error(String),
}

/// Iterator over key/value pairs under a prefix, in lexicographic key order.
///
/// The iterator owns a snapshot of the matching range; dropping it releases
/// everything it holds, on every exit path.
pub type ScanIter = std::vec::IntoIter<(String, String)>;

/// Store operations the core depends on.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> StoreStatus;

    /// Inserts or overwrites; returns false on store failure.
    fn insert(&self, key: &str, value: &str) -> bool;

    /// Removes the key; returns false on store failure.
    fn remove(&self, key: &str) -> bool;

    /// Adds `delta` to the integer value at `key`, initializing absent keys to 0.
    fn increment(&self, key: &str, delta: i64);

    /// Collects all values under `prefix` in lexicographic key order.
    fn scan_fill(&self, prefix: &str) -> Vec<String>;

    /// Opens an iterator over key/value pairs under `prefix`.
    fn scan(&self, prefix: &str) -> ScanIter;
}
