//! Table implementation
//!
//! BTreeMap-based key-value table. Mutation methods return the value they
//! displaced so the index manager can unindex it.

use std::collections::BTreeMap;

/// In-memory key-value table
#[derive(Debug, Default)]
pub struct Table {
    data: BTreeMap<Vec<u8>, Vec<u8>>,

    /// Approximate size in bytes (keys + values)
    size: usize,
}

impl Table {
    /// Create a new empty table
    pub fn new() -> Self {
        Table {
            data: BTreeMap::new(),
            size: 0,
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Option<&Vec<u8>> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.data.contains_key(key)
    }

    /// Insert a key-value pair, returning the previous value if any
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) -> Option<Vec<u8>> {
        let key_len = key.len();
        let new_len = key_len + value.len();
        let old = self.data.insert(key, value);
        let old_len = old.as_ref().map(|v| key_len + v.len()).unwrap_or(0);
        self.size = self.size + new_len - old_len;
        old
    }

    /// Remove a key, returning the previous value if any
    pub fn remove(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let old = self.data.remove(key);
        if let Some(ref v) = old {
            self.size -= key.len() + v.len();
        }
        old
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Approximate size in bytes
    pub fn byte_size(&self) -> usize {
        self.size
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.data.iter()
    }

    /// Clone all entries in key order (checkpoint and resync path)
    pub fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Replace the entire contents (snapshot install path)
    pub fn replace_all(&mut self, pairs: Vec<(Vec<u8>, Vec<u8>)>) {
        self.data = pairs.into_iter().collect();
        self.size = self
            .data
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum();
    }
}
