//! Inverted token index
//!
//! Maps each token to the ordered set of keys whose current value
//! contains it. Per-key token lists are tracked so an overwrite or
//! delete removes exactly the stale postings.

use std::collections::{BTreeSet, HashMap};

/// Inverted index: token -> set of keys
#[derive(Debug, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, BTreeSet<Vec<u8>>>,

    /// Tokens currently posted for each key (deduplicated)
    key_tokens: HashMap<Vec<u8>, Vec<String>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post `tokens` for `key`, replacing whatever was posted before.
    pub fn insert(&mut self, key: &[u8], tokens: &[String]) {
        self.remove(key);

        let unique: BTreeSet<&String> = tokens.iter().collect();
        let mut posted = Vec::with_capacity(unique.len());
        for token in unique {
            self.postings
                .entry(token.clone())
                .or_default()
                .insert(key.to_vec());
            posted.push(token.clone());
        }
        if !posted.is_empty() {
            self.key_tokens.insert(key.to_vec(), posted);
        }
    }

    /// Remove every posting for `key`.
    pub fn remove(&mut self, key: &[u8]) {
        let Some(tokens) = self.key_tokens.remove(key) else {
            return;
        };
        for token in tokens {
            if let Some(keys) = self.postings.get_mut(&token) {
                keys.remove(key);
                if keys.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }
    }

    /// Keys whose values contain every token, ascending key order.
    pub fn search_and(&self, tokens: &[String]) -> Vec<Vec<u8>> {
        let mut sets = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.postings.get(token) {
                Some(keys) => sets.push(keys),
                // One missing token empties the intersection.
                None => return Vec::new(),
            }
        }

        let Some((first, rest)) = sets.split_first() else {
            return Vec::new();
        };

        first
            .iter()
            .filter(|key| rest.iter().all(|set| set.contains(*key)))
            .cloned()
            .collect()
    }

    /// Keys whose values contain any token, ascending key order.
    pub fn search_or(&self, tokens: &[String]) -> Vec<Vec<u8>> {
        let mut result = BTreeSet::new();
        for token in tokens {
            if let Some(keys) = self.postings.get(token) {
                result.extend(keys.iter().cloned());
            }
        }
        result.into_iter().collect()
    }

    /// Distinct tokens in the index
    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    /// Total (token, key) postings
    pub fn posting_count(&self) -> usize {
        self.postings.values().map(BTreeSet::len).sum()
    }
}
