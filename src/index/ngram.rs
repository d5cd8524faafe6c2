//! Character n-gram similarity index
//!
//! Stores the n-gram set of every indexed value and ranks keys against a
//! query by Jaccard similarity.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::tokenizer::ngrams;

/// N-gram index: key -> set of character n-grams of its value
#[derive(Debug)]
pub struct NgramIndex {
    n: usize,
    grams: HashMap<Vec<u8>, HashSet<String>>,
}

impl NgramIndex {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            grams: HashMap::new(),
        }
    }

    /// Configured n-gram size
    pub fn n(&self) -> usize {
        self.n
    }

    /// Index `key` against the extracted text of its value.
    pub fn insert(&mut self, key: &[u8], text: &str) {
        self.grams.insert(key.to_vec(), ngrams(text, self.n));
    }

    /// Remove `key` from the index.
    pub fn remove(&mut self, key: &[u8]) {
        self.grams.remove(key);
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.grams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grams.is_empty()
    }

    /// Rank all indexed keys by Jaccard similarity to `query`.
    ///
    /// Keys scoring below `threshold` are dropped; the remainder is
    /// sorted by descending score (ascending key on ties) and cut to
    /// `k` results.
    pub fn search(&self, query: &str, k: usize, threshold: f32) -> Vec<(Vec<u8>, f32)> {
        let query_grams = ngrams(query, self.n);
        if query_grams.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(Vec<u8>, f32)> = self
            .grams
            .iter()
            .map(|(key, doc_grams)| (key.clone(), jaccard(&query_grams, doc_grams)))
            .filter(|(_, score)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

/// Jaccard similarity `|A ∩ B| / |A ∪ B|`; empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}
