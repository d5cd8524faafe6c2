//! Index Module
//!
//! In-memory search indexes kept in lock-step with the store.
//!
//! ## Responsibilities
//! - Inverted token index for full-text search (AND / OR)
//! - Character n-gram index for Jaccard similarity search
//! - Stay exactly consistent with the store across every mutation
//!
//! Both indexes are plain data structures; the engine mutates them under
//! its write gate and exposes them to readers behind the shared state
//! lock, so no observable point ever shows an index that disagrees with
//! the store.

mod inverted;
mod ngram;
mod tokenizer;

pub use inverted::InvertedIndex;
pub use ngram::NgramIndex;
pub use tokenizer::{extract_text, ngrams, tokenize};

/// Full-text search combinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Every query token must match
    And,
    /// Any query token may match
    Or,
}

/// Statistics over both indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    /// Distinct tokens in the inverted index
    pub unique_tokens: usize,
    /// Total (token, key) postings
    pub postings: usize,
    /// Keys present in the n-gram index
    pub indexed_keys: usize,
    /// Configured n-gram size
    pub ngram_size: usize,
}

/// Maintains both search indexes against the authoritative store
#[derive(Debug)]
pub struct IndexManager {
    inverted: InvertedIndex,
    ngram: NgramIndex,
}

impl IndexManager {
    pub fn new(ngram_size: usize) -> Self {
        Self {
            inverted: InvertedIndex::new(),
            ngram: NgramIndex::new(ngram_size),
        }
    }

    /// Index a key against its new value, replacing any prior postings.
    pub fn on_set(&mut self, key: &[u8], value: &[u8]) {
        let text = extract_text(value);
        let text = text.as_deref().unwrap_or("");
        self.inverted.insert(key, &tokenize(text));
        self.ngram.insert(key, text);
    }

    /// Drop every posting for a deleted key.
    pub fn on_delete(&mut self, key: &[u8]) {
        self.inverted.remove(key);
        self.ngram.remove(key);
    }

    /// Rebuild both indexes from scratch (recovery and snapshot install).
    pub fn rebuild<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
    {
        self.inverted = InvertedIndex::new();
        self.ngram = NgramIndex::new(self.ngram.n());
        for (key, value) in entries {
            self.on_set(key, value);
        }
    }

    /// Full-text search over indexed values.
    ///
    /// Results are in ascending key order, which makes them deterministic.
    pub fn search_text(&self, query: &str, mode: SearchMode) -> Vec<Vec<u8>> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        match mode {
            SearchMode::And => self.inverted.search_and(&tokens),
            SearchMode::Or => self.inverted.search_or(&tokens),
        }
    }

    /// Similarity search: Jaccard over n-gram sets, `score >= threshold`,
    /// top `k` by score (ties broken by ascending key).
    pub fn search_semantic(&self, query: &str, k: usize, threshold: f32) -> Vec<(Vec<u8>, f32)> {
        self.ngram.search(query, k, threshold)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            unique_tokens: self.inverted.token_count(),
            postings: self.inverted.posting_count(),
            indexed_keys: self.ngram.len(),
            ngram_size: self.ngram.n(),
        }
    }
}
