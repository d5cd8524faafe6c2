//! Index manager tests: tokenization-driven full-text search, n-gram
//! similarity ranking, and index/store consistency across mutations.

use quartzkv::index::{IndexManager, SearchMode};

// =============================================================================
// Helper Functions
// =============================================================================

fn manager_with_docs(docs: &[(&str, &str)]) -> IndexManager {
    let mut manager = IndexManager::new(3);
    for (key, value) in docs {
        manager.on_set(key.as_bytes(), value.as_bytes());
    }
    manager
}

fn keys(results: Vec<Vec<u8>>) -> Vec<String> {
    results
        .into_iter()
        .map(|k| String::from_utf8(k).unwrap())
        .collect()
}

// =============================================================================
// Full-Text Search
// =============================================================================

#[test]
fn test_and_search_intersects() {
    let manager = manager_with_docs(&[
        ("doc1", r#"{"text":"the quick brown fox"}"#),
        ("doc2", r#"{"text":"quick brown dog"}"#),
    ]);

    assert_eq!(
        keys(manager.search_text("quick brown", SearchMode::And)),
        vec!["doc1", "doc2"]
    );
    assert!(manager.search_text("fox dog", SearchMode::And).is_empty());
}

#[test]
fn test_or_search_unions() {
    let manager = manager_with_docs(&[
        ("doc1", r#"{"text":"the quick brown fox"}"#),
        ("doc2", r#"{"text":"quick brown dog"}"#),
    ]);

    assert_eq!(
        keys(manager.search_text("fox dog", SearchMode::Or)),
        vec!["doc1", "doc2"]
    );
}

#[test]
fn test_results_in_key_order() {
    let manager = manager_with_docs(&[
        ("zeta", "shared token"),
        ("alpha", "shared token"),
        ("mid", "shared token"),
    ]);

    assert_eq!(
        keys(manager.search_text("shared", SearchMode::And)),
        vec!["alpha", "mid", "zeta"]
    );
}

#[test]
fn test_query_tokenized_like_values() {
    let manager = manager_with_docs(&[("doc", "Hello, World!")]);

    // Case and punctuation differences must not matter.
    assert_eq!(
        keys(manager.search_text("HELLO... world", SearchMode::And)),
        vec!["doc"]
    );
}

#[test]
fn test_empty_query_matches_nothing() {
    let manager = manager_with_docs(&[("doc", "something")]);
    assert!(manager.search_text("", SearchMode::Or).is_empty());
    assert!(manager.search_text("!!!", SearchMode::Or).is_empty());
}

#[test]
fn test_plain_text_values_are_indexed() {
    let manager = manager_with_docs(&[("note", "groceries milk eggs")]);
    assert_eq!(
        keys(manager.search_text("milk", SearchMode::And)),
        vec!["note"]
    );
}

#[test]
fn test_binary_values_index_empty() {
    let mut manager = IndexManager::new(3);
    manager.on_set(b"blob", &[0xde, 0xad, 0xbe, 0xef, 0xff]);

    assert!(manager.search_text("dead", SearchMode::Or).is_empty());
    // Present in the n-gram index, but unmatchable.
    assert_eq!(manager.stats().indexed_keys, 1);
    assert!(manager.search_semantic("dead", 10, 0.01).is_empty());
}

// =============================================================================
// Consistency Across Mutations
// =============================================================================

#[test]
fn test_overwrite_removes_stale_tokens() {
    let mut manager = manager_with_docs(&[("doc", "original content")]);
    manager.on_set(b"doc", b"replacement words");

    assert!(manager.search_text("original", SearchMode::Or).is_empty());
    assert_eq!(
        keys(manager.search_text("replacement", SearchMode::And)),
        vec!["doc"]
    );
}

#[test]
fn test_delete_removes_all_postings() {
    let mut manager = manager_with_docs(&[("doc", "temporary entry")]);
    manager.on_delete(b"doc");

    assert!(manager.search_text("temporary", SearchMode::Or).is_empty());
    assert_eq!(manager.stats().unique_tokens, 0);
    assert_eq!(manager.stats().indexed_keys, 0);
}

#[test]
fn test_rebuild_matches_incremental() {
    let mut incremental = IndexManager::new(3);
    incremental.on_set(b"a", b"one two");
    incremental.on_set(b"b", b"two three");
    incremental.on_set(b"a", b"four");
    incremental.on_delete(b"b");

    let pairs: Vec<(Vec<u8>, Vec<u8>)> = vec![(b"a".to_vec(), b"four".to_vec())];
    let mut rebuilt = IndexManager::new(3);
    rebuilt.rebuild(pairs.iter().map(|(k, v)| (k, v)));

    assert_eq!(rebuilt.stats(), incremental.stats());
    assert_eq!(
        rebuilt.search_text("four", SearchMode::And),
        incremental.search_text("four", SearchMode::And)
    );
}

// =============================================================================
// Similarity Search
// =============================================================================

#[test]
fn test_semantic_ranks_by_jaccard() {
    let manager = manager_with_docs(&[
        ("k1", r#"{"text":"hello world"}"#),
        ("k2", r#"{"text":"help word"}"#),
    ]);

    let hits = manager.search_semantic("hello word", 2, 0.1);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, b"k1".to_vec());
    assert_eq!(hits[1].0, b"k2".to_vec());
    assert!(hits[0].1 > hits[1].1);
    assert!(hits[1].1 >= 0.1);
}

#[test]
fn test_semantic_threshold_filters() {
    let manager = manager_with_docs(&[
        ("close", "hello world"),
        ("far", "zzz qqq xxx"),
    ]);

    let hits = manager.search_semantic("hello world", 10, 0.5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].0, b"close".to_vec());
}

#[test]
fn test_semantic_top_k_cutoff() {
    let manager = manager_with_docs(&[
        ("a", "match one"),
        ("b", "match two"),
        ("c", "match three"),
    ]);

    let hits = manager.search_semantic("match", 2, 0.0);
    assert_eq!(hits.len(), 2);
}

#[test]
fn test_semantic_ties_break_by_key() {
    let manager = manager_with_docs(&[
        ("bbb", "identical text"),
        ("aaa", "identical text"),
    ]);

    let hits = manager.search_semantic("identical text", 10, 0.1);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, b"aaa".to_vec());
    assert_eq!(hits[1].0, b"bbb".to_vec());
    assert_eq!(hits[0].1, hits[1].1);
}

#[test]
fn test_semantic_exact_match_scores_one() {
    let manager = manager_with_docs(&[("k", "abcdef")]);

    let hits = manager.search_semantic("abcdef", 1, 0.0);
    assert_eq!(hits.len(), 1);
    assert!((hits[0].1 - 1.0).abs() < f32::EPSILON);
}

#[test]
fn test_semantic_short_strings_use_whole_gram() {
    let manager = manager_with_docs(&[("k", "hi")]);

    // "hi" is shorter than the gram size and matches itself exactly.
    let hits = manager.search_semantic("hi", 1, 0.5);
    assert_eq!(hits.len(), 1);
    assert!((hits[0].1 - 1.0).abs() < f32::EPSILON);
}

// =============================================================================
// Value Interpretation
// =============================================================================

#[test]
fn test_nested_json_leaves_are_concatenated() {
    let manager = manager_with_docs(&[(
        "user",
        r#"{"name":"Ada Lovelace","tags":["pioneer","math"],"age":36}"#,
    )]);

    assert_eq!(
        keys(manager.search_text("ada", SearchMode::And)),
        vec!["user"]
    );
    assert_eq!(
        keys(manager.search_text("pioneer math", SearchMode::And)),
        vec!["user"]
    );
    // Numeric leaves are not text.
    assert!(manager.search_text("36", SearchMode::Or).is_empty());
}
