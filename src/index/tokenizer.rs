//! Text extraction, tokenization, and n-gram derivation.
//!
//! Values are opaque bytes to the store; indexing interprets them
//! best-effort. A JSON value contributes the concatenation of its string
//! leaves, bare UTF-8 text contributes itself, anything else indexes as
//! present with no tokens. The same tokenization is applied to stored
//! values and to queries.

use std::collections::HashSet;

use serde_json::Value as JsonValue;

/// Extract the searchable text from a stored value.
///
/// Returns `None` for values with no textual content.
pub fn extract_text(value: &[u8]) -> Option<String> {
    if let Ok(json) = serde_json::from_slice::<JsonValue>(value) {
        let mut leaves = Vec::new();
        collect_string_leaves(&json, &mut leaves);
        if leaves.is_empty() {
            return None;
        }
        return Some(leaves.join(" "));
    }

    match std::str::from_utf8(value) {
        Ok(text) if !text.is_empty() => Some(text.to_string()),
        _ => None,
    }
}

/// Depth-first collection of string leaves: objects in key order, arrays
/// in element order.
fn collect_string_leaves(value: &JsonValue, out: &mut Vec<String>) {
    match value {
        JsonValue::String(s) => out.push(s.clone()),
        JsonValue::Array(items) => {
            for item in items {
                collect_string_leaves(item, out);
            }
        }
        JsonValue::Object(map) => {
            for (_, item) in map {
                collect_string_leaves(item, out);
            }
        }
        _ => {}
    }
}

/// Tokenize text: lowercase, split on non-alphanumeric, drop empties.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Character n-grams of the lowercased text, spaces preserved.
///
/// A non-empty string shorter than `n` contributes itself as its single
/// gram; an empty string contributes nothing.
pub fn ngrams(text: &str, n: usize) -> HashSet<String> {
    let lowered = text.to_lowercase();
    let chars: Vec<char> = lowered.chars().collect();

    let mut grams = HashSet::new();
    if chars.is_empty() || n == 0 {
        return grams;
    }
    if chars.len() < n {
        grams.insert(lowered);
        return grams;
    }

    for window in chars.windows(n) {
        grams.insert(window.iter().collect());
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("The quick-brown FOX!"),
            vec!["the", "quick", "brown", "fox"]
        );
    }

    #[test]
    fn tokenize_drops_empties() {
        assert!(tokenize("  --  ").is_empty());
    }

    #[test]
    fn extract_text_prefers_json_leaves() {
        let text = extract_text(br#"{"text":"quick fox","count":3}"#).unwrap();
        assert_eq!(text, "quick fox");
    }

    #[test]
    fn extract_text_falls_back_to_utf8() {
        assert_eq!(extract_text(b"plain words").as_deref(), Some("plain words"));
    }

    #[test]
    fn extract_text_rejects_binary() {
        assert_eq!(extract_text(&[0xff, 0xfe, 0x00]), None);
    }

    #[test]
    fn ngrams_short_string_is_single_gram() {
        let grams = ngrams("hi", 3);
        assert_eq!(grams.len(), 1);
        assert!(grams.contains("hi"));
    }

    #[test]
    fn ngrams_preserve_spaces() {
        let grams = ngrams("a b", 3);
        assert!(grams.contains("a b"));
    }
}
