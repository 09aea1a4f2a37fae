//! Query/index tokenizer for the keyword channel.
//!
//! Keeps technical identifiers intact: `16/14/11`, `dhp-1234`, `3.5`.

use regex::Regex;
use std::sync::LazyLock;

/// Token pattern shared by the query side and the index analyzer.
pub const BM25_TOKEN_PATTERN: &str = r"[a-zA-Z0-9][\w/\-\.]*[a-zA-Z0-9]|[a-zA-Z0-9]";

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(BM25_TOKEN_PATTERN).unwrap());

/// Lowercase `text` and split it into BM25 terms.
pub fn tokenize_for_bm25(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}
