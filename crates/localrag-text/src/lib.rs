//! localrag-text
//!
//! Tantivy keyword index for child chunks: `TantivyIndexer` writes it and
//! `TantivyKeywordChannel` answers BM25 queries against it.
pub mod tantivy_utils;
pub mod index;
pub mod search;

pub use index::TantivyIndexer;
pub use search::TantivyKeywordChannel;
