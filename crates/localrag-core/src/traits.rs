use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CollectionRefs, GapRecord, MetadataFilter, ParentChunk, SearchHit};

/// Batch text embedder. Implementations return L2-normalized vectors of `dim()`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Joint (query, passage) scorer. Returns one raw logit per pair.
pub trait CrossEncoder: Send + Sync {
    fn predict(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>>;
}

/// Similarity-ranked child chunks for a query vector, best first.
#[async_trait]
pub trait SemanticChannel: Send + Sync {
    async fn query(&self, vector: &[f32], k: usize, filter: Option<&MetadataFilter>) -> anyhow::Result<Vec<SearchHit>>;
}

/// BM25-ranked child chunks for tokenized query terms, best first.
#[async_trait]
pub trait KeywordChannel: Send + Sync {
    async fn score(&self, tokens: &[String], k: usize, filter: Option<&MetadataFilter>) -> anyhow::Result<Vec<SearchHit>>;
}

/// Lookup of parent (context) chunks by id. Unknown ids are simply absent.
#[async_trait]
pub trait ParentStore: Send + Sync {
    async fn fetch(&self, ids: &[String]) -> anyhow::Result<HashMap<String, ParentChunk>>;
}

/// Best-effort receiver of low-confidence queries.
pub trait GapSink: Send + Sync {
    fn append(&self, record: &GapRecord) -> anyhow::Result<()>;
}

/// The read handles one query runs against.
#[derive(Clone)]
pub struct Backends {
    pub semantic: Arc<dyn SemanticChannel>,
    pub keyword: Arc<dyn KeywordChannel>,
    pub parents: Arc<dyn ParentStore>,
}

/// Turns per-query collection references into concrete backends.
///
/// Unknown references are a configuration error, not a degradation.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    async fn resolve(&self, refs: &CollectionRefs) -> Result<Backends>;
}
