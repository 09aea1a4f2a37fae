//! Domain types shared by the retrieval channels and the hybrid engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// Metadata key holding the owning parent chunk id of a child chunk.
pub const PARENT_ID_KEY: &str = "parent_id";
/// Metadata key holding the source document name.
pub const SOURCE_KEY: &str = "source";

/// The unit indexed for search. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChildChunk {
    pub id: ChunkId,
    pub text: String,
    pub parent_id: ChunkId,
    pub metadata: Meta,
}

impl ChildChunk {
    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).map_or("unknown", String::as_str)
    }
}

/// Larger context unit delivered downstream. One parent owns many children.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParentChunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
}

/// One hit produced by a single channel.
///
/// Scores are channel-local: a semantic hit carries `semantic_score`, a keyword
/// hit carries `bm25_score`. They are not comparable before fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub child_id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub semantic_score: Option<f32>,
    pub bm25_score: Option<f32>,
}

impl SearchHit {
    pub fn semantic(child_id: impl Into<String>, text: impl Into<String>, metadata: Meta, score: f32) -> Self {
        Self { child_id: child_id.into(), text: text.into(), metadata, semantic_score: Some(score), bm25_score: None }
    }

    pub fn keyword(child_id: impl Into<String>, text: impl Into<String>, metadata: Meta, score: f32) -> Self {
        Self { child_id: child_id.into(), text: text.into(), metadata, semantic_score: None, bm25_score: Some(score) }
    }

    /// Owning parent id from metadata, or the child id when the chunk has no parent.
    pub fn parent_id(&self) -> &str {
        self.metadata.get(PARENT_ID_KEY).map_or(self.child_id.as_str(), String::as_str)
    }
}

/// Which channel(s) reported a fused candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Semantic,
    Bm25,
    Both,
}

/// A child chunk after reciprocal rank fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedCandidate {
    pub child_id: ChunkId,
    pub parent_id: ChunkId,
    pub child_text: String,
    pub metadata: Meta,
    pub semantic_score: f32,
    pub bm25_score: f32,
    pub combined_score: f32,
    pub origin: Origin,
}

/// Where a result's `rerank_score` came from.
///
/// `Fused` marks the reranker-less path where the RRF score stands in for the
/// cross-encoder probability; it is not bounded to `[0, 1]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    CrossEncoder,
    Fused,
}

/// The unit returned to callers. At most one per `parent_id` in a result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedResult {
    pub parent_id: ChunkId,
    pub parent_text: String,
    pub child_text: String,
    pub source: String,
    pub rerank_score: f32,
    pub semantic_score: f32,
    pub bm25_score: f32,
    pub combined_score: f32,
    pub score_kind: ScoreKind,
    pub metadata: Meta,
    pub parent_metadata: Meta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two top-ranked results from different sources with little shared vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contradiction {
    pub source_1: String,
    pub source_2: String,
    pub overlap: f32,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceAssessment {
    pub level: ConfidenceLevel,
    pub top_score: f32,
    pub num_results: usize,
    pub num_high_confidence: usize,
    pub num_sources: usize,
    pub sources: Vec<String>,
    pub contradictions: Vec<Contradiction>,
    pub dominant_vendor: Option<String>,
    pub reasoning: String,
}

/// Append-only record of a query the corpus could not answer confidently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GapRecord {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    #[serde(rename = "confidence_level")]
    pub level: ConfidenceLevel,
    pub top_score: f32,
    pub num_results: usize,
    #[serde(rename = "sources_checked")]
    pub sources: Vec<String>,
}

/// `(semantic_weight, bm25_weight)` used to scale each channel's RRF term.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Weights {
    pub semantic: f32,
    pub bm25: f32,
}

impl Weights {
    pub const fn new(semantic: f32, bm25: f32) -> Self {
        Self { semantic, bm25 }
    }
}

/// Equality filter over chunk metadata. All entries must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilter(pub BTreeMap<String, String>);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, meta: &Meta) -> bool {
        self.0.iter().all(|(k, v)| meta.get(k) == Some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Per-query overrides of which collections and index a search reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionRefs {
    pub child_collection: Option<String>,
    pub parent_collection: Option<String>,
    pub keyword_index: Option<String>,
}

impl CollectionRefs {
    pub fn is_empty(&self) -> bool {
        self.child_collection.is_none() && self.parent_collection.is_none() && self.keyword_index.is_none()
    }
}

/// Round to `places` decimals the way scores are reported to callers.
pub fn round_to(value: f32, places: i32) -> f32 {
    let factor = 10f32.powi(places);
    (value * factor).round() / factor
}
