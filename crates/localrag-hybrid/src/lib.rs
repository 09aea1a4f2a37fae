//! Hybrid retrieval: adaptive weighting, rank fusion, parent resolution,
//! reranking and confidence assessment over the local channels.

pub mod catalog;
pub mod citations;
pub mod classifier;
pub mod confidence;
pub mod engine;
pub mod fusion;
pub mod gap;
pub mod parents;
pub mod rerank;

pub use catalog::LocalCatalog;
pub use classifier::QueryClassifier;
pub use confidence::ConfidenceAssessor;
pub use engine::{RetrievalEngine, SearchOptions, SearchReport, VerifiedAnswer};
pub use gap::{gap_report, GapReport, GapSummary, JsonlGapSink, MemoryGapSink};
