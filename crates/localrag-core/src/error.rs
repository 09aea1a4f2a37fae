use std::time::Duration;
use thiserror::Error;

/// Hard failures surfaced to the caller of the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown {kind} reference: {name}")]
    MissingReference { kind: &'static str, name: String },

    #[error("Query cancelled")]
    Cancelled,

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A retrieval dependency the pipeline can lose without failing the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Embedding,
    Semantic,
    Keyword,
    Parents,
    Reranker,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Embedding => "embedding",
            Channel::Semantic => "semantic",
            Channel::Keyword => "keyword",
            Channel::Parents => "parents",
            Channel::Reranker => "reranker",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a channel was dropped from a query. Absorbed and reported, never raised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Degradation {
    #[error("{channel} channel unavailable: {reason}")]
    Unavailable { channel: Channel, reason: String },

    #[error("{channel} channel timed out after {}ms", after.as_millis())]
    TimedOut { channel: Channel, after: Duration },

    #[error("{channel} channel skipped: {reason}")]
    MalformedInput { channel: Channel, reason: String },
}

impl Degradation {
    pub fn unavailable(channel: Channel, reason: impl std::fmt::Display) -> Self {
        Degradation::Unavailable { channel, reason: reason.to_string() }
    }

    pub fn channel(&self) -> Channel {
        match self {
            Degradation::Unavailable { channel, .. }
            | Degradation::TimedOut { channel, .. }
            | Degradation::MalformedInput { channel, .. } => *channel,
        }
    }

    /// Malformed input is an expected short-circuit, not a dependency fault.
    pub fn is_fault(&self) -> bool {
        !matches!(self, Degradation::MalformedInput { .. })
    }
}
