//! Adaptive fusion weights.
//!
//! Queries that look like specification lookups (standard codes, beta ratios,
//! micron ratings, part and catalog numbers) favour the keyword channel.

use localrag_core::config::RetrievalSettings;
use localrag_core::error::{Error, Result};
use localrag_core::registry::PatternTable;
use localrag_core::types::Weights;

/// Checked in order, case-insensitively; any match selects the spec profile.
pub const SPEC_QUERY_PATTERNS: &[&str] = &[
    r"ISO\s*\d{3,5}",
    r"NAS\s*\d{3,4}",
    r"SAE\s*AS?\s*\d{3,4}",
    r"ASTM\s*D\s*\d{3,4}",
    r"β[_\s]*\d",
    r"beta\s*ratio",
    r"µm\s*\(c\)",
    r"micron",
    r"part\s*#",
    r"model\s*#",
    r"P/N\s*\d",
    r"cat(alog)?\s*#",
    r"\b[A-Z]{2,4}[-\s]?\d{4,}",
];

#[derive(Debug, Clone)]
pub struct QueryClassifier {
    patterns: PatternTable,
    default: Weights,
    spec: Weights,
}

impl QueryClassifier {
    pub fn new(default: Weights, spec: Weights) -> Result<Self> {
        Ok(Self { patterns: PatternTable::case_insensitive(SPEC_QUERY_PATTERNS)?, default, spec })
    }

    pub fn from_settings(settings: &RetrievalSettings) -> Result<Self> {
        Self::new(settings.default_weights(), settings.spec_weights())
    }

    pub fn is_spec_query(&self, query: &str) -> bool {
        self.patterns.is_match(query)
    }

    pub fn default_weights(&self) -> Weights { self.default }

    /// Weights picked from the query text alone.
    pub fn classify(&self, query: &str) -> Weights {
        if self.is_spec_query(query) { self.spec } else { self.default }
    }

    /// Explicit weights win over classification. A single supplied weight is
    /// paired with the configured default for the other channel.
    pub fn resolve(&self, query: &str, semantic: Option<f32>, bm25: Option<f32>) -> Result<Weights> {
        if semantic.is_none() && bm25.is_none() {
            return Ok(self.classify(query));
        }
        let w = Weights::new(semantic.unwrap_or(self.default.semantic), bm25.unwrap_or(self.default.bm25));
        if !(w.semantic.is_finite() && w.bm25.is_finite()) || w.semantic < 0.0 || w.bm25 < 0.0 {
            return Err(Error::InvalidConfig(format!("weight overrides must be finite and non-negative (got {} / {})", w.semantic, w.bm25)));
        }
        Ok(w)
    }
}
