//! Confidence classification of a final result set.
//!
//! Levels are decided from `rerank_score` alone:
//! - HIGH: top score and at least two results at or above the high threshold,
//!   from at least two distinct sources.
//! - MEDIUM: top score at or above the medium threshold.
//! - LOW: everything else, including no results.
//!
//! Contradictions only ever compare the two top-ranked results.

use std::collections::HashSet;
use std::sync::Arc;

use localrag_core::config::RetrievalSettings;
use localrag_core::error::{Channel, Degradation};
use localrag_core::registry::VendorRegistry;
use localrag_core::types::{round_to, ConfidenceAssessment, ConfidenceLevel, Contradiction, RankedResult};

const CONTRADICTION_NOTE: &str = "Low content overlap between top results from different sources. Review both.";

#[derive(Debug, Clone)]
pub struct ConfidenceAssessor {
    high: f32,
    medium: f32,
    contradiction_overlap: f32,
    vendors: Arc<VendorRegistry>,
}

impl ConfidenceAssessor {
    pub fn new(settings: &RetrievalSettings, vendors: Arc<VendorRegistry>) -> Self {
        Self {
            high: settings.high_confidence_threshold,
            medium: settings.medium_confidence_threshold,
            contradiction_overlap: settings.contradiction_overlap,
            vendors,
        }
    }

    pub fn vendors(&self) -> &VendorRegistry { &self.vendors }

    pub fn assess(&self, results: &[RankedResult]) -> ConfidenceAssessment {
        if results.is_empty() {
            return empty_assessment("No relevant documents found in the knowledge base.".to_string());
        }

        let top_score = results.iter().map(|r| r.rerank_score).fold(f32::NEG_INFINITY, f32::max);
        let num_high = results.iter().filter(|r| r.rerank_score >= self.high).count();
        let sources = distinct_sources(results);
        let num_sources = sources.len();

        let (level, reasoning) = if top_score >= self.high && num_high >= 2 && num_sources >= 2 {
            (
                ConfidenceLevel::High,
                format!("Multiple high-confidence matches ({num_high}) from {num_sources} independent sources. Top rerank score: {top_score:.3}."),
            )
        } else if top_score >= self.medium {
            let mut limits = Vec::new();
            if num_high < 2 { limits.push(format!("only {num_high} high-confidence match(es)")); }
            if num_sources < 2 { limits.push("single source only".to_string()); }
            (
                ConfidenceLevel::Medium,
                format!("Moderate confidence. Top score: {top_score:.3}. Limitations: {}. Verify before relying on this.", limits.join("; ")),
            )
        } else {
            (
                ConfidenceLevel::Low,
                format!(
                    "Low confidence. Best match scored {top_score:.3}. The knowledge base may not cover this topic well. Consider adding relevant source material."
                ),
            )
        };

        ConfidenceAssessment {
            level,
            top_score: round_to(top_score, 4),
            num_results: results.len(),
            num_high_confidence: num_high,
            num_sources,
            contradictions: self.contradictions(results, num_sources),
            dominant_vendor: self.dominant_vendor(results),
            sources,
            reasoning,
        }
    }

    /// Like `assess`, but an empty result caused by failed channels says so.
    pub fn assess_with_degradations(&self, results: &[RankedResult], degradations: &[Degradation]) -> ConfidenceAssessment {
        if results.is_empty() && retrieval_failed(degradations) {
            let causes: Vec<String> = degradations.iter().filter(|d| d.is_fault()).map(ToString::to_string).collect();
            return empty_assessment(format!("No results: every retrieval channel failed ({}).", causes.join("; ")));
        }
        self.assess(results)
    }

    fn contradictions(&self, results: &[RankedResult], num_sources: usize) -> Vec<Contradiction> {
        let [r1, r2, ..] = results else { return Vec::new() };
        if num_sources < 2 || r1.source == r2.source || r1.rerank_score < self.medium || r2.rerank_score < self.medium {
            return Vec::new();
        }
        let overlap = word_overlap(&r1.parent_text, &r2.parent_text);
        if overlap >= self.contradiction_overlap {
            return Vec::new();
        }
        vec![Contradiction {
            source_1: r1.source.clone(),
            source_2: r2.source.clone(),
            overlap: round_to(overlap, 3),
            note: CONTRADICTION_NOTE.to_string(),
        }]
    }

    fn dominant_vendor(&self, results: &[RankedResult]) -> Option<String> {
        if results.len() < 2 {
            return None;
        }
        let mut vendors = results.iter().filter_map(|r| self.vendors.detect(&r.source));
        let first = vendors.next()?;
        vendors.all(|v| v == first).then(|| first.to_string())
    }
}

/// Jaccard overlap of the lowercase whitespace-separated word sets.
pub fn word_overlap(a: &str, b: &str) -> f32 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let wa: HashSet<&str> = a_lower.split_whitespace().collect();
    let wb: HashSet<&str> = b_lower.split_whitespace().collect();
    let union = wa.union(&wb).count().max(1);
    wa.intersection(&wb).count() as f32 / union as f32
}

fn distinct_sources(results: &[RankedResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    results.iter().filter(|r| seen.insert(r.source.as_str())).map(|r| r.source.clone()).collect()
}

/// Both legs lost: the semantic side (embedding or search) and the keyword side.
fn retrieval_failed(degradations: &[Degradation]) -> bool {
    let failed = |channels: &[Channel]| degradations.iter().any(|d| d.is_fault() && channels.contains(&d.channel()));
    failed(&[Channel::Embedding, Channel::Semantic]) && failed(&[Channel::Keyword])
}

fn empty_assessment(reasoning: String) -> ConfidenceAssessment {
    ConfidenceAssessment {
        level: ConfidenceLevel::Low,
        top_score: 0.0,
        num_results: 0,
        num_high_confidence: 0,
        num_sources: 0,
        sources: Vec::new(),
        contradictions: Vec::new(),
        dominant_vendor: None,
        reasoning,
    }
}
