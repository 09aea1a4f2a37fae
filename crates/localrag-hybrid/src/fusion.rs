//! Weighted reciprocal rank fusion of the semantic and keyword hit lists.

use std::collections::HashMap;

use localrag_core::types::{FusedCandidate, Origin, SearchHit, Weights};

/// Smoothing constant used when no configuration overrides it.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Merge two ranked lists into at most `max_candidates` fused candidates.
///
/// Ranks are 1-based. A child missing from one list is ranked `len + 1` there,
/// so single-channel hits still score, only lower. Raw scores from both
/// channels are kept on the candidate. Ties keep first-seen order, semantic
/// list first.
pub fn reciprocal_rank_fusion(
    semantic: &[SearchHit],
    keyword: &[SearchHit],
    weights: Weights,
    rrf_k: f32,
    max_candidates: usize,
) -> Vec<FusedCandidate> {
    let semantic_ranks = rank_map(semantic);
    let keyword_ranks = rank_map(keyword);
    let semantic_missing = semantic.len() + 1;
    let keyword_missing = keyword.len() + 1;

    let mut order: Vec<&str> = Vec::with_capacity(semantic.len() + keyword.len());
    let mut by_id: HashMap<&str, FusedCandidate> = HashMap::with_capacity(semantic.len() + keyword.len());
    for hit in semantic.iter().chain(keyword) {
        let entry = by_id.entry(hit.child_id.as_str()).or_insert_with(|| {
            order.push(hit.child_id.as_str());
            FusedCandidate {
                child_id: hit.child_id.clone(),
                parent_id: hit.parent_id().to_string(),
                child_text: hit.text.clone(),
                metadata: hit.metadata.clone(),
                semantic_score: 0.0,
                bm25_score: 0.0,
                combined_score: 0.0,
                origin: Origin::Semantic,
            }
        });
        if let Some(s) = hit.semantic_score.filter(|s| *s > 0.0) { entry.semantic_score = s; }
        if let Some(s) = hit.bm25_score.filter(|s| *s > 0.0) { entry.bm25_score = s; }
    }

    let mut merged: Vec<FusedCandidate> = order
        .into_iter()
        .filter_map(|id| {
            let mut c = by_id.remove(id)?;
            let sem_rank = semantic_ranks.get(id).copied();
            let kw_rank = keyword_ranks.get(id).copied();
            c.combined_score = weights.semantic / (rrf_k + sem_rank.unwrap_or(semantic_missing) as f32)
                + weights.bm25 / (rrf_k + kw_rank.unwrap_or(keyword_missing) as f32);
            c.origin = match (sem_rank, kw_rank) {
                (Some(_), Some(_)) => Origin::Both,
                (Some(_), None) => Origin::Semantic,
                _ => Origin::Bm25,
            };
            Some(c)
        })
        .collect();

    merged.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    merged.truncate(max_candidates);
    merged
}

/// Best (first) 1-based rank of each child id in a channel list.
fn rank_map(hits: &[SearchHit]) -> HashMap<&str, usize> {
    let mut ranks = HashMap::with_capacity(hits.len());
    for (i, hit) in hits.iter().enumerate() {
        ranks.entry(hit.child_id.as_str()).or_insert(i + 1);
    }
    ranks
}
