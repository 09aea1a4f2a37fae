//! Cross-encoder reranking and result shaping.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use localrag_core::error::{Channel, Degradation};
use localrag_core::lazy::Lazy;
use localrag_core::traits::CrossEncoder;
use localrag_core::types::{round_to, RankedResult, ScoreKind, SOURCE_KEY};
use localrag_embed::sigmoid;

use crate::parents::ResolvedCandidate;

/// Score `(query, parent_text)` pairs, map logits through a sigmoid and keep the
/// best `top_k` by that probability.
///
/// Model loading is not subject to `timeout`; inference is.
pub async fn rerank(
    encoder: &Lazy<dyn CrossEncoder>,
    query: &str,
    candidates: Vec<ResolvedCandidate>,
    top_k: usize,
    timeout: Duration,
) -> Result<Vec<RankedResult>, Degradation> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let model: Arc<dyn CrossEncoder> = encoder.get().await.map_err(|e| Degradation::unavailable(Channel::Reranker, e))?;
    let pairs: Vec<(String, String)> = candidates.iter().map(|c| (query.to_string(), c.parent_text.clone())).collect();
    let expected = pairs.len();

    let task = tokio::task::spawn_blocking(move || model.predict(&pairs));
    let logits = match tokio::time::timeout(timeout, task).await {
        Err(_) => return Err(Degradation::TimedOut { channel: Channel::Reranker, after: timeout }),
        Ok(Err(join)) => return Err(Degradation::unavailable(Channel::Reranker, join)),
        Ok(Ok(Err(e))) => return Err(Degradation::unavailable(Channel::Reranker, e)),
        Ok(Ok(Ok(logits))) => logits,
    };
    if logits.len() != expected {
        return Err(Degradation::unavailable(Channel::Reranker, format!("{} scores for {expected} pairs", logits.len())));
    }

    let mut scored: Vec<(ResolvedCandidate, f32)> = candidates.into_iter().zip(logits.into_iter().map(sigmoid)).collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    if let Some((_, top)) = scored.first() {
        debug!(top_score = *top, kept = scored.len(), "reranked");
    }
    Ok(scored.into_iter().map(|(c, s)| shape(c, s, ScoreKind::CrossEncoder)).collect())
}

/// Reranker-less path: keep fused order and let `combined_score` stand in.
pub fn fused_order(candidates: Vec<ResolvedCandidate>, top_k: usize) -> Vec<RankedResult> {
    candidates
        .into_iter()
        .take(top_k)
        .map(|c| {
            let score = c.candidate.combined_score;
            shape(c, score, ScoreKind::Fused)
        })
        .collect()
}

/// Log a reranker degradation and fall back to fused order.
pub(crate) fn fallback(degradation: &Degradation, candidates: Vec<ResolvedCandidate>, top_k: usize) -> Vec<RankedResult> {
    warn!(channel = %degradation.channel(), reason = %degradation, "reranker skipped; using fused scores");
    fused_order(candidates, top_k)
}

fn shape(c: ResolvedCandidate, rerank_score: f32, score_kind: ScoreKind) -> RankedResult {
    let ResolvedCandidate { candidate, parent_text, parent_metadata, .. } = c;
    let source = candidate.metadata.get(SOURCE_KEY).cloned().unwrap_or_else(|| "unknown".to_string());
    RankedResult {
        parent_id: candidate.parent_id,
        parent_text,
        child_text: candidate.child_text,
        source,
        rerank_score: round_to(rerank_score, 4),
        semantic_score: round_to(candidate.semantic_score, 4),
        bm25_score: round_to(candidate.bm25_score, 4),
        combined_score: round_to(candidate.combined_score, 4),
        score_kind,
        metadata: candidate.metadata,
        parent_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use localrag_core::types::{FusedCandidate, Meta, Origin};

    struct Scripted(Vec<f32>);
    impl CrossEncoder for Scripted {
        fn predict(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.iter().copied().take(pairs.len()).collect())
        }
    }

    fn resolved(parent: &str, combined: f32) -> ResolvedCandidate {
        let mut metadata = Meta::new();
        metadata.insert("source".into(), format!("{parent}.md"));
        ResolvedCandidate {
            candidate: FusedCandidate {
                child_id: format!("{parent}-c"),
                parent_id: parent.into(),
                child_text: "child".into(),
                metadata: metadata.clone(),
                semantic_score: 0.123456,
                bm25_score: 7.654321,
                combined_score: combined,
                origin: Origin::Both,
            },
            parent_text: format!("parent {parent}"),
            parent_metadata: metadata,
            parent_found: true,
        }
    }

    #[tokio::test]
    async fn sorts_by_sigmoid_of_logits_and_truncates() {
        let enc: Lazy<dyn CrossEncoder> = Lazy::ready(Arc::new(Scripted(vec![-2.0, 3.0, 0.0])) as Arc<dyn CrossEncoder>);
        let input = vec![resolved("a", 0.03), resolved("b", 0.02), resolved("c", 0.01)];
        let out = rerank(&enc, "q", input, 2, Duration::from_secs(5)).await.expect("rerank");
        assert_eq!(out.iter().map(|r| r.parent_id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        assert!((out[0].rerank_score - 0.9526).abs() < 1e-4);
        assert!((out[1].rerank_score - 0.5).abs() < 1e-6);
        assert_eq!(out[0].score_kind, ScoreKind::CrossEncoder);
        assert!((out[0].semantic_score - 0.1235).abs() < 1e-6);
        assert!((out[0].bm25_score - 7.6543).abs() < 1e-4);
        assert_eq!(out[0].source, "b.md");
    }

    #[tokio::test]
    async fn wrong_score_count_or_disabled_model_degrades() {
        let short: Lazy<dyn CrossEncoder> = Lazy::ready(Arc::new(Scripted(vec![1.0])) as Arc<dyn CrossEncoder>);
        let err = rerank(&short, "q", vec![resolved("a", 0.2), resolved("b", 0.1)], 10, Duration::from_secs(5)).await.expect_err("mismatch");
        assert_eq!(err.channel(), Channel::Reranker);

        let disabled: Lazy<dyn CrossEncoder> = Lazy::disabled();
        assert!(rerank(&disabled, "q", vec![resolved("a", 0.2)], 10, Duration::from_secs(5)).await.is_err());
    }

    #[test]
    fn fused_order_uses_combined_score_as_stand_in() {
        let out = fused_order(vec![resolved("a", 0.016393), resolved("b", 0.0161)], 1);
        assert_eq!(out.len(), 1);
        assert!((out[0].rerank_score - 0.0164).abs() < 1e-6);
        assert_eq!(out[0].score_kind, ScoreKind::Fused);
    }
}
