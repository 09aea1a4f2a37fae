//! Child-to-parent resolution: one candidate per parent, best child kept.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use localrag_core::error::{Channel, Degradation};
use localrag_core::traits::ParentStore;
use localrag_core::types::{FusedCandidate, Meta};

/// A fused candidate paired with the context text delivered downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCandidate {
    pub candidate: FusedCandidate,
    pub parent_text: String,
    pub parent_metadata: Meta,
    /// False when the child text stands in for a parent the store could not return.
    pub parent_found: bool,
}

/// Keep the highest-scoring child per `parent_id`, ordered by `combined_score`.
///
/// Earlier candidates win ties, so the input order breaks equal scores.
pub fn best_child_per_parent(candidates: Vec<FusedCandidate>) -> Vec<FusedCandidate> {
    let mut slot: HashMap<String, usize> = HashMap::with_capacity(candidates.len());
    let mut kept: Vec<FusedCandidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        match slot.get(&c.parent_id) {
            Some(&i) => {
                if c.combined_score > kept[i].combined_score { kept[i] = c; }
            }
            None => {
                slot.insert(c.parent_id.clone(), kept.len());
                kept.push(c);
            }
        }
    }
    kept.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    kept
}

/// Deduplicate by parent and attach parent text.
///
/// Never fails: an unavailable store or unknown ids fall back to the child
/// text and are reported as a `Parents` degradation.
pub async fn resolve_parents(
    store: &dyn ParentStore,
    candidates: Vec<FusedCandidate>,
    timeout: Duration,
) -> (Vec<ResolvedCandidate>, Option<Degradation>) {
    let deduped = best_child_per_parent(candidates);
    if deduped.is_empty() {
        return (Vec::new(), None);
    }
    let ids: Vec<String> = deduped.iter().map(|c| c.parent_id.clone()).collect();

    let (mut parents, mut degradation) = match tokio::time::timeout(timeout, store.fetch(&ids)).await {
        Ok(Ok(found)) => (found, None),
        Ok(Err(e)) => {
            warn!(channel = %Channel::Parents, error = %e, "parent store unavailable; using child text");
            (HashMap::new(), Some(Degradation::unavailable(Channel::Parents, e)))
        }
        Err(_) => {
            warn!(channel = %Channel::Parents, timeout_ms = timeout.as_millis() as u64, "parent lookup timed out; using child text");
            (HashMap::new(), Some(Degradation::TimedOut { channel: Channel::Parents, after: timeout }))
        }
    };

    let mut missing = Vec::new();
    let resolved: Vec<ResolvedCandidate> = deduped
        .into_iter()
        .map(|c| match parents.remove(&c.parent_id) {
            Some(p) => ResolvedCandidate { parent_text: p.text, parent_metadata: p.metadata, parent_found: true, candidate: c },
            None => {
                missing.push(c.parent_id.clone());
                ResolvedCandidate { parent_text: c.child_text.clone(), parent_metadata: c.metadata.clone(), parent_found: false, candidate: c }
            }
        })
        .collect();

    if degradation.is_none() && !missing.is_empty() {
        warn!(channel = %Channel::Parents, missing = missing.len(), ids = ?missing, "parent ids not found; using child text");
        degradation = Some(Degradation::unavailable(
            Channel::Parents,
            format!("{} of {} parent id(s) not found: {}", missing.len(), resolved.len(), missing.join(", ")),
        ));
    }
    debug!(parents = resolved.len(), "resolved parent chunks");
    (resolved, degradation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use localrag_core::types::Origin;

    fn cand(child: &str, parent: &str, score: f32) -> FusedCandidate {
        FusedCandidate {
            child_id: child.into(),
            parent_id: parent.into(),
            child_text: format!("child {child}"),
            metadata: Meta::new(),
            semantic_score: 0.0,
            bm25_score: 0.0,
            combined_score: score,
            origin: Origin::Both,
        }
    }

    #[test]
    fn keeps_best_child_per_parent_in_score_order() {
        let out = best_child_per_parent(vec![
            cand("c1", "p1", 0.010),
            cand("c2", "p2", 0.016),
            cand("c3", "p1", 0.015),
            cand("c4", "p2", 0.012),
            cand("c5", "p3", 0.015),
        ]);
        let ids: Vec<_> = out.iter().map(|c| (c.parent_id.as_str(), c.child_id.as_str())).collect();
        assert_eq!(ids, vec![("p2", "c2"), ("p1", "c3"), ("p3", "c5")]);
    }

    #[test]
    fn cardinality_never_exceeds_distinct_parents() {
        let input: Vec<_> = (0..40).map(|i| cand(&format!("c{i}"), &format!("p{}", i % 7), (i * 37 % 11) as f32)).collect();
        let out = best_child_per_parent(input);
        assert_eq!(out.len(), 7);
        let mut seen = std::collections::HashSet::new();
        assert!(out.iter().all(|c| seen.insert(c.parent_id.clone())));
        assert!(out.windows(2).all(|w| w[0].combined_score >= w[1].combined_score));
    }

    #[test]
    fn equal_scores_keep_the_first_child() {
        let out = best_child_per_parent(vec![cand("a", "p", 0.5), cand("b", "p", 0.5)]);
        assert_eq!(out[0].child_id, "a");
    }
}
