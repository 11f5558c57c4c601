//! Neighbour selection strategies.
//!
//! Insertion asks a [`NeighborSelector`] which of the gathered candidates
//! become edges, and again when an existing node overflows its degree
//! bound. Swapping the strategy does not touch insert or search.

use std::collections::HashMap;

use memory_types::NodeId;

use crate::heap::Prioritized;
use crate::similarity::cosine_similarity;

/// Picks up to `m` neighbours for a node.
pub trait NeighborSelector: Send + Sync {
    /// `candidates` are scored by similarity to `base` and sorted best
    /// first. Returns ids in the order they should be linked, best first.
    fn select(
        &self,
        base: &[f32],
        candidates: &[Prioritized<NodeId>],
        m: usize,
        vectors: &HashMap<NodeId, Vec<f32>>,
    ) -> Vec<NodeId>;

    fn name(&self) -> &'static str;
}

/// Plain top-M by similarity. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct TopKSelector;

impl NeighborSelector for TopKSelector {
    fn select(
        &self,
        _base: &[f32],
        candidates: &[Prioritized<NodeId>],
        m: usize,
        _vectors: &HashMap<NodeId, Vec<f32>>,
    ) -> Vec<NodeId> {
        let mut selected = Vec::with_capacity(m.min(candidates.len()));
        for candidate in candidates {
            if selected.len() >= m {
                break;
            }
            if !selected.contains(&candidate.value) {
                selected.push(candidate.value);
            }
        }
        selected
    }

    fn name(&self) -> &'static str {
        "top_k"
    }
}

/// Diversity heuristic from the HNSW paper.
///
/// A candidate is kept only when it is more similar to the base node than
/// to every neighbour already kept, which preserves long-range edges under
/// clustered data. With `keep_pruned` the remaining slots are backfilled
/// from the rejected candidates, best first.
#[derive(Debug, Clone, Copy)]
pub struct DiversitySelector {
    pub keep_pruned: bool,
}

impl Default for DiversitySelector {
    fn default() -> Self {
        Self { keep_pruned: true }
    }
}

impl NeighborSelector for DiversitySelector {
    fn select(
        &self,
        _base: &[f32],
        candidates: &[Prioritized<NodeId>],
        m: usize,
        vectors: &HashMap<NodeId, Vec<f32>>,
    ) -> Vec<NodeId> {
        let mut selected: Vec<NodeId> = Vec::with_capacity(m);
        let mut rejected: Vec<NodeId> = Vec::new();

        for candidate in candidates {
            if selected.len() >= m {
                break;
            }
            if selected.contains(&candidate.value) {
                continue;
            }
            let Some(vector) = vectors.get(&candidate.value) else {
                continue;
            };

            let diverse = selected.iter().all(|kept| {
                vectors
                    .get(kept)
                    .map(|kept_vector| cosine_similarity(vector, kept_vector) < candidate.priority)
                    .unwrap_or(true)
            });

            if diverse {
                selected.push(candidate.value);
            } else {
                rejected.push(candidate.value);
            }
        }

        if self.keep_pruned {
            for id in rejected {
                if selected.len() >= m {
                    break;
                }
                selected.push(id);
            }
        }

        selected
    }

    fn name(&self) -> &'static str {
        "diversity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(base: &[f32], vectors: &HashMap<NodeId, Vec<f32>>) -> Vec<Prioritized<NodeId>> {
        let mut out: Vec<_> = vectors
            .iter()
            .map(|(id, v)| Prioritized::new(*id, cosine_similarity(base, v)))
            .collect();
        out.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap());
        out
    }

    fn clustered() -> HashMap<NodeId, Vec<f32>> {
        // 1 and 2 sit almost on top of each other, 3 points elsewhere
        HashMap::from([
            (1, vec![1.0, 0.1]),
            (2, vec![1.0, 0.12]),
            (3, vec![0.6, -0.8]),
        ])
    }

    #[test]
    fn test_top_k_takes_best_m() {
        let vectors = clustered();
        let base = [1.0, 0.0];
        let candidates = scored(&base, &vectors);
        let selected = TopKSelector.select(&base, &candidates, 2, &vectors);
        assert_eq!(selected, vec![1, 2]);
    }

    #[test]
    fn test_top_k_dedups_and_handles_small_input() {
        let vectors = HashMap::new();
        let candidates = vec![Prioritized::new(5, 0.9), Prioritized::new(5, 0.9)];
        assert_eq!(TopKSelector.select(&[1.0], &candidates, 4, &vectors), vec![5]);
        assert!(TopKSelector.select(&[1.0], &[], 4, &vectors).is_empty());
        assert!(TopKSelector.select(&[1.0], &candidates, 0, &vectors).is_empty());
    }

    #[test]
    fn test_diversity_skips_redundant_neighbour() {
        let vectors = clustered();
        let base = [1.0, 0.0];
        let candidates = scored(&base, &vectors);
        let strict = DiversitySelector { keep_pruned: false };
        assert_eq!(strict.select(&base, &candidates, 2, &vectors), vec![1, 3]);
    }

    #[test]
    fn test_diversity_backfills_pruned() {
        let vectors = clustered();
        let base = [1.0, 0.0];
        let candidates = scored(&base, &vectors);
        let selected = DiversitySelector::default().select(&base, &candidates, 3, &vectors);
        assert_eq!(selected, vec![1, 3, 2]);
    }

    #[test]
    fn test_selector_names() {
        assert_eq!(TopKSelector.name(), "top_k");
        assert_eq!(DiversitySelector::default().name(), "diversity");
    }
}
