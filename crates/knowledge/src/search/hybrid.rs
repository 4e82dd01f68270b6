//! Hybrid keyword and semantic ranking.
//!
//! Both score sets are min-max normalized before the weighted sum, so neither
//! scale dominates the other. Keyword scores are normalized over the whole
//! corpus and semantic scores over every chunk with a stored vector.

use super::IndexSnapshot;
use crate::embeddings::EmbeddingStore;
use crate::types::RankedResult;
use inkwell_core::AppResult;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Default weight of the keyword score
pub const DEFAULT_LEXICAL_WEIGHT: f32 = 0.4;

/// Default weight of the semantic score
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.6;

/// Normalized scores of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedScore {
    pub id: String,
    pub lexical: f32,
    pub semantic: f32,
    pub fused: f32,
}

/// Min-max normalize scores to `[0, 1]`.
///
/// When every score is equal, positive scores map to 1 and the rest to 0.
pub fn normalize_scores(scores: &HashMap<String, f32>) -> HashMap<String, f32> {
    let (min, max) = scores
        .values()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    scores
        .iter()
        .map(|(id, &v)| {
            let normalized = if max > min {
                (v - min) / (max - min)
            } else if v > 0.0 {
                1.0
            } else {
                0.0
            };
            (id.clone(), normalized)
        })
        .collect()
}

/// Normalize both score sets and combine them.
///
/// Candidates are the union of both sets; a missing score counts as 0.
/// Candidates are returned in id order.
pub fn fuse(
    lexical: &HashMap<String, f32>,
    semantic: &HashMap<String, f32>,
    lexical_weight: f32,
    semantic_weight: f32,
) -> Vec<FusedScore> {
    let lexical = normalize_scores(lexical);
    let semantic = normalize_scores(semantic);

    let ids: BTreeSet<&String> = lexical.keys().chain(semantic.keys()).collect();

    ids.into_iter()
        .map(|id| {
            let l = lexical.get(id).copied().unwrap_or(0.0);
            let s = semantic.get(id).copied().unwrap_or(0.0);
            FusedScore {
                id: id.clone(),
                lexical: l,
                semantic: s,
                fused: lexical_weight * l + semantic_weight * s,
            }
        })
        .collect()
}

/// Result order: fused desc, semantic desc, source asc, chunk index asc.
fn compare_results(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.fused_score
        .total_cmp(&a.fused_score)
        .then_with(|| b.semantic_score.total_cmp(&a.semantic_score))
        .then_with(|| a.chunk.source.cmp(&b.chunk.source))
        .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
}

/// Ranks chunks for a query.
#[derive(Debug, Clone)]
pub struct HybridRanker {
    lexical_weight: f32,
    semantic_weight: f32,
}

impl Default for HybridRanker {
    fn default() -> Self {
        Self::new(DEFAULT_LEXICAL_WEIGHT, DEFAULT_SEMANTIC_WEIGHT)
    }
}

impl HybridRanker {
    pub fn new(lexical_weight: f32, semantic_weight: f32) -> Self {
        Self {
            lexical_weight,
            semantic_weight,
        }
    }

    /// Rank the snapshot's chunks for `query`, best first, at most `n_results`.
    ///
    /// With `use_hybrid` unset only the store's similarity is used. Fails only
    /// when the store cannot embed the query or search.
    pub async fn rank(
        &self,
        query: &str,
        n_results: usize,
        use_hybrid: bool,
        snapshot: &IndexSnapshot,
        store: &dyn EmbeddingStore,
        debug: bool,
    ) -> AppResult<Vec<RankedResult>> {
        if n_results == 0 || snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let vector = store.embed(query).await?;

        let mut results = if use_hybrid {
            let semantic: HashMap<String, f32> = store
                .nearest(&vector, snapshot.len())
                .await?
                .into_iter()
                .filter(|(id, _)| snapshot.get(id).is_some())
                .collect();
            let matches = snapshot.lexical().score(query);
            // Chunks without a keyword match take part in normalization at 0
            let lexical: HashMap<String, f32> = snapshot
                .ids()
                .map(|id| (id.clone(), matches.get(id).copied().unwrap_or(0.0)))
                .collect();

            fuse(&lexical, &semantic, self.lexical_weight, self.semantic_weight)
                .into_iter()
                .filter(|score| score.fused > 0.0)
                .filter_map(|score| {
                    snapshot.get(&score.id).map(|chunk| RankedResult {
                        chunk: chunk.clone(),
                        lexical_score: score.lexical,
                        semantic_score: score.semantic,
                        fused_score: score.fused,
                    })
                })
                .collect::<Vec<_>>()
        } else {
            store
                .nearest(&vector, n_results)
                .await?
                .into_iter()
                .filter_map(|(id, similarity)| {
                    snapshot.get(&id).map(|chunk| RankedResult {
                        chunk: chunk.clone(),
                        lexical_score: 0.0,
                        semantic_score: similarity,
                        fused_score: similarity,
                    })
                })
                .collect::<Vec<_>>()
        };

        results.sort_by(compare_results);

        if debug {
            for (rank, result) in results.iter().enumerate() {
                tracing::info!(
                    "#{} {} [{}] lexical={:.3} semantic={:.3} fused={:.3}",
                    rank + 1,
                    result.chunk.id,
                    result.chunk.heading_label(),
                    result.lexical_score,
                    result.semantic_score,
                    result.fused_score
                );
            }
        }

        results.truncate(n_results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ContentKind};
    use crate::embeddings::providers::trigram::TrigramProvider;
    use crate::embeddings::MemoryVectorStore;
    use crate::search::lexical::{DEFAULT_B, DEFAULT_K1};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn chunk(source: &str, index: usize, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk::new(
            source,
            index,
            text.to_string(),
            vec![],
            (index + 1, index + 1),
            ContentKind::Prose,
        ))
    }

    fn ranked(source: &str, index: usize, semantic: f32, fused: f32) -> RankedResult {
        RankedResult {
            chunk: chunk(source, index, "text"),
            lexical_score: 0.0,
            semantic_score: semantic,
            fused_score: fused,
        }
    }

    async fn indexed(docs: &[(&str, &str)]) -> (IndexSnapshot, MemoryVectorStore) {
        let store = MemoryVectorStore::new(Arc::new(TrigramProvider::new(384)));
        let mut sources = BTreeMap::new();

        for (source, text) in docs {
            let c = chunk(source, 0, text);
            let vector = store.embed(&c.search_text()).await.unwrap();
            store
                .replace_source(source, vec![(c.id.clone(), vector)])
                .await
                .unwrap();
            sources.insert(source.to_string(), vec![c]);
        }

        (IndexSnapshot::build(sources, DEFAULT_K1, DEFAULT_B), store)
    }

    fn scores(pairs: &[(&str, f32)]) -> HashMap<String, f32> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_normalize_min_max() {
        let normalized = normalize_scores(&scores(&[("a", 2.0), ("b", 4.0), ("c", 3.0)]));
        assert_eq!(normalized["a"], 0.0);
        assert_eq!(normalized["b"], 1.0);
        assert!((normalized["c"] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_degenerate() {
        let normalized = normalize_scores(&scores(&[("a", 0.7), ("b", 0.7)]));
        assert_eq!(normalized["a"], 1.0);
        assert_eq!(normalized["b"], 1.0);

        let normalized = normalize_scores(&scores(&[("a", 0.0)]));
        assert_eq!(normalized["a"], 0.0);

        assert!(normalize_scores(&HashMap::new()).is_empty());
    }

    #[test]
    fn test_fusion_weighting() {
        // A is best lexically, B best semantically; C is worst on both
        let lexical = scores(&[("A", 10.0), ("B", 0.0), ("C", 0.0)]);
        let semantic = scores(&[("A", 0.2), ("B", 0.9), ("C", 0.2)]);

        let fused = fuse(&lexical, &semantic, 0.4, 0.6);
        let get = |id: &str| fused.iter().find(|f| f.id == id).unwrap().fused;

        assert!((get("A") - 0.4).abs() < 1e-6);
        assert!((get("B") - 0.6).abs() < 1e-6);
        assert_eq!(get("C"), 0.0);
        assert!(get("B") > get("A"));
    }

    #[test]
    fn test_fuse_absent_counts_as_zero() {
        let lexical = scores(&[("only-lexical", 1.0)]);
        let semantic = scores(&[("only-semantic", 0.5)]);

        let fused = fuse(&lexical, &semantic, 0.4, 0.6);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, "only-lexical");
        assert_eq!(fused[0].semantic, 0.0);
        assert!((fused[0].fused - 0.4).abs() < 1e-6);
        assert!((fused[1].fused - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_tie_break_order() {
        let mut results = vec![
            ranked("b.md", 1, 0.5, 0.7),
            ranked("b.md", 0, 0.5, 0.7),
            ranked("a.md", 3, 0.5, 0.7),
            ranked("z.md", 0, 0.9, 0.7),
            ranked("c.md", 0, 0.1, 0.9),
        ];
        results.sort_by(compare_results);

        let order: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(order, vec!["c.md#0", "z.md#0", "a.md#3", "b.md#0", "b.md#1"]);
    }

    #[tokio::test]
    async fn test_weak_keyword_match_keeps_lexical_score() {
        let (snapshot, store) = indexed(&[
            ("a.md", "zebra zebra zebra habitat"),
            ("b.md", "zebra crossing on the road near the school"),
            ("c.md", "quantum chromodynamics lattice simulation"),
        ])
        .await;

        let results = HybridRanker::default()
            .rank("zebra", 3, true, &snapshot, &store, false)
            .await
            .unwrap();
        let lexical = |source: &str| {
            results
                .iter()
                .find(|r| r.chunk.source == source)
                .map(|r| r.lexical_score)
        };

        assert_eq!(lexical("a.md"), Some(1.0));
        assert!(lexical("b.md").is_some_and(|score| score > 0.0 && score < 1.0));
        assert!(lexical("c.md").unwrap_or(0.0) == 0.0);
    }

    #[tokio::test]
    async fn test_rank_empty_snapshot() {
        let (snapshot, store) = indexed(&[]).await;
        let results = HybridRanker::default()
            .rank("anything", 5, true, &snapshot, &store, false)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
