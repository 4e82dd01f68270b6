//! Context window budgeting.
//!
//! Decides which retrieved chunks reach the model when their combined size
//! exceeds the share of the context window reserved for retrieval.

use crate::chunk::Chunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default model context window, in tokens
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// Default share of the window available to retrieved chunks
pub const DEFAULT_RESERVE_PERCENT: f64 = 0.70;

/// Default weight of the recency bonus
pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.15;

/// Whether every candidate chunk was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStatus {
    Ok,
    Truncated,
}

/// A chunk left out of the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedChunk {
    pub source: String,
    pub heading: Vec<String>,
    pub tokens: usize,
}

/// Report of one optimization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub status: OptimizationStatus,

    /// Tokens over all candidates
    pub total_tokens: usize,

    /// Tokens over kept chunks
    pub used_tokens: usize,

    /// Retrieval budget, `floor(context_window * reserve_percent)`
    pub max_allowed: usize,

    pub dropped_chunks: usize,

    /// Dropped chunks in the order they were rejected
    pub dropped_details: Vec<DroppedChunk>,
}

impl OptimizationStats {
    /// Stats for a call with no candidates.
    pub fn empty(max_allowed: usize) -> Self {
        Self {
            status: OptimizationStatus::Ok,
            total_tokens: 0,
            used_tokens: 0,
            max_allowed,
            dropped_chunks: 0,
            dropped_details: Vec::new(),
        }
    }
}

/// Selects chunks that fit a token budget, most relevant first.
#[derive(Debug, Clone)]
pub struct ContextOptimizer {
    reserve_percent: f64,
    recency_weight: f64,
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::new(DEFAULT_RESERVE_PERCENT, DEFAULT_RECENCY_WEIGHT)
    }
}

impl ContextOptimizer {
    pub fn new(reserve_percent: f64, recency_weight: f64) -> Self {
        Self {
            reserve_percent,
            recency_weight,
        }
    }

    pub fn reserve_percent(&self) -> f64 {
        self.reserve_percent
    }

    /// Retrieval budget and the tokens left for the response.
    pub fn budget(&self, context_window: usize) -> (usize, usize) {
        let max_rag = (context_window as f64 * self.reserve_percent).floor() as usize;
        let max_rag = max_rag.min(context_window);
        (max_rag, context_window - max_rag)
    }

    /// Keep the chunks that fit the retrieval budget of `context_window`.
    ///
    /// Chunks are considered by relevance: `semantic_scores` (parallel to
    /// `chunks`) when given, otherwise input order. A source's recency only
    /// orders chunks of equal relevance. A chunk that does not fit the
    /// remaining budget is dropped and later, smaller chunks may still fit.
    /// Kept chunks are returned in input order.
    pub fn optimize_context(
        &self,
        chunks: &[Arc<Chunk>],
        context_window: usize,
        semantic_scores: Option<&[f32]>,
        recency: Option<&HashMap<String, f64>>,
    ) -> (Vec<Arc<Chunk>>, OptimizationStats) {
        let (max_rag, min_response) = self.budget(context_window);

        tracing::debug!(
            "Context budget: {} tokens for retrieval, {} reserved for response",
            max_rag,
            min_response
        );

        if chunks.is_empty() {
            return (Vec::new(), OptimizationStats::empty(max_rag));
        }

        let total_tokens: usize = chunks.iter().map(|c| c.token_count).sum();

        let relevance = |i: usize| -> f32 {
            match semantic_scores {
                Some(scores) => scores.get(i).copied().unwrap_or(0.0),
                // Input order: earlier is more relevant
                None => -(i as f32),
            }
        };
        let bonus = |i: usize| -> f64 {
            recency
                .and_then(|map| map.get(&chunks[i].source))
                .map_or(0.0, |r| self.recency_weight * r.clamp(0.0, 1.0))
        };

        let mut order: Vec<usize> = (0..chunks.len()).collect();
        order.sort_by(|&a, &b| {
            relevance(b)
                .total_cmp(&relevance(a))
                .then_with(|| bonus(b).total_cmp(&bonus(a)))
                .then(a.cmp(&b))
        });

        let mut kept = vec![false; chunks.len()];
        let mut used_tokens = 0;
        let mut dropped_details = Vec::new();

        for i in order {
            let chunk = &chunks[i];
            if used_tokens + chunk.token_count <= max_rag {
                used_tokens += chunk.token_count;
                kept[i] = true;
            } else {
                dropped_details.push(DroppedChunk {
                    source: chunk.source.clone(),
                    heading: chunk.heading_path.clone(),
                    tokens: chunk.token_count,
                });
            }
        }

        let selected: Vec<Arc<Chunk>> = chunks
            .iter()
            .zip(&kept)
            .filter(|(_, &k)| k)
            .map(|(c, _)| Arc::clone(c))
            .collect();

        let status = if dropped_details.is_empty() {
            OptimizationStatus::Ok
        } else {
            tracing::debug!(
                "Truncated context from {} to {} tokens, kept {}/{} chunks",
                total_tokens,
                used_tokens,
                selected.len(),
                chunks.len()
            );
            OptimizationStatus::Truncated
        };

        let stats = OptimizationStats {
            status,
            total_tokens,
            used_tokens,
            max_allowed: max_rag,
            dropped_chunks: dropped_details.len(),
            dropped_details,
        };

        (selected, stats)
    }
}

/// Convert last-access times into recency scores in `[0, 1]`.
///
/// Access within `full_secs` scores 1, at or beyond `zero_secs` scores 0,
/// with a linear decay in between.
pub fn recency_scores(
    access_times: &HashMap<String, DateTime<Utc>>,
    now: DateTime<Utc>,
    full_secs: u64,
    zero_secs: u64,
) -> HashMap<String, f64> {
    access_times
        .iter()
        .map(|(source, accessed)| {
            let age = (now - *accessed).num_milliseconds().max(0) as f64 / 1000.0;
            let full = full_secs as f64;
            let zero = zero_secs as f64;

            let score = if age <= full {
                1.0
            } else if age >= zero || zero <= full {
                0.0
            } else {
                1.0 - (age - full) / (zero - full)
            };
            (source.clone(), score.clamp(0.0, 1.0))
        })
        .collect()
}
