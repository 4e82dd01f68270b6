//! Retrieval type definitions.

use crate::cache::CacheStats;
use crate::chunk::Chunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A chunk returned by a query, with the scores that placed it.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub chunk: Arc<Chunk>,

    /// Normalized keyword score (0 in semantic-only mode)
    pub lexical_score: f32,

    /// Semantic similarity; normalized to [0, 1] in hybrid mode
    pub semantic_score: f32,

    /// Score the result was ranked by
    pub fused_score: f32,
}

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    /// Source identifier
    pub source: String,

    /// Chunks created from the document
    pub chunks: usize,

    /// Chunks with a stored embedding
    pub embedded: usize,

    /// Chunks searchable by keyword only, because embedding failed
    pub lexical_only: usize,
}

/// Indexing state of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Indexed and unchanged since
    Indexed,

    /// Indexed, but modified afterwards
    NeedsReindex,

    /// Never indexed
    NotIndexed,
}

impl FileStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indexed => "indexed",
            Self::NeedsReindex => "needs_reindex",
            Self::NotIndexed => "not_indexed",
        }
    }
}

/// Summary of a directory indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryReport {
    /// Files indexed successfully
    pub files_indexed: usize,

    /// Files that failed to read or index
    pub files_failed: usize,

    /// Chunks created across all files
    pub chunks: usize,

    /// Chunks left keyword-only
    pub lexical_only: usize,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Number of indexed sources
    pub sources: usize,

    /// Number of indexed chunks
    pub chunks: usize,

    /// Number of stored embedding vectors
    pub vectors: usize,

    /// Context window used by the optimizer, in tokens
    pub context_window: usize,

    /// Last successful index change
    pub last_indexed_at: Option<DateTime<Utc>>,

    pub cache: CacheStats,
}
