//! Local retrieval for project documents.
//!
//! Markdown documents are split into heading-aware chunks, embedded and
//! indexed for keyword search. Queries blend BM25 keyword relevance with
//! embedding similarity, go through a result cache, and can be trimmed to
//! fit a model's context window.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod engine;
pub mod progress;
pub mod search;
pub mod tokens;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cache::{CacheKey, CacheStats, QueryCache};
pub use chunk::{Chunk, ChunkConfig, ContentKind, MarkdownChunker};
pub use config::RetrievalConfig;
pub use context::{ContextOptimizer, DroppedChunk, OptimizationStats, OptimizationStatus};
pub use embeddings::{EmbeddingConfig, EmbeddingProvider, EmbeddingStore, MemoryVectorStore};
pub use engine::RetrievalEngine;
pub use progress::{ProgressEvent, ProgressPhase, ProgressReporter};
pub use search::{HybridRanker, IndexSnapshot, LexicalIndex};
pub use tokens::estimate_tokens;
pub use types::{DirectoryReport, EngineStats, FileStatus, IndexReport, RankedResult};
