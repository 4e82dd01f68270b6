//! Embedding generation and vector storage.
//!
//! Providers turn text into vectors; a store keeps one vector per chunk and
//! answers nearest-neighbour queries for the hybrid ranker.

pub mod config;
pub mod provider;
pub mod providers;
pub mod store;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
pub use store::{cosine_similarity, EmbeddingStore, MemoryVectorStore};
