//! Vector storage for chunk embeddings.

use super::EmbeddingProvider;
use async_trait::async_trait;
use inkwell_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Embedding and nearest-neighbour capability the retrieval engine depends on.
///
/// Every implementation supports the full set of operations; the engine never
/// probes for optional features.
#[async_trait]
pub trait EmbeddingStore: Send + Sync + std::fmt::Debug {
    /// Embed a text with the store's model.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Up to `k` stored chunk ids most similar to `vector`, most similar first.
    async fn nearest(&self, vector: &[f32], k: usize) -> AppResult<Vec<(String, f32)>>;

    /// Replace every vector of `source` with `entries` (`(chunk_id, vector)`).
    async fn replace_source(&self, source: &str, entries: Vec<(String, Vec<f32>)>)
        -> AppResult<()>;

    /// Drop every vector of `source`.
    async fn remove_source(&self, source: &str) -> AppResult<()>;

    /// Length every stored vector must have.
    fn dimensions(&self) -> usize;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct StoredVector {
    source: String,
    vector: Vec<f32>,
}

/// In-memory store with exact cosine search.
///
/// Writes build a new map and swap it in, so a concurrent search always sees
/// either the old or the new contents of a source.
#[derive(Debug)]
pub struct MemoryVectorStore {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: RwLock<Arc<HashMap<String, StoredVector>>>,
}

impl MemoryVectorStore {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            vectors: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    fn snapshot(&self) -> Arc<HashMap<String, StoredVector>> {
        match self.vectors.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn swap(&self, update: impl FnOnce(&mut HashMap<String, StoredVector>)) {
        let mut guard = match self.vectors.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = HashMap::clone(&guard);
        update(&mut next);
        *guard = Arc::new(next);
    }
}

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl EmbeddingStore for MemoryVectorStore {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.provider.embed(text).await
    }

    async fn nearest(&self, vector: &[f32], k: usize) -> AppResult<Vec<(String, f32)>> {
        if vector.len() != self.provider.dimensions() {
            return Err(AppError::Embedding(format!(
                "Query vector has {} dimensions, store expects {}",
                vector.len(),
                self.provider.dimensions()
            )));
        }

        let vectors = self.snapshot();
        let mut scored: Vec<(String, f32)> = vectors
            .iter()
            .map(|(id, stored)| (id.clone(), cosine_similarity(vector, &stored.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored)
    }

    async fn replace_source(
        &self,
        source: &str,
        entries: Vec<(String, Vec<f32>)>,
    ) -> AppResult<()> {
        let dimensions = self.provider.dimensions();
        if let Some((id, vector)) = entries.iter().find(|(_, v)| v.len() != dimensions) {
            return Err(AppError::Embedding(format!(
                "Vector for '{}' has {} dimensions, store expects {}",
                id,
                vector.len(),
                dimensions
            )));
        }

        let count = entries.len();
        self.swap(|map| {
            map.retain(|_, stored| stored.source != source);
            for (id, vector) in entries {
                map.insert(
                    id,
                    StoredVector {
                        source: source.to_string(),
                        vector,
                    },
                );
            }
        });

        tracing::debug!("Stored {} vectors for '{}'", count, source);
        Ok(())
    }

    async fn remove_source(&self, source: &str) -> AppResult<()> {
        self.swap(|map| map.retain(|_, stored| stored.source != source));
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    fn len(&self) -> usize {
        self.snapshot().len()
    }
}
