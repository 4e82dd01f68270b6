//! Keyword and hybrid search over an indexed corpus.

pub mod hybrid;
pub mod lexical;

pub use hybrid::{fuse, normalize_scores, FusedScore, HybridRanker};
pub use lexical::{tokenize, LexicalIndex};

use crate::chunk::Chunk;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Immutable view of the indexed corpus.
///
/// The engine replaces the whole snapshot on every index change, so a query
/// sees every source either entirely before or entirely after an update.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    chunks_by_source: BTreeMap<String, Vec<Arc<Chunk>>>,
    by_id: HashMap<String, Arc<Chunk>>,
    lexical: LexicalIndex,
}

impl IndexSnapshot {
    /// Build a snapshot, including its keyword index, from chunks grouped by source.
    pub fn build(chunks_by_source: BTreeMap<String, Vec<Arc<Chunk>>>, k1: f32, b: f32) -> Self {
        let all: Vec<Arc<Chunk>> = chunks_by_source.values().flatten().cloned().collect();
        let lexical = LexicalIndex::build(&all, k1, b);
        let by_id = all.into_iter().map(|c| (c.id.clone(), c)).collect();

        Self {
            chunks_by_source,
            by_id,
            lexical,
        }
    }

    pub fn chunks_by_source(&self) -> &BTreeMap<String, Vec<Arc<Chunk>>> {
        &self.chunks_by_source
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Chunk>> {
        self.by_id.get(id)
    }

    /// Ids of every indexed chunk, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.by_id.keys()
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Total number of chunks.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn source_count(&self) -> usize {
        self.chunks_by_source.len()
    }
}
