//! Retrieval engine.
//!
//! One engine per project. It owns the indexed corpus, the query cache, the
//! persisted context window and the per-source access record.

use crate::cache::{CacheKey, QueryCache};
use crate::chunk::{Chunk, MarkdownChunker};
use crate::config::RetrievalConfig;
use crate::context::{recency_scores, ContextOptimizer, OptimizationStats};
use crate::embeddings::{create_provider, EmbeddingStore, MemoryVectorStore};
use crate::progress::ProgressReporter;
use crate::search::{HybridRanker, IndexSnapshot};
use crate::types::{DirectoryReport, EngineStats, FileStatus, IndexReport, RankedResult};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use inkwell_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Instant, SystemTime};
use walkdir::WalkDir;

/// File extensions picked up by directory indexing
const INDEXED_EXTENSIONS: &[&str] = &["md", "txt"];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hybrid retrieval over a project's documents.
///
/// All methods take `&self`. Queries may run concurrently with each other and
/// with indexing. Index writes are serialized internally and applied in call
/// order.
///
/// A write updates the vector store before it publishes the new snapshot.
/// A query landing between the two ranks against the old snapshot, and
/// store ids unknown to that snapshot are ignored.
#[derive(Debug)]
pub struct RetrievalEngine {
    config: RetrievalConfig,
    chunker: MarkdownChunker,
    store: Arc<dyn EmbeddingStore>,
    ranker: HybridRanker,
    optimizer: ContextOptimizer,
    index: RwLock<Arc<IndexSnapshot>>,
    cache: QueryCache<Arc<[RankedResult]>>,
    context_window: AtomicUsize,
    access_times: Mutex<HashMap<String, DateTime<Utc>>>,
    indexed_files: Mutex<HashMap<String, SystemTime>>,
    last_indexed_at: Mutex<Option<DateTime<Utc>>>,
    /// Held for the whole of a write, from embedding to snapshot publish
    writer: tokio::sync::Mutex<()>,
}

impl RetrievalEngine {
    /// Create an engine backed by `store`.
    pub fn new(config: RetrievalConfig, store: Arc<dyn EmbeddingStore>) -> AppResult<Self> {
        config.validate()?;

        Ok(Self {
            chunker: MarkdownChunker::new(config.chunking.clone()),
            ranker: HybridRanker::new(config.search.lexical_weight, config.search.semantic_weight),
            optimizer: ContextOptimizer::new(
                config.context.reserve_percent,
                config.context.recency_weight,
            ),
            store,
            index: RwLock::new(Arc::new(IndexSnapshot::default())),
            cache: QueryCache::new(config.cache.capacity),
            context_window: AtomicUsize::new(config.context.context_window),
            access_times: Mutex::new(HashMap::new()),
            indexed_files: Mutex::new(HashMap::new()),
            last_indexed_at: Mutex::new(None),
            writer: tokio::sync::Mutex::new(()),
            config,
        })
    }

    /// Create an engine with the configured embedding provider and an
    /// in-memory vector store.
    pub async fn from_config(config: RetrievalConfig) -> AppResult<Self> {
        let provider = create_provider(&config.embedding).await?;

        tracing::info!(
            "Using embedding provider '{}' (model: {}, {} dimensions)",
            provider.provider_name(),
            provider.model_name(),
            provider.dimensions()
        );

        Self::new(config, Arc::new(MemoryVectorStore::new(provider)))
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Current index snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        match self.index.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn publish(&self, update: impl FnOnce(&mut BTreeMap<String, Vec<Arc<Chunk>>>)) {
        let current = self.snapshot();
        let mut sources = current.chunks_by_source().clone();
        update(&mut sources);

        let next = IndexSnapshot::build(sources, self.config.search.bm25_k1, self.config.search.bm25_b);

        let mut guard = match self.index.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(next);
        *lock(&self.last_indexed_at) = Some(Utc::now());
    }

    /// Chunk, embed and publish one document without touching the cache.
    async fn index_source(&self, source: &str, text: &str) -> AppResult<IndexReport> {
        let _writer = self.writer.lock().await;

        let chunks: Vec<Arc<Chunk>> = self
            .chunker
            .chunk(text, source)
            .into_iter()
            .map(Arc::new)
            .collect();

        let store = &self.store;
        let outcomes: Vec<(String, AppResult<Vec<f32>>)> = stream::iter(chunks.iter())
            .map(|chunk| async move {
                let embedding = store.embed(&chunk.search_text()).await;
                (chunk.id.clone(), embedding)
            })
            .buffered(self.config.embedding.concurrency.max(1))
            .collect()
            .await;

        let dimensions = self.store.dimensions();
        let mut entries = Vec::with_capacity(outcomes.len());
        for (id, outcome) in outcomes {
            match outcome {
                Ok(vector) if vector.len() == dimensions => entries.push((id, vector)),
                Ok(vector) => tracing::warn!(
                    "Chunk '{}' left keyword-only: vector has {} dimensions, store expects {}",
                    id,
                    vector.len(),
                    dimensions
                ),
                Err(e) => tracing::warn!("Chunk '{}' left keyword-only: {}", id, e),
            }
        }

        let report = IndexReport {
            source: source.to_string(),
            chunks: chunks.len(),
            embedded: entries.len(),
            lexical_only: chunks.len() - entries.len(),
        };

        self.store.replace_source(source, entries).await?;

        self.publish(|sources| {
            if chunks.is_empty() {
                sources.remove(source);
            } else {
                sources.insert(source.to_string(), chunks);
            }
        });

        tracing::info!(
            "Indexed {} chunks for {} ({} keyword-only)",
            report.chunks,
            source,
            report.lexical_only
        );

        Ok(report)
    }

    /// Index (or re-index) a document, replacing its previous chunks.
    ///
    /// Chunks whose embedding fails stay searchable by keyword. The query
    /// cache is cleared.
    pub async fn index_file(&self, source: &str, text: &str) -> AppResult<IndexReport> {
        let report = self.index_source(source, text).await?;
        self.cache.invalidate_all();
        Ok(report)
    }

    /// Read and index a file; its path is the source identifier.
    pub async fn index_path(&self, path: &Path) -> AppResult<IndexReport> {
        let report = self.index_path_quiet(path).await?;
        self.cache.invalidate_all();
        Ok(report)
    }

    async fn index_path_quiet(&self, path: &Path) -> AppResult<IndexReport> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Knowledge(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let modified = tokio::fs::metadata(path).await?.modified()?;

        let source = source_id(path);
        let report = self.index_source(&source, &text).await?;
        lock(&self.indexed_files).insert(source, modified);

        Ok(report)
    }

    /// Drop a document from the index. Returns whether it was indexed.
    pub async fn remove_file(&self, source: &str) -> AppResult<bool> {
        let _writer = self.writer.lock().await;
        let known = self.snapshot().chunks_by_source().contains_key(source);

        self.store.remove_source(source).await?;
        if known {
            self.publish(|sources| {
                sources.remove(source);
            });
            tracing::info!("Removed {} from index", source);
        }
        lock(&self.indexed_files).remove(source);
        self.cache.invalidate_all();

        Ok(known)
    }

    /// Index every markdown and text file under `root`.
    ///
    /// Directories named in `exclude_dirs` are skipped. A file that cannot be
    /// read or indexed is logged and counted, and the rest carry on. The cache
    /// is cleared once, at the end.
    pub async fn index_directory(
        &self,
        root: &Path,
        progress: &ProgressReporter,
    ) -> AppResult<DirectoryReport> {
        if !root.is_dir() {
            return Err(AppError::Knowledge(format!(
                "Not a directory: {}",
                root.display()
            )));
        }

        let start = Instant::now();
        let files = self.discover(root);
        let total = files.len() as u64;
        progress.discover(total, &root.display().to_string());

        let mut report = DirectoryReport {
            files_indexed: 0,
            files_failed: 0,
            chunks: 0,
            lexical_only: 0,
            duration_secs: 0.0,
        };

        for (i, path) in files.iter().enumerate() {
            let current = i as u64 + 1;
            match self.index_path_quiet(path).await {
                Ok(file_report) => {
                    progress.chunk(current, Some(total), &file_report.source, file_report.chunks);
                    progress.embed(
                        current,
                        Some(total),
                        &file_report.source,
                        file_report.lexical_only,
                    );
                    report.files_indexed += 1;
                    report.chunks += file_report.chunks;
                    report.lexical_only += file_report.lexical_only;
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    report.files_failed += 1;
                }
            }
        }

        self.cache.invalidate_all();
        progress.index(report.files_indexed as u64, self.snapshot().len());

        report.duration_secs = start.elapsed().as_secs_f64();
        tracing::info!(
            "Indexed {} files ({} chunks, {} failed) in {:.2}s",
            report.files_indexed,
            report.chunks,
            report.files_failed,
            report.duration_secs
        );

        Ok(report)
    }

    fn discover(&self, root: &Path) -> Vec<PathBuf> {
        let excluded = &self.config.exclude_dirs;

        WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !excluded
                        .iter()
                        .any(|name| entry.file_name().to_string_lossy() == name.as_str())
            })
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && has_indexed_extension(entry.path()))
            .map(|entry| entry.into_path())
            .collect()
    }

    /// Whether a file on disk is indexed and current.
    pub fn file_status(&self, path: &Path) -> FileStatus {
        let indexed_at = match lock(&self.indexed_files).get(&source_id(path)) {
            Some(modified) => *modified,
            None => return FileStatus::NotIndexed,
        };

        match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) if modified > indexed_at => FileStatus::NeedsReindex,
            Ok(_) => FileStatus::Indexed,
            Err(_) => FileStatus::NotIndexed,
        }
    }

    /// Rank chunks for a query, through the cache.
    ///
    /// An empty or whitespace-only query returns no results. Every returned
    /// chunk's source is marked as accessed.
    pub async fn query_ranked(
        &self,
        query: &str,
        n_results: usize,
        use_hybrid: bool,
        debug: bool,
    ) -> AppResult<Arc<[RankedResult]>> {
        if query.trim().is_empty() {
            return Ok(Arc::from(Vec::<RankedResult>::new()));
        }

        let key = CacheKey::new(query, n_results, use_hybrid);

        let results = self
            .cache
            .get_or_compute(key, || async {
                // Taken after the cache lookup so the generation guard covers it
                let snapshot = self.snapshot();
                self.ranker
                    .rank(
                        query,
                        n_results,
                        use_hybrid,
                        &snapshot,
                        self.store.as_ref(),
                        debug,
                    )
                    .await
                    .map(Arc::from)
            })
            .await?;

        let now = Utc::now();
        {
            let mut access = lock(&self.access_times);
            for result in results.iter() {
                access.insert(result.chunk.source.clone(), now);
            }
        }

        if debug {
            let stats = self.cache.stats();
            tracing::info!(
                "Query '{}' ({}) returned {} results; cache {} hits / {} misses",
                query,
                if use_hybrid { "hybrid" } else { "semantic" },
                results.len(),
                stats.hits,
                stats.misses
            );
        }

        Ok(results)
    }

    /// Passage texts for a query, best first.
    pub async fn query(
        &self,
        query: &str,
        n_results: usize,
        use_hybrid: bool,
        debug: bool,
    ) -> AppResult<Vec<String>> {
        let results = self.query_ranked(query, n_results, use_hybrid, debug).await?;
        Ok(results.iter().map(|r| r.chunk.text.clone()).collect())
    }

    /// Hybrid query results that fit the context window's retrieval budget.
    ///
    /// A supplied `context_window` becomes the engine's window for later
    /// calls. Fused scores rank the candidates and recently accessed sources
    /// win ties.
    pub async fn optimized_chunks(
        &self,
        query: &str,
        n_results: usize,
        context_window: Option<usize>,
        debug: bool,
    ) -> AppResult<(Vec<Arc<Chunk>>, OptimizationStats)> {
        if let Some(window) = context_window {
            self.set_context_window(window);
        }
        let window = self.context_window();

        // Recency as it was before this query touches it
        let recency = {
            let access = lock(&self.access_times);
            recency_scores(
                &access,
                Utc::now(),
                self.config.context.recency_full_secs,
                self.config.context.recency_zero_secs,
            )
        };

        let ranked = self.query_ranked(query, n_results, true, debug).await?;
        let chunks: Vec<Arc<Chunk>> = ranked.iter().map(|r| Arc::clone(&r.chunk)).collect();
        let scores: Vec<f32> = ranked.iter().map(|r| r.fused_score).collect();

        let (kept, stats) =
            self.optimizer
                .optimize_context(&chunks, window, Some(&scores), Some(&recency));

        if debug {
            tracing::info!(
                "Context: kept {}/{} chunks, {} of {} tokens (budget {})",
                kept.len(),
                chunks.len(),
                stats.used_tokens,
                stats.total_tokens,
                stats.max_allowed
            );
        }

        Ok((kept, stats))
    }

    /// Passage texts that fit the context window, with the optimization report.
    pub async fn get_optimized_context(
        &self,
        query: &str,
        n_results: usize,
        context_window: Option<usize>,
        debug: bool,
    ) -> AppResult<(Vec<String>, OptimizationStats)> {
        let (kept, stats) = self
            .optimized_chunks(query, n_results, context_window, debug)
            .await?;
        Ok((kept.iter().map(|c| c.text.clone()).collect(), stats))
    }

    /// Set the model context window used by context optimization.
    pub fn set_context_window(&self, tokens: usize) {
        self.context_window.store(tokens, Ordering::Relaxed);
        tracing::debug!("Context window set to {} tokens", tokens);
    }

    pub fn context_window(&self) -> usize {
        self.context_window.load(Ordering::Relaxed)
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }

    /// Last access time per source.
    pub fn access_times(&self) -> HashMap<String, DateTime<Utc>> {
        lock(&self.access_times).clone()
    }

    pub fn stats(&self) -> EngineStats {
        let snapshot = self.snapshot();
        EngineStats {
            sources: snapshot.source_count(),
            chunks: snapshot.len(),
            vectors: self.store.len(),
            context_window: self.context_window(),
            last_indexed_at: *lock(&self.last_indexed_at),
            cache: self.cache.stats(),
        }
    }
}

/// Source identifier of a file: its path as given.
pub fn source_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn has_indexed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            INDEXED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}
