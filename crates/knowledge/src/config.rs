//! Retrieval configuration.
//!
//! Read from the `retrieval:` section of `.inkwell/config.yaml`. Every field
//! has a default, so a missing section or a partial one is valid.

use crate::cache::DEFAULT_CAPACITY;
use crate::chunk::ChunkConfig;
use crate::context::{DEFAULT_CONTEXT_WINDOW, DEFAULT_RECENCY_WEIGHT, DEFAULT_RESERVE_PERCENT};
use crate::embeddings::EmbeddingConfig;
use crate::search::hybrid::{DEFAULT_LEXICAL_WEIGHT, DEFAULT_SEMANTIC_WEIGHT};
use crate::search::lexical::{DEFAULT_B, DEFAULT_K1};
use inkwell_core::{AppConfig, AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ranking settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub lexical_weight: f32,
    pub semantic_weight: f32,
    pub bm25_k1: f32,
    pub bm25_b: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lexical_weight: DEFAULT_LEXICAL_WEIGHT,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            bm25_k1: DEFAULT_K1,
            bm25_b: DEFAULT_B,
        }
    }
}

/// Query cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached queries; `null` for no limit
    pub capacity: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_CAPACITY),
        }
    }
}

/// Context optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Model context window in tokens
    pub context_window: usize,

    /// Share of the window available to retrieved chunks
    pub reserve_percent: f64,

    /// Weight of the recency tie-break
    pub recency_weight: f64,

    /// Sources accessed within this many seconds count as fully recent
    pub recency_full_secs: u64,

    /// Sources accessed this many seconds ago or earlier get no recency bonus
    pub recency_zero_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_WINDOW,
            reserve_percent: DEFAULT_RESERVE_PERCENT,
            recency_weight: DEFAULT_RECENCY_WEIGHT,
            recency_full_secs: 60,
            recency_zero_secs: 3600,
        }
    }
}

/// Complete retrieval configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub chunking: ChunkConfig,
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub context: ContextConfig,
    pub embedding: EmbeddingConfig,

    /// Directory names skipped when indexing a project
    pub exclude_dirs: Vec<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkConfig::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            context: ContextConfig::default(),
            embedding: EmbeddingConfig::default(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

fn default_exclude_dirs() -> Vec<String> {
    [
        inkwell_core::config::STATE_DIR,
        ".debug",
        ".git",
        "node_modules",
        "__pycache__",
        "venv",
        ".venv",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl RetrievalConfig {
    /// Build from the application config's `retrieval` section.
    pub fn from_app_config(config: &AppConfig) -> AppResult<Self> {
        let retrieval = match &config.retrieval {
            Some(value) => serde_yaml::from_value(value.clone()).map_err(|e| {
                AppError::Config(format!("Invalid retrieval configuration: {}", e))
            })?,
            None => Self::default(),
        };

        retrieval.validate()?;
        Ok(retrieval)
    }

    /// Load from a YAML file containing a `retrieval:` section.
    pub fn load(path: &Path) -> AppResult<Self> {
        let app = AppConfig::default().merge_yaml(path)?;
        Self::from_app_config(&app)
    }

    /// Check the settings are consistent.
    pub fn validate(&self) -> AppResult<()> {
        let c = &self.chunking;
        if c.min_tokens == 0 || c.min_tokens > c.default_tokens || c.default_tokens > c.max_tokens
        {
            return Err(AppError::Config(format!(
                "chunking requires 0 < min_tokens <= default_tokens <= max_tokens (got {}, {}, {})",
                c.min_tokens, c.default_tokens, c.max_tokens
            )));
        }

        let s = &self.search;
        if s.lexical_weight < 0.0 || s.semantic_weight < 0.0 {
            return Err(AppError::Config(
                "search weights must not be negative".to_string(),
            ));
        }
        if ((s.lexical_weight + s.semantic_weight) - 1.0).abs() > 1e-6 {
            return Err(AppError::Config(format!(
                "search weights must sum to 1 (got {} + {})",
                s.lexical_weight, s.semantic_weight
            )));
        }
        if s.bm25_k1 < 0.0 || !(0.0..=1.0).contains(&s.bm25_b) {
            return Err(AppError::Config(
                "bm25_k1 must be >= 0 and bm25_b within [0, 1]".to_string(),
            ));
        }

        if self.cache.capacity == Some(0) {
            return Err(AppError::Config(
                "cache.capacity must be positive or null".to_string(),
            ));
        }

        let ctx = &self.context;
        if !(ctx.reserve_percent > 0.0 && ctx.reserve_percent <= 1.0) {
            return Err(AppError::Config(format!(
                "context.reserve_percent must be within (0, 1] (got {})",
                ctx.reserve_percent
            )));
        }
        if ctx.recency_weight < 0.0 {
            return Err(AppError::Config(
                "context.recency_weight must not be negative".to_string(),
            ));
        }
        if ctx.recency_full_secs >= ctx.recency_zero_secs {
            return Err(AppError::Config(
                "context.recency_full_secs must be less than recency_zero_secs".to_string(),
            ));
        }

        self.embedding.validate()
    }
}
