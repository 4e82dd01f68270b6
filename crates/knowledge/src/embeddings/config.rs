//! Embedding configuration types.

use inkwell_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier (provider-specific)
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding vector dimensions
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Base URL of the provider's HTTP API, if it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Maximum number of chunks embedded concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_provider() -> String {
    "trigram".to_string()
}

fn default_model() -> String {
    "trigram-v1".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_concurrency() -> usize {
    4
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dimensions: default_dimensions(),
            endpoint: None,
            concurrency: default_concurrency(),
        }
    }
}

impl EmbeddingConfig {
    /// Check the settings are usable.
    pub fn validate(&self) -> AppResult<()> {
        if self.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(AppError::Config(
                "embedding.concurrency must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
