//! Command handlers for the Inkwell CLI.
//!
//! Every command indexes the workspace before it runs.

pub mod context;
pub mod query;
pub mod status;

// Re-export command types for convenience
pub use context::ContextCommand;
pub use query::QueryCommand;
pub use status::StatusCommand;

use inkwell_core::{config::AppConfig, AppResult};
use inkwell_knowledge::{ProgressEvent, ProgressReporter, RetrievalConfig, RetrievalEngine};
use std::sync::Arc;

/// Build an engine from the workspace config and index the workspace.
pub async fn open_engine(config: &AppConfig) -> AppResult<RetrievalEngine> {
    let retrieval = RetrievalConfig::from_app_config(config)?;
    let engine = RetrievalEngine::from_config(retrieval).await?;

    let progress = if config.verbose {
        ProgressReporter::new(Arc::new(|event: ProgressEvent| eprintln!("{}", event.format_simple())))
    } else {
        ProgressReporter::noop()
    };

    let report = engine.index_directory(&config.workspace, &progress).await?;
    if report.files_failed > 0 {
        eprintln!(
            "Warning: {} files could not be indexed (see log for details)",
            report.files_failed
        );
    }

    Ok(engine)
}
