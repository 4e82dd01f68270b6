//! Context command handler.
//!
//! Prints the passages that fit a model's context window, with the
//! optimizer's report.

use super::open_engine;
use clap::Args;
use inkwell_core::{config::AppConfig, AppResult};
use inkwell_knowledge::OptimizationStatus;

/// Assemble context for a query
#[derive(Args, Debug)]
pub struct ContextCommand {
    /// Query text
    pub query: String,

    /// Number of candidate passages
    #[arg(short = 'n', long, default_value = "5")]
    pub results: usize,

    /// Model context window in tokens (default from config)
    #[arg(long)]
    pub window: Option<usize>,

    /// Log per-candidate scores and the budget
    #[arg(long)]
    pub debug: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ContextCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing context command");
        tracing::debug!("Context options: {:?}", self);

        let engine = open_engine(config).await?;
        let (chunks, stats) = engine
            .optimized_chunks(&self.query, self.results, self.window, self.debug)
            .await?;

        if self.json {
            let output = serde_json::json!({
                "chunks": chunks.iter().map(|c| c.as_ref()).collect::<Vec<_>>(),
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        for chunk in &chunks {
            println!("--- {} [{}]", chunk.source, chunk.heading_label());
            println!("{}", chunk.text);
            println!();
        }

        println!(
            "Used {} of {} tokens ({} candidate tokens), status: {}",
            stats.used_tokens,
            stats.max_allowed,
            stats.total_tokens,
            match stats.status {
                OptimizationStatus::Ok => "ok",
                OptimizationStatus::Truncated => "truncated",
            }
        );
        for dropped in &stats.dropped_details {
            println!(
                "  dropped {} [{}] ({} tokens)",
                dropped.source,
                dropped.heading.join(" > "),
                dropped.tokens
            );
        }

        Ok(())
    }
}
