//! Query command handler.

use super::open_engine;
use clap::Args;
use inkwell_core::{config::AppConfig, AppResult};

/// Rank passages for a query
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Query text
    pub query: String,

    /// Number of passages to return
    #[arg(short = 'n', long, default_value = "5")]
    pub results: usize,

    /// Rank by embedding similarity only
    #[arg(long)]
    pub semantic_only: bool,

    /// Log per-candidate scores
    #[arg(long)]
    pub debug: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing query command");
        tracing::debug!("Query options: {:?}", self);

        let engine = open_engine(config).await?;
        let results = engine
            .query_ranked(&self.query, self.results, !self.semantic_only, self.debug)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&*results)?);
            return Ok(());
        }

        if results.is_empty() {
            println!("No matching passages.");
            return Ok(());
        }

        for (rank, result) in results.iter().enumerate() {
            let chunk = &result.chunk;
            println!(
                "{}. {} [{}] lines {}-{} (score {:.3})",
                rank + 1,
                chunk.source,
                chunk.heading_label(),
                chunk.start_line,
                chunk.end_line,
                result.fused_score
            );
            println!("{}", chunk.text);
            println!();
        }

        Ok(())
    }
}
