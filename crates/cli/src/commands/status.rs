//! Status command handler.

use super::open_engine;
use clap::Args;
use inkwell_core::{config::AppConfig, AppResult};

/// Show index statistics
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing status command");

        let engine = open_engine(config).await?;
        let stats = engine.stats();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Workspace:      {}", config.workspace.display());
        println!("Sources:        {}", stats.sources);
        println!("Chunks:         {}", stats.chunks);
        println!("Vectors:        {}", stats.vectors);
        println!("Context window: {} tokens", stats.context_window);
        if let Some(at) = stats.last_indexed_at {
            println!("Last indexed:   {}", at.to_rfc3339());
        }

        Ok(())
    }
}
