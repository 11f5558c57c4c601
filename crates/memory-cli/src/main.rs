//! Agent Memory CLI
//!
//! Encrypted long-term memory for an on-device agent.
//!
//! # Usage
//!
//! ```bash
//! agent-memory store "likes green tea" --vector 0.1,0.2,0.3 [--metadata '{"k":"v"}']
//! agent-memory recall --vector 0.1,0.2,0.3 [-k 5]
//! agent-memory stats [--backend flat]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/agent-memory/config.toml)
//! 3. Environment variables (MEMORY_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use memory_cli::{
    handle_recall, handle_stats, handle_store, init_logging, load_settings, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(
        cli.config.as_deref(),
        cli.log_level.as_deref(),
        cli.backend,
        cli.path.as_deref(),
    )?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Store {
            content,
            vector,
            metadata,
        } => {
            handle_store(&settings, cli.backend, content, &vector, metadata.as_deref()).await?;
        }
        Commands::Recall { vector, limit } => {
            handle_recall(&settings, cli.backend, &vector, limit).await?;
        }
        Commands::Stats => {
            handle_stats(&settings, cli.backend)?;
        }
    }

    Ok(())
}
