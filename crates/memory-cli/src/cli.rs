//! CLI argument parsing for the memory tool.
//!
//! CLI flags override every other config source.

use clap::{Parser, Subcommand, ValueEnum};

/// Agent Memory
///
/// Encrypted long-term memory for an on-device agent.
#[derive(Parser, Debug)]
#[command(name = "agent-memory")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/agent-memory/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Store backend
    #[arg(short, long, global = true, value_enum, default_value_t = Backend::Hnsw)]
    pub backend: Backend,

    /// Override database path (hnsw) or store file (flat)
    #[arg(long, global = true)]
    pub path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Persistent HNSW graph in RocksDB
    Hnsw,
    /// Bounded flat store in one encrypted file
    Flat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a memory
    Store {
        /// Memory text
        content: String,

        /// Embedding as comma-separated floats, e.g. "0.1,0.2,0.3"
        #[arg(short, long, allow_hyphen_values = true)]
        vector: String,

        /// Metadata as a JSON object
        #[arg(short, long)]
        metadata: Option<String>,
    },

    /// Recall the memories closest to a query vector
    Recall {
        /// Query embedding as comma-separated floats
        #[arg(short, long, allow_hyphen_values = true)]
        vector: String,

        /// Maximum results
        #[arg(short = 'k', long, default_value = "5")]
        limit: usize,
    },

    /// Show store statistics
    Stats,
}
