//! Memory CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (store, recall, stats)

pub mod cli;
pub mod commands;

pub use cli::{Backend, Cli, Commands};
pub use commands::{
    handle_recall, handle_stats, handle_store, init_logging, load_settings, open_store,
    parse_metadata, parse_vector,
};
