//! Error types for the memory engine.

use thiserror::Error;

/// Error raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
