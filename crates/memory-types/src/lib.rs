//! # memory-types
//!
//! Shared types for the long-term memory engine.
//!
//! This crate defines the data structures used by every other crate:
//! - Records: what a recall returns (`MemoryRecord`) and the metadata map
//! - Settings: layered configuration for the graph index and flat store
//! - Errors: the settings error type
//!
//! ## Usage
//!
//! ```rust
//! use memory_types::{MemoryRecord, Metadata};
//!
//! let record = MemoryRecord::new(1, "hello", Metadata::new(), 0.9);
//! assert_eq!(record.id, 1);
//! ```

pub mod config;
pub mod error;
pub mod record;

pub use config::{Environment, FlatSettings, HnswSettings, Settings};
pub use error::MemoryError;
pub use record::{MemoryRecord, Metadata, NodeId};
