//! Storage layer for the memory graph index.
//!
//! Provides RocksDB-backed storage with one column family per table:
//! - records: encrypted content + metadata per node
//! - vector_data: raw little-endian f32 vectors (not encrypted)
//! - layers: adjacency list per (layer, node)
//! - index_config: entry point and max layer
//!
//! Every write is an individual upsert. Nothing here spans several rows in
//! one batch, so a crash mid-insert can leave a partially linked graph.

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod record;

pub use db::{AdjacencyRow, Storage, StorageStats};
pub use error::StorageError;
pub use keys::{ConfigKey, LayerKey, RecordKey};
pub use record::{decode_vector, encode_vector, StoredRecord};
