//! # memory-vector
//!
//! Long-term memory recall for an on-device agent.
//!
//! Two stores share one interface ([`MemoryStore`]):
//! - [`HnswIndex`]: a hierarchical navigable small-world graph persisted in
//!   RocksDB, content and metadata encrypted, vectors stored in the clear
//! - [`FlatStore`]: a bounded array scanned linearly, persisted as one
//!   encrypted JSON blob, oldest items evicted past its quota
//!
//! [`MemoryService`] runs either store behind a single-writer actor.
//!
//! ## Features
//! - Cosine similarity as the only ranking metric
//! - Pluggable neighbour selection (top-M by default, diversity heuristic)
//! - Corrupt rows are skipped on load instead of failing the whole restore
//! - Production refuses to start without an explicit encryption key

pub mod error;
pub mod flat;
pub mod graph;
pub mod heap;
pub mod hnsw;
pub mod index;
pub mod keyring;
pub mod select;
pub mod service;
pub mod similarity;

pub use error::VectorError;
pub use flat::{FlatStore, NewMemory, SCHEMA_VERSION};
pub use graph::{Graph, GraphParams, InsertDelta};
pub use heap::{MaxHeap, MinHeap, Prioritized};
pub use hnsw::{HnswConfig, HnswIndex, HnswStats, LayerStats, Node};
pub use index::MemoryStore;
pub use keyring::cipher_from_settings;
pub use select::{DiversitySelector, NeighborSelector, TopKSelector};
pub use service::{MemoryHandle, MemoryService};
pub use similarity::{cosine_similarity, dot_product};
