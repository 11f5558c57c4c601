//! Store trait shared by the graph index and the flat store.
//!
//! The memory service and the CLI only see this interface, so either
//! backend can sit behind them.

use memory_types::{MemoryRecord, Metadata, NodeId};

use crate::error::VectorError;
use crate::flat::{FlatStore, NewMemory};
use crate::hnsw::HnswIndex;

/// Long-term memory backend.
///
/// Calls are synchronous and take `&mut self` for writes; concurrent
/// callers go through [`crate::MemoryService`].
pub trait MemoryStore: Send {
    /// Persist one memory and return its id.
    fn store(
        &mut self,
        content: &str,
        vector: &[f32],
        metadata: &Metadata,
    ) -> Result<NodeId, VectorError>;

    /// Up to `k` memories, most similar first.
    fn recall(&self, query: &[f32], k: usize) -> Result<Vec<MemoryRecord>, VectorError>;

    /// Number of memories held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}

impl MemoryStore for HnswIndex {
    fn store(
        &mut self,
        content: &str,
        vector: &[f32],
        metadata: &Metadata,
    ) -> Result<NodeId, VectorError> {
        self.add_vector(content, vector, metadata)
    }

    fn recall(&self, query: &[f32], k: usize) -> Result<Vec<MemoryRecord>, VectorError> {
        self.search_vectors(query, k)
    }

    fn len(&self) -> usize {
        HnswIndex::len(self)
    }

    fn backend(&self) -> &'static str {
        "hnsw"
    }
}

impl MemoryStore for FlatStore {
    fn store(
        &mut self,
        content: &str,
        vector: &[f32],
        metadata: &Metadata,
    ) -> Result<NodeId, VectorError> {
        let ids = self.remember(vec![NewMemory {
            content: content.to_string(),
            vector: vector.to_vec(),
            metadata: metadata.clone(),
        }])?;
        ids.first()
            .copied()
            .ok_or_else(|| VectorError::InvalidInput("nothing stored".to_string()))
    }

    fn recall(&self, query: &[f32], k: usize) -> Result<Vec<MemoryRecord>, VectorError> {
        FlatStore::recall(self, query, k)
    }

    fn len(&self) -> usize {
        FlatStore::len(self)
    }

    fn backend(&self) -> &'static str {
        "flat"
    }
}
