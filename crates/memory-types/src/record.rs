//! Record types returned by recall.

use serde::{Deserialize, Serialize};

/// Identifier of a stored memory.
///
/// Assigned by the persistent store and used as the only handle into the
/// node map; nothing holds a reference to a node directly.
pub type NodeId = u64;

/// Free-form metadata attached to a memory.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A recalled memory with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: NodeId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Cosine similarity to the query in [-1, 1]
    pub similarity: f32,
}

impl MemoryRecord {
    pub fn new(id: NodeId, content: impl Into<String>, metadata: Metadata, similarity: f32) -> Self {
        Self {
            id,
            content: content.into(),
            metadata,
            similarity,
        }
    }
}
