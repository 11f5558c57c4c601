//! Key encoding and decoding for storage layer.
//!
//! Keys are zero-padded strings so lexicographic order matches numeric
//! order:
//! - records / vector_data: `rec:{id:020}`
//! - layers: `layer:{layer:04}:{node:020}`
//! - index_config: `cfg:{name}`

use crate::error::StorageError;
use memory_types::NodeId;

/// Key for a node record or its vector payload
/// Format: rec:{id:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordKey {
    pub id: NodeId,
}

impl RecordKey {
    pub fn new(id: NodeId) -> Self {
        Self { id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("rec:{:020}", self.id).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let id = s
            .strip_prefix("rec:")
            .ok_or_else(|| StorageError::Key(format!("Invalid record key format: {}", s)))?
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid id: {}", e)))?;

        Ok(Self { id })
    }
}

/// Key for one adjacency row
/// Format: layer:{layer:04}:{node:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerKey {
    pub layer: usize,
    pub node: NodeId,
}

impl LayerKey {
    pub fn new(layer: usize, node: NodeId) -> Self {
        Self { layer, node }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("layer:{:04}:{:020}", self.layer, self.node).into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "layer" {
            return Err(StorageError::Key(format!("Invalid layer key format: {}", s)));
        }

        let layer = parts[1]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid layer: {}", e)))?;
        let node = parts[2]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid node id: {}", e)))?;

        Ok(Self { layer, node })
    }
}

/// Key for an index configuration value
/// Format: cfg:{name}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey {
    pub name: String,
}

impl ConfigKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("cfg:{}", self.name).into_bytes()
    }
}
