//! Value layouts for the records and vector_data column families.

use crate::error::StorageError;

/// Encrypted payloads of one node, exactly as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub content: Vec<u8>,
    pub metadata: Vec<u8>,
}

impl StoredRecord {
    pub fn new(content: Vec<u8>, metadata: Vec<u8>) -> Self {
        Self { content, metadata }
    }

    /// Layout: `[u32 LE content_len][content][metadata]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.content.len() + self.metadata.len());
        out.extend_from_slice(&(self.content.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.content);
        out.extend_from_slice(&self.metadata);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        if bytes.len() < 4 {
            return Err(StorageError::Corrupt(format!(
                "record too short: {} bytes",
                bytes.len()
            )));
        }
        let (len_bytes, rest) = bytes.split_at(4);
        let content_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
            as usize;
        if content_len > rest.len() {
            return Err(StorageError::Corrupt(format!(
                "content length {} exceeds record body {}",
                content_len,
                rest.len()
            )));
        }
        let (content, metadata) = rest.split_at(content_len);
        Ok(Self {
            content: content.to_vec(),
            metadata: metadata.to_vec(),
        })
    }
}

/// Encode a vector as raw little-endian f32 bytes.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode raw little-endian f32 bytes.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, StorageError> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::Corrupt(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
