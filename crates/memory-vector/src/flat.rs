//! Bounded flat memory store.
//!
//! Items live in insertion order and are scanned linearly on recall. The
//! whole store is one encrypted JSON blob on disk, rewritten atomically
//! after every change. Once the size estimate passes the quota the oldest
//! items are dropped first.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use memory_crypto::Cipher;
use memory_types::{FlatSettings, MemoryRecord, Metadata, NodeId, Settings};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::VectorError;
use crate::keyring::cipher_from_settings;
use crate::similarity::cosine_similarity;

/// Current on-disk layout. Version 1 items carry no id or metadata.
pub const SCHEMA_VERSION: u32 = 2;

fn legacy_version() -> u32 {
    1
}

/// A memory to be stored.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatItem {
    #[serde(default)]
    id: NodeId,
    vector: Vec<f32>,
    #[serde(with = "sealed")]
    content: Vec<u8>,
    #[serde(default, with = "sealed")]
    metadata: Vec<u8>,
    #[serde(default = "legacy_version")]
    version: u32,
}

impl FlatItem {
    /// Bytes counted against the quota.
    fn size_estimate(&self) -> usize {
        4 * self.vector.len() + self.content.len() + self.metadata.len()
    }
}

#[derive(Debug, Deserialize)]
struct FlatBlob {
    #[serde(default = "legacy_version")]
    version: u32,
    #[serde(default)]
    next_id: NodeId,
    #[serde(default)]
    items: VecDeque<FlatItem>,
}

#[derive(Serialize)]
struct FlatBlobRef<'a> {
    version: u32,
    next_id: NodeId,
    items: Vec<&'a FlatItem>,
}

/// Ciphertext fields as base64 strings inside the JSON blob.
mod sealed {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug)]
pub struct FlatStore {
    path: PathBuf,
    cipher: Cipher,
    max_bytes: usize,
    items: VecDeque<FlatItem>,
    size_bytes: usize,
    next_id: NodeId,
}

impl FlatStore {
    /// Open the store at `path`, loading (and migrating) any existing blob.
    pub fn open(
        path: impl Into<PathBuf>,
        cipher: Cipher,
        settings: &FlatSettings,
    ) -> Result<Self, VectorError> {
        settings.validate().map_err(VectorError::Config)?;
        let mut store = Self {
            path: path.into(),
            cipher,
            max_bytes: settings.max_bytes(),
            items: VecDeque::new(),
            size_bytes: 0,
            next_id: 1,
        };
        store.load()?;
        Ok(store)
    }

    /// Resolve key, path and quota from settings. Fails in production
    /// when no key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, VectorError> {
        let cipher = cipher_from_settings(settings)?;
        Self::open(settings.expanded_flat_store_path(), cipher, &settings.flat)
    }

    /// Encrypt and append `memories`, evict past the quota, then save.
    /// A failed save leaves the store as it was.
    /// Returns the ids assigned, in input order.
    pub fn remember(&mut self, memories: Vec<NewMemory>) -> Result<Vec<NodeId>, VectorError> {
        let mut dimension = self.items.front().map(|item| item.vector.len());
        let mut pending = Vec::with_capacity(memories.len());

        for memory in memories {
            check_vector(&memory.vector, dimension)?;
            dimension.get_or_insert(memory.vector.len());

            let content = self.cipher.encrypt_str(&memory.content)?;
            let metadata = self.cipher.encrypt(&serde_json::to_vec(&memory.metadata)?)?;
            pending.push((memory.vector, content, metadata));
        }

        let previous_len = self.items.len();
        let previous_next_id = self.next_id;
        let previous_size = self.size_bytes;

        let mut ids = Vec::with_capacity(pending.len());
        for (vector, content, metadata) in pending {
            let item = FlatItem {
                id: self.next_id,
                vector,
                content,
                metadata,
                version: SCHEMA_VERSION,
            };
            self.next_id += 1;
            self.size_bytes += item.size_estimate();
            ids.push(item.id);
            self.items.push_back(item);
        }

        // roll back unless the new blob reaches disk
        let evicted = self.eviction_count();
        if let Err(e) = self.write(evicted) {
            self.items.truncate(previous_len);
            self.next_id = previous_next_id;
            self.size_bytes = previous_size;
            return Err(e);
        }

        let freed: usize = self
            .items
            .drain(..evicted)
            .map(|item| item.size_estimate())
            .sum();
        self.size_bytes = self.size_bytes.saturating_sub(freed);
        if evicted > 0 {
            debug!(evicted, size_bytes = self.size_bytes, "Evicted oldest memories");
        }
        Ok(ids)
    }

    /// How many of the oldest items must go to get back under the quota.
    fn eviction_count(&self) -> usize {
        let mut size = self.size_bytes;
        let mut count = 0;
        for item in &self.items {
            if size <= self.max_bytes {
                break;
            }
            size = size.saturating_sub(item.size_estimate());
            count += 1;
        }
        count
    }

    /// Linear cosine scan; only the top `k` items are decrypted.
    pub fn recall(&self, query: &[f32], k: usize) -> Result<Vec<MemoryRecord>, VectorError> {
        if k == 0 || self.items.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.items.front().map(|item| item.vector.len()) {
            if expected != query.len() {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<(&FlatItem, f32)> = self
            .items
            .iter()
            .map(|item| (item, cosine_similarity(query, &item.vector)))
            .collect();
        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let mut results = Vec::with_capacity(scored.len());
        for (item, similarity) in scored {
            match self.open_item(item) {
                Ok((content, metadata)) => {
                    results.push(MemoryRecord::new(item.id, content, metadata, similarity))
                }
                Err(e) => warn!(id = item.id, error = %e, "Skipping undecryptable memory"),
            }
        }
        Ok(results)
    }

    fn open_item(&self, item: &FlatItem) -> Result<(String, Metadata), VectorError> {
        let content = self.cipher.decrypt_string(&item.content)?;
        let metadata = if item.metadata.is_empty() {
            Metadata::new()
        } else {
            serde_json::from_slice(&self.cipher.decrypt(&item.metadata)?)?
        };
        Ok((content, metadata))
    }

    /// Read the blob from disk. A missing file is an empty store; a stale
    /// version is migrated and written back.
    pub fn load(&mut self) -> Result<(), VectorError> {
        let sealed = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "No flat store file, starting empty");
                self.items.clear();
                self.size_bytes = 0;
                self.next_id = 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let blob: FlatBlob = serde_json::from_slice(&self.cipher.decrypt(&sealed)?)?;
        if blob.version > SCHEMA_VERSION {
            return Err(VectorError::Serialization(format!(
                "flat store version {} is newer than supported {}",
                blob.version, SCHEMA_VERSION
            )));
        }

        let stale = blob.version < SCHEMA_VERSION
            || blob.items.iter().any(|item| item.version < SCHEMA_VERSION);

        self.items = blob.items;
        self.next_id = self
            .items
            .iter()
            .map(|item| item.id + 1)
            .max()
            .unwrap_or(1)
            .max(blob.next_id)
            .max(1);

        if stale {
            self.migrate(blob.version);
        }
        self.size_bytes = self.items.iter().map(FlatItem::size_estimate).sum();

        info!(
            path = ?self.path,
            items = self.items.len(),
            size_bytes = self.size_bytes,
            "Loaded flat store"
        );

        if stale {
            self.save()?;
        }
        Ok(())
    }

    /// Bring every item to the current version; v1 items get fresh ids.
    fn migrate(&mut self, from: u32) {
        let mut migrated = 0usize;
        for item in self.items.iter_mut() {
            if item.id == 0 {
                item.id = self.next_id;
                self.next_id += 1;
            }
            if item.version < SCHEMA_VERSION {
                item.version = SCHEMA_VERSION;
                migrated += 1;
            }
        }
        info!(from, to = SCHEMA_VERSION, migrated, "Migrated flat store");
    }

    /// Encrypt the whole store and replace the file atomically.
    pub fn save(&self) -> Result<(), VectorError> {
        self.write(0)
    }

    /// Save everything except the `skip` oldest items.
    fn write(&self, skip: usize) -> Result<(), VectorError> {
        let blob = FlatBlobRef {
            version: SCHEMA_VERSION,
            next_id: self.next_id,
            items: self.items.iter().skip(skip).collect(),
        };
        let sealed = self.cipher.encrypt(&serde_json::to_vec(&blob)?)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &sealed)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(path = ?self.path, items = blob.items.len(), "Saved flat store");
        Ok(())
    }

    /// Drop every item and save. Ids are not reused.
    pub fn clear(&mut self) -> Result<(), VectorError> {
        self.write(self.items.len())?;
        self.items.clear();
        self.size_bytes = 0;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current size estimate counted against the quota.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn check_vector(vector: &[f32], dimension: Option<usize>) -> Result<(), VectorError> {
    if vector.is_empty() {
        return Err(VectorError::InvalidInput("vector is empty".to_string()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(VectorError::InvalidInput(
            "vector contains non-finite values".to_string(),
        ));
    }
    match dimension {
        Some(expected) if expected != vector.len() => Err(VectorError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}
