//! RocksDB wrapper for the graph index.
//!
//! Provides:
//! - Database open with column family setup
//! - Monotonic id allocation for new records
//! - Single-row upserts for records, vectors, adjacency and config
//! - Full scans used to rebuild the in-memory graph on startup

use rocksdb::{ColumnFamily, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_INDEX_CONFIG, CF_LAYERS, CF_RECORDS, CF_VECTOR_DATA,
};
use crate::error::StorageError;
use crate::keys::{ConfigKey, LayerKey, RecordKey};
use crate::record::{decode_vector, encode_vector, StoredRecord};
use memory_types::NodeId;

/// One persisted adjacency row. `neighbors` is an error when the row
/// could not be decoded; the caller decides whether to skip it.
#[derive(Debug)]
pub struct AdjacencyRow {
    pub key: LayerKey,
    pub neighbors: Result<Vec<NodeId>, StorageError>,
}

/// Persistent store backing the graph index
pub struct Storage {
    db: DB,
    /// Next record id; ids start at 1 and never repeat
    next_id: AtomicU64,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let next_id = Self::load_next_id(&db)?;
        debug!(next_id, "Loaded record id counter");

        Ok(Self {
            db,
            next_id: AtomicU64::new(next_id),
        })
    }

    /// Highest existing record id + 1, or 1 for an empty store
    fn load_next_id(db: &DB) -> Result<NodeId, StorageError> {
        let cf = db
            .cf_handle(CF_RECORDS)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_RECORDS.to_string()))?;

        let mut iter = db.iterator_cf(&cf, IteratorMode::End);
        if let Some(result) = iter.next() {
            let (key, _) = result?;
            let record_key = RecordKey::from_bytes(&key)?;
            return Ok(record_key.id + 1);
        }
        Ok(1)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== Record Methods ====================

    /// Allocate a new id and store the record under it.
    pub fn insert_record(&self, record: &StoredRecord) -> Result<NodeId, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.put_record(id, record)?;
        debug!(id, "Inserted record");
        Ok(id)
    }

    /// Upsert a record under an explicit id.
    pub fn put_record(&self, id: NodeId, record: &StoredRecord) -> Result<(), StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        self.db
            .put_cf(&cf, RecordKey::new(id).to_bytes(), record.to_bytes())?;
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
        Ok(())
    }

    pub fn get_record(&self, id: NodeId) -> Result<Option<StoredRecord>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        match self.db.get_cf(&cf, RecordKey::new(id).to_bytes())? {
            Some(bytes) => Ok(Some(StoredRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All records in id order. Undecodable rows are returned as errors so
    /// the caller can skip them individually.
    pub fn scan_records(
        &self,
    ) -> Result<Vec<(NodeId, Result<StoredRecord, StorageError>)>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            match RecordKey::from_bytes(&key) {
                Ok(record_key) => rows.push((record_key.id, StoredRecord::from_bytes(&value))),
                Err(e) => warn!(error = %e, "Skipping record with malformed key"),
            }
        }
        Ok(rows)
    }

    // ==================== Vector Methods ====================

    /// Store the raw vector for a node. Vectors are written unencrypted.
    pub fn put_vector(&self, id: NodeId, vector: &[f32]) -> Result<(), StorageError> {
        let cf = self.cf(CF_VECTOR_DATA)?;
        self.db
            .put_cf(&cf, RecordKey::new(id).to_bytes(), encode_vector(vector))?;
        Ok(())
    }

    pub fn get_vector(&self, id: NodeId) -> Result<Option<Vec<f32>>, StorageError> {
        let cf = self.cf(CF_VECTOR_DATA)?;
        match self.db.get_cf(&cf, RecordKey::new(id).to_bytes())? {
            Some(bytes) => Ok(Some(decode_vector(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Raw vector bytes exactly as stored.
    pub fn get_vector_bytes(&self, id: NodeId) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_VECTOR_DATA)?;
        Ok(self.db.get_cf(&cf, RecordKey::new(id).to_bytes())?)
    }

    // ==================== Adjacency Methods ====================

    /// Upsert the neighbour list of `node` at `layer`.
    pub fn put_adjacency(
        &self,
        layer: usize,
        node: NodeId,
        neighbors: &[NodeId],
    ) -> Result<(), StorageError> {
        let cf = self.cf(CF_LAYERS)?;
        let value = serde_json::to_vec(neighbors)?;
        self.db
            .put_cf(&cf, LayerKey::new(layer, node).to_bytes(), value)?;
        debug!(layer, node, degree = neighbors.len(), "Stored adjacency");
        Ok(())
    }

    pub fn get_adjacency(
        &self,
        layer: usize,
        node: NodeId,
    ) -> Result<Option<Vec<NodeId>>, StorageError> {
        let cf = self.cf(CF_LAYERS)?;
        match self.db.get_cf(&cf, LayerKey::new(layer, node).to_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All adjacency rows ordered by (layer, node).
    pub fn scan_adjacency(&self) -> Result<Vec<AdjacencyRow>, StorageError> {
        let cf = self.cf(CF_LAYERS)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            match LayerKey::from_bytes(&key) {
                Ok(key) => rows.push(AdjacencyRow {
                    key,
                    neighbors: serde_json::from_slice(&value).map_err(StorageError::from),
                }),
                Err(e) => warn!(error = %e, "Skipping adjacency row with malformed key"),
            }
        }
        Ok(rows)
    }

    // ==================== Config Methods ====================

    pub fn put_config(&self, name: &str, value: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_INDEX_CONFIG)?;
        self.db
            .put_cf(&cf, ConfigKey::new(name).to_bytes(), value.as_bytes())?;
        Ok(())
    }

    pub fn get_config(&self, name: &str) -> Result<Option<String>, StorageError> {
        let cf = self.cf(CF_INDEX_CONFIG)?;
        match self.db.get_cf(&cf, ConfigKey::new(name).to_bytes())? {
            Some(bytes) => {
                let value = String::from_utf8(bytes.to_vec())
                    .map_err(|e| StorageError::Corrupt(format!("config {}: {}", name, e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            record_count: self.count_cf_entries(self.cf(CF_RECORDS)?)?,
            vector_count: self.count_cf_entries(self.cf(CF_VECTOR_DATA)?)?,
            adjacency_count: self.count_cf_entries(self.cf(CF_LAYERS)?)?,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        std::fs::read_dir(self.db.path())
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| entry.metadata().ok())
                    .map(|metadata| metadata.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// Statistics about the storage.
#[derive(Debug, Default, Clone)]
pub struct StorageStats {
    /// Number of node records
    pub record_count: u64,
    /// Number of stored vectors
    pub vector_count: u64,
    /// Number of adjacency rows across all layers
    pub adjacency_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
