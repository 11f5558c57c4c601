//! Persistent HNSW index.
//!
//! Wraps the in-memory [`Graph`] with the RocksDB [`Storage`] and the
//! payload [`Cipher`]. Every write is its own upsert: the record, then the
//! vector, then each adjacency row the insertion changed, then the entry
//! point. A crash in between leaves a partially linked graph that still
//! loads and searches.
//!
//! Defaults:
//! - M = 16 (m_max 16, m_max0 32)
//! - ef_construction = 200
//! - ef_search = 50

use std::collections::HashMap;
use std::path::Path;

use memory_crypto::Cipher;
use memory_storage::{Storage, StoredRecord};
use memory_types::{HnswSettings, MemoryRecord, Metadata, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::VectorError;
use crate::graph::{Graph, GraphParams};
use crate::select::{NeighborSelector, TopKSelector};

/// HNSW tunables. Same shape as the `[hnsw]` settings table.
pub type HnswConfig = HnswSettings;

const ENTRY_POINT_KEY: &str = "entryPoint";
const MAX_LAYER_KEY: &str = "maxLayer";

/// Decrypted payload held for every loaded node.
#[derive(Debug, Clone)]
struct Payload {
    content: String,
    metadata: Metadata,
}

/// A node as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
}

/// Per-layer shape of the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerStats {
    pub nodes: usize,
    pub edges: usize,
    pub max_degree: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HnswStats {
    pub node_count: usize,
    pub dimension: Option<usize>,
    pub max_layer: usize,
    pub entry_point: Option<NodeId>,
    pub layers: Vec<LayerStats>,
}

pub struct HnswIndex {
    storage: Storage,
    cipher: Cipher,
    config: HnswConfig,
    graph: Graph,
    payloads: HashMap<NodeId, Payload>,
    selector: Box<dyn NeighborSelector>,
    rng: StdRng,
    dimension: Option<usize>,
    initialized: bool,
}

impl HnswIndex {
    /// Wrap an open store. Nothing is loaded until [`HnswIndex::initialize`].
    pub fn new(storage: Storage, cipher: Cipher, config: HnswConfig) -> Result<Self, VectorError> {
        config.validate().map_err(VectorError::Config)?;
        Ok(Self {
            storage,
            cipher,
            config,
            graph: Graph::new(),
            payloads: HashMap::new(),
            selector: Box::new(TopKSelector),
            rng: StdRng::from_os_rng(),
            dimension: None,
            initialized: false,
        })
    }

    /// Open the store at `path` and load the persisted graph.
    pub fn open(path: &Path, cipher: Cipher, config: HnswConfig) -> Result<Self, VectorError> {
        let storage = Storage::open(path)?;
        let mut index = Self::new(storage, cipher, config)?;
        index.initialize()?;
        Ok(index)
    }

    /// Replace the neighbour selection strategy.
    pub fn with_selector(mut self, selector: Box<dyn NeighborSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Seed level generation for reproducible graphs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Rebuild the in-memory graph from storage. A second call is a no-op.
    pub fn initialize(&mut self) -> Result<(), VectorError> {
        if self.initialized {
            return Ok(());
        }

        let entry_point = self.load_config_value(ENTRY_POINT_KEY)?;
        let max_layer = self.load_config_value(MAX_LAYER_KEY)?.unwrap_or(0) as usize;
        let mut graph = Graph::with_entry(entry_point, max_layer);

        let mut skipped_rows = 0usize;
        for row in self.storage.scan_adjacency()? {
            match row.neighbors {
                Ok(neighbors) => graph.set_neighbors(row.key.layer, row.key.node, neighbors),
                Err(e) => {
                    warn!(layer = row.key.layer, node = row.key.node, error = %e, "Skipping corrupt adjacency row");
                    skipped_rows += 1;
                }
            }
        }

        let mut loaded = Vec::new();
        for (id, record) in self.storage.scan_records()? {
            let opened = record
                .map_err(VectorError::from)
                .and_then(|record| self.open_record(id, &record));
            match opened {
                Ok(Some((payload, vector))) => loaded.push((id, payload, vector)),
                Ok(None) => {
                    warn!(id, "Skipping record without vector");
                    skipped_rows += 1;
                }
                Err(e) => {
                    warn!(id, error = %e, "Skipping unreadable record");
                    skipped_rows += 1;
                }
            }
        }

        let dimension = majority_dimension(loaded.iter().map(|(_, _, vector)| vector.len()));
        let mut payloads = HashMap::new();
        for (id, payload, vector) in loaded {
            if let Some(expected) = dimension.filter(|&d| d != vector.len()) {
                warn!(id, expected, actual = vector.len(), "Skipping record with mismatched dimension");
                skipped_rows += 1;
                continue;
            }
            graph.cache_vector(id, vector);
            payloads.insert(id, payload);
        }

        repair_entry(&mut graph);

        info!(
            nodes = graph.len(),
            max_layer = graph.max_layer(),
            entry_point = ?graph.entry_point(),
            skipped_rows,
            "Initialized HNSW index"
        );

        self.graph = graph;
        self.payloads = payloads;
        self.dimension = dimension;
        self.initialized = true;
        Ok(())
    }

    fn load_config_value(&self, name: &str) -> Result<Option<u64>, VectorError> {
        let Some(raw) = self.storage.get_config(name)? else {
            return Ok(None);
        };
        match raw.trim().parse::<u64>() {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(name, value = %raw, error = %e, "Ignoring unparsable index config");
                Ok(None)
            }
        }
    }

    /// Decrypt one record and fetch its vector. `None` when no vector row exists.
    fn open_record(
        &self,
        id: NodeId,
        record: &StoredRecord,
    ) -> Result<Option<(Payload, Vec<f32>)>, VectorError> {
        let content = self.cipher.decrypt_string(&record.content)?;
        let metadata = if record.metadata.is_empty() {
            Metadata::new()
        } else {
            serde_json::from_slice(&self.cipher.decrypt(&record.metadata)?)?
        };
        Ok(self
            .storage
            .get_vector(id)?
            .map(|vector| (Payload { content, metadata }, vector)))
    }

    /// Encrypt and persist a memory, then link it into the graph.
    pub fn add_vector(
        &mut self,
        content: &str,
        vector: &[f32],
        metadata: &Metadata,
    ) -> Result<NodeId, VectorError> {
        self.initialize()?;
        self.check_vector(vector)?;

        let sealed_content = self.cipher.encrypt_str(content)?;
        let sealed_metadata = self.cipher.encrypt(&serde_json::to_vec(metadata)?)?;
        let id = self
            .storage
            .insert_record(&StoredRecord::new(sealed_content, sealed_metadata))?;
        self.storage.put_vector(id, vector)?;

        self.dimension.get_or_insert(vector.len());
        self.payloads.insert(
            id,
            Payload {
                content: content.to_string(),
                metadata: metadata.clone(),
            },
        );
        self.graph.cache_vector(id, vector.to_vec());

        self.insert(id, vector)?;
        Ok(id)
    }

    fn insert(&mut self, id: NodeId, vector: &[f32]) -> Result<(), VectorError> {
        let level = self.random_level();
        let params = self.params();
        let delta = self
            .graph
            .insert(id, vector, level, &params, self.selector.as_ref());

        for &(layer, node) in &delta.rows {
            self.storage
                .put_adjacency(layer, node, self.graph.neighbors(layer, node))?;
        }
        if delta.entry_changed {
            // maxLayer first: a stale entry below max_layer is repaired on load
            self.storage
                .put_config(MAX_LAYER_KEY, &self.graph.max_layer().to_string())?;
            if let Some(entry) = self.graph.entry_point() {
                self.storage.put_config(ENTRY_POINT_KEY, &entry.to_string())?;
            }
        }

        debug!(
            id,
            level,
            rows = delta.rows.len(),
            entry_changed = delta.entry_changed,
            "Inserted node"
        );
        Ok(())
    }

    /// `floor(-ln(U) / ln(m))` with `U` in (0, 1].
    fn random_level(&mut self) -> usize {
        let u = 1.0 - self.rng.random::<f64>();
        let level = -u.ln() / (self.config.m as f64).ln();
        level.floor() as usize
    }

    fn params(&self) -> GraphParams {
        GraphParams {
            m_max: self.config.m_max,
            m_max0: self.config.m_max0,
            ef_construction: self.config.ef_construction,
        }
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.is_empty() {
            return Err(VectorError::InvalidInput("vector is empty".to_string()));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(VectorError::InvalidInput(
                "vector contains non-finite values".to_string(),
            ));
        }
        match self.dimension {
            Some(expected) if expected != vector.len() => Err(VectorError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Top `limit` memories by cosine similarity, best first.
    pub fn search_vectors(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, VectorError> {
        if limit == 0 || self.graph.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension {
            if expected != query.len() {
                return Err(VectorError::DimensionMismatch {
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut results: Vec<MemoryRecord> = self
            .graph
            .search(query, self.config.ef_search)
            .into_iter()
            .filter_map(|scored| {
                self.payloads.get(&scored.value).map(|payload| {
                    MemoryRecord::new(
                        scored.value,
                        payload.content.clone(),
                        payload.metadata.clone(),
                        scored.priority,
                    )
                })
            })
            .collect();
        results.truncate(limit);

        debug!(limit, found = results.len(), "Searched HNSW index");
        Ok(results)
    }

    /// Beam search on a single layer from `entry`, ids best first.
    pub fn search_layer_ef(
        &self,
        query: &[f32],
        entry: NodeId,
        layer: usize,
        ef: usize,
    ) -> Vec<NodeId> {
        self.graph.search_layer_ef(query, entry, layer, ef)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Vector length fixed by the first stored vector.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn get(&self, id: NodeId) -> Option<Node> {
        let payload = self.payloads.get(&id)?;
        let vector = self.graph.vector(id)?;
        Some(Node {
            id,
            vector: vector.to_vec(),
            content: payload.content.clone(),
            metadata: payload.metadata.clone(),
        })
    }

    pub fn neighbors(&self, layer: usize, id: NodeId) -> &[NodeId] {
        self.graph.neighbors(layer, id)
    }

    pub fn entry_point(&self) -> Option<NodeId> {
        self.graph.entry_point()
    }

    pub fn max_layer(&self) -> usize {
        self.graph.max_layer()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn stats(&self) -> HnswStats {
        let layers = (0..self.graph.layer_count())
            .filter_map(|layer| self.graph.layer(layer))
            .map(|adjacency| LayerStats {
                nodes: adjacency.len(),
                edges: adjacency.values().map(Vec::len).sum(),
                max_degree: adjacency.values().map(Vec::len).max().unwrap_or(0),
            })
            .collect();

        HnswStats {
            node_count: self.len(),
            dimension: self.dimension,
            max_layer: self.graph.max_layer(),
            entry_point: self.graph.entry_point(),
            layers,
        }
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Swap tunables for subsequent operations. Existing edges are kept.
    pub fn reconfigure(&mut self, config: HnswConfig) -> Result<(), VectorError> {
        config.validate().map_err(VectorError::Config)?;
        info!(?config, "Reconfigured HNSW index");
        self.config = config;
        Ok(())
    }

    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn flush(&self) -> Result<(), VectorError> {
        self.storage.flush()?;
        Ok(())
    }
}

/// Most common vector length; ties go to the length seen first.
fn majority_dimension(lengths: impl Iterator<Item = usize>) -> Option<usize> {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for len in lengths {
        match counts.iter_mut().find(|(dim, _)| *dim == len) {
            Some((_, count)) => *count += 1,
            None => counts.push((len, 1)),
        }
    }
    // max_by_key keeps the last maximum, so walk in reverse
    counts
        .into_iter()
        .rev()
        .max_by_key(|&(_, count)| count)
        .map(|(dim, _)| dim)
}

/// Make the entry point a loaded node at the top of the graph.
///
/// A missing entry moves to the highest loaded node; with no loaded node
/// at all it is cleared so the next insert takes over. A loaded entry
/// pins `max_layer` to its own level.
fn repair_entry(graph: &mut Graph) {
    let loaded_entry = graph
        .entry_point()
        .filter(|&entry| graph.vector(entry).is_some());

    match loaded_entry {
        Some(entry) => {
            let level = graph.node_level(entry).unwrap_or(0);
            if level != graph.max_layer() {
                warn!(
                    entry,
                    stored = graph.max_layer(),
                    level,
                    "Max layer disagrees with entry point level"
                );
                graph.set_entry(entry, level);
            }
        }
        None => match graph.highest_cached_node() {
            Some((entry, layer)) => {
                warn!(
                    stored = ?graph.entry_point(),
                    entry,
                    layer,
                    "Entry point missing, using highest loaded node"
                );
                graph.set_entry(entry, layer);
            }
            None => {
                if graph.entry_point().is_some() {
                    warn!(stored = ?graph.entry_point(), "No node loaded, dropping entry point");
                }
                graph.clear_entry();
            }
        },
    }
}
