//! Integration tests for the persistent graph index.
//!
//! These tests reopen RocksDB between steps to check that what lands on
//! disk is enough to rebuild the same graph, and that damaged or partial
//! state degrades to skipped rows instead of failing the load.

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use memory_crypto::{Cipher, EncryptionKey};
use memory_storage::{Storage, StoredRecord};
use memory_types::Metadata;
use memory_vector::{
    cosine_similarity, DiversitySelector, HnswConfig, HnswIndex, NeighborSelector, VectorError,
};

fn cipher() -> Cipher {
    Cipher::new(&EncryptionKey::from_bytes([0x42; 32]))
}

fn small_config() -> HnswConfig {
    HnswConfig {
        m: 4,
        m_max: 4,
        m_max0: 8,
        ef_construction: 64,
        ef_search: 64,
    }
}

/// Deterministic pseudo-random unit-ish vectors.
fn vectors(count: usize, dim: usize) -> Vec<Vec<f32>> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..count)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    ((state % 2000) as f32 / 1000.0) - 1.0
                })
                .collect()
        })
        .collect()
}

fn tagged(i: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("seq".to_string(), serde_json::json!(i));
    metadata
}

fn build(dir: &TempDir, count: usize) -> HnswIndex {
    let mut index = HnswIndex::open(dir.path(), cipher(), small_config())
        .unwrap()
        .with_seed(7);
    for (i, v) in vectors(count, 8).iter().enumerate() {
        index.add_vector(&format!("memory {i}"), v, &tagged(i)).unwrap();
    }
    index
}

#[test]
fn test_reopen_restores_same_graph() {
    let dir = TempDir::new().unwrap();
    let queries = vectors(5, 8);

    let (graph_before, results_before) = {
        let index = build(&dir, 60);
        let results: Vec<_> = queries
            .iter()
            .map(|q| index.search_vectors(q, 5).unwrap())
            .collect();
        (index.graph().clone(), results)
    };

    let reopened = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
    assert_eq!(reopened.len(), 60);
    assert_eq!(reopened.graph(), &graph_before);

    for (query, before) in queries.iter().zip(results_before) {
        assert_eq!(reopened.search_vectors(query, 5).unwrap(), before);
    }
}

#[test]
fn test_initialize_is_idempotent() {
    let dir = TempDir::new().unwrap();
    drop(build(&dir, 20));

    let storage = Storage::open(dir.path()).unwrap();
    let mut index = HnswIndex::new(storage, cipher(), small_config()).unwrap();
    index.initialize().unwrap();
    let once = index.graph().clone();
    let stats_once = index.stats();

    index.initialize().unwrap();
    assert_eq!(index.graph(), &once);
    assert_eq!(index.stats(), stats_once);
}

#[test]
fn test_payloads_encrypted_vectors_clear() {
    let dir = TempDir::new().unwrap();
    let secret = "my bank pin is 4921";
    let vector = vec![0.25f32, -0.5, 0.75];
    let mut metadata = Metadata::new();
    metadata.insert("label".to_string(), serde_json::json!("credentials"));

    let id = {
        let mut index = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
        index.add_vector(secret, &vector, &metadata).unwrap()
    };

    let storage = Storage::open(dir.path()).unwrap();
    let record = storage.get_record(id).unwrap().unwrap();
    let raw = record.to_bytes();
    assert!(!contains(&raw, secret.as_bytes()));
    assert!(!contains(&raw, b"credentials"));

    let expected_vector: Vec<u8> = vector.iter().flat_map(|x| x.to_le_bytes()).collect();
    assert_eq!(storage.get_vector_bytes(id).unwrap(), Some(expected_vector));

    let opened = cipher().decrypt_string(&record.content).unwrap();
    assert_eq!(opened, secret);
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[test]
fn test_corrupt_record_is_skipped() {
    let dir = TempDir::new().unwrap();
    drop(build(&dir, 10));

    {
        let storage = Storage::open(dir.path()).unwrap();
        // garbage ciphertext for node 3
        storage
            .put_record(3, &StoredRecord::new(vec![0u8; 40], vec![1u8; 40]))
            .unwrap();
    }

    let index = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
    assert_eq!(index.len(), 9);
    assert!(index.get(3).is_none());

    let results = index.search_vectors(&vectors(1, 8)[0], 10).unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.id != 3));
}

#[test]
fn test_wrong_key_loads_nothing() {
    let dir = TempDir::new().unwrap();
    drop(build(&dir, 5));

    let other = Cipher::new(&EncryptionKey::from_bytes([0x01; 32]));
    let index = HnswIndex::open(dir.path(), other, small_config()).unwrap();
    assert!(index.is_empty());
    assert!(index.search_vectors(&vectors(1, 8)[0], 3).unwrap().is_empty());
}

#[test]
fn test_partially_linked_node_still_loads() {
    let dir = TempDir::new().unwrap();
    drop(build(&dir, 10));

    // a node whose insertion stopped after the record and vector writes
    let orphan = vec![0.1f32; 8];
    let orphan_id = {
        let storage = Storage::open(dir.path()).unwrap();
        let cipher = cipher();
        let record = StoredRecord::new(
            cipher.encrypt_str("half written").unwrap(),
            cipher.encrypt(b"{}").unwrap(),
        );
        let id = storage.insert_record(&record).unwrap();
        storage.put_vector(id, &orphan).unwrap();
        id
    };
    assert_eq!(orphan_id, 11);

    let mut index = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
    assert_eq!(index.len(), 11);
    assert_eq!(index.get(orphan_id).unwrap().content, "half written");
    assert!(index.neighbors(0, orphan_id).is_empty());

    let results = index.search_vectors(&vectors(1, 8)[0], 5).unwrap();
    assert_eq!(results.len(), 5);

    // later inserts keep working and ids continue past the orphan
    let next = index.add_vector("after", &vectors(1, 8)[0], &Metadata::new()).unwrap();
    assert_eq!(next, 12);
}

#[test]
fn test_missing_entry_point_recovers() {
    let dir = TempDir::new().unwrap();
    drop(build(&dir, 10));

    {
        let storage = Storage::open(dir.path()).unwrap();
        storage.put_config("entryPoint", "999").unwrap();
    }

    let index = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
    let entry = index.entry_point().unwrap();
    assert!(index.get(entry).is_some());
    assert_eq!(index.search_vectors(&vectors(1, 8)[0], 3).unwrap().len(), 3);
}

#[test]
fn test_degree_bounds_hold() {
    let dir = TempDir::new().unwrap();
    let index = build(&dir, 200);
    let config = small_config();

    for layer in 0..index.graph().layer_count() {
        let bound = if layer == 0 { config.m_max0 } else { config.m_max };
        for (node, neighbors) in index.graph().layer(layer).unwrap() {
            assert!(
                neighbors.len() <= bound,
                "node {node} at layer {layer} has {} neighbours",
                neighbors.len()
            );
            assert!(!neighbors.contains(node), "self loop at {node}");
        }
    }
}

#[test]
fn test_self_search_finds_exact_match() {
    let dir = TempDir::new().unwrap();
    let index = build(&dir, 100);

    for (i, v) in vectors(100, 8).iter().enumerate().step_by(10) {
        let results = index.search_vectors(v, 5).unwrap();
        let hit = results
            .iter()
            .find(|r| r.content == format!("memory {i}"))
            .unwrap_or_else(|| panic!("memory {i} not recalled"));
        assert!((hit.similarity - 1.0).abs() < 1e-5);
        assert_eq!(hit.metadata, tagged(i));
    }
}

#[test]
fn test_results_sorted_descending() {
    let dir = TempDir::new().unwrap();
    let index = build(&dir, 80);

    for query in vectors(10, 8) {
        let results = index.search_vectors(&query, 10).unwrap();
        assert_eq!(results.len(), 10);
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
        for r in &results {
            let node = index.get(r.id).unwrap();
            assert!((cosine_similarity(&query, &node.vector) - r.similarity).abs() < 1e-6);
        }
    }
}

#[test]
fn test_diversity_selector_plugs_in() {
    let dir = TempDir::new().unwrap();
    let selector: Box<dyn NeighborSelector> = Box::new(DiversitySelector::default());
    let mut index = HnswIndex::open(dir.path(), cipher(), small_config())
        .unwrap()
        .with_selector(selector)
        .with_seed(3);
    assert_eq!(index.selector_name(), "diversity");

    let data = vectors(50, 8);
    for (i, v) in data.iter().enumerate() {
        index.add_vector(&format!("memory {i}"), v, &Metadata::new()).unwrap();
    }

    let results = index.search_vectors(&data[17], 3).unwrap();
    assert_eq!(results[0].content, "memory 17");
    for (_, neighbors) in index.graph().layer(0).unwrap() {
        assert!(neighbors.len() <= small_config().m_max0);
    }
}

#[test]
fn test_dimension_survives_reopen() {
    let dir = TempDir::new().unwrap();
    drop(build(&dir, 3));

    let mut index = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
    assert_eq!(index.dimension(), Some(8));
    assert!(matches!(
        index.add_vector("short", &[1.0, 2.0], &Metadata::new()),
        Err(VectorError::DimensionMismatch { expected: 8, actual: 2 })
    ));
}

#[test]
fn test_insert_after_wrong_key_is_recallable() {
    let dir = TempDir::new().unwrap();
    drop(build(&dir, 5));

    let other = || Cipher::new(&EncryptionKey::from_bytes([0x01; 32]));
    let fresh = vec![0.3f32, 0.7, 0.1, -0.2, 0.5, 0.0, 0.9, -0.4];
    let id = {
        let mut index = HnswIndex::open(dir.path(), other(), small_config()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.entry_point(), None);

        let id = index.add_vector("new key", &fresh, &Metadata::new()).unwrap();
        assert_eq!(index.entry_point(), Some(id));
        let results = index.search_vectors(&fresh, 3).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
        id
    };

    let reopened = HnswIndex::open(dir.path(), other(), small_config()).unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.search_vectors(&fresh, 3).unwrap()[0].id, id);
}

#[test]
fn test_damaged_vector_skips_only_that_row() {
    let dir = TempDir::new().unwrap();
    {
        let mut index = HnswIndex::open(dir.path(), cipher(), small_config())
            .unwrap()
            .with_seed(11);
        for (i, v) in vectors(5, 3).iter().enumerate() {
            index.add_vector(&format!("memory {i}"), v, &tagged(i)).unwrap();
        }
    }
    {
        // decodable but wrong length
        let storage = Storage::open(dir.path()).unwrap();
        storage.put_vector(1, &[1.0]).unwrap();
    }

    let index = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
    assert_eq!(index.len(), 4);
    assert_eq!(index.dimension(), Some(3));
    assert!(index.get(1).is_none());
    assert!(index.get(index.entry_point().unwrap()).is_some());

    let results = index.search_vectors(&vectors(1, 3)[0], 10).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.id != 1));
}

#[test]
fn test_max_layer_ahead_of_entry_is_pinned() {
    let dir = TempDir::new().unwrap();
    let (entry, top) = {
        let index = build(&dir, 20);
        (index.entry_point().unwrap(), index.max_layer())
    };
    {
        // maxLayer landed, the matching entryPoint write did not
        let storage = Storage::open(dir.path()).unwrap();
        storage.put_config("maxLayer", &(top + 2).to_string()).unwrap();
    }

    let index = HnswIndex::open(dir.path(), cipher(), small_config()).unwrap();
    assert_eq!(index.entry_point(), Some(entry));
    assert_eq!(index.max_layer(), top);
    assert_eq!(index.search_vectors(&vectors(1, 8)[0], 3).unwrap().len(), 3);
}
