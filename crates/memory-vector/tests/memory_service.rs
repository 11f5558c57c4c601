//! The memory service driving real stores from concurrent tasks.

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use memory_crypto::{Cipher, EncryptionKey};
use memory_types::{FlatSettings, Metadata};
use memory_vector::{FlatStore, HnswConfig, HnswIndex, MemoryService, VectorError};

fn cipher() -> Cipher {
    Cipher::new(&EncryptionKey::from_bytes([0x5a; 32]))
}

fn direction(i: usize) -> Vec<f32> {
    let angle = i as f32 * 0.1;
    vec![angle.cos(), angle.sin(), 0.25]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_on_hnsw() {
    let dir = TempDir::new().unwrap();
    let index = HnswIndex::open(dir.path(), cipher(), HnswConfig::default()).unwrap();
    let handle = MemoryService::spawn(Box::new(index));
    assert_eq!(handle.backend(), "hnsw");

    let mut tasks = Vec::new();
    for i in 0..24 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle
                .store(format!("memory {i}"), direction(i), Metadata::new())
                .await
                .unwrap()
        }));
    }
    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.sort_unstable();
    assert_eq!(ids, (1..=24).collect::<Vec<u64>>());
    assert_eq!(handle.len().await.unwrap(), 24);

    let results = handle.recall(direction(5), 3).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].content, "memory 5");
}

#[tokio::test]
async fn test_flat_store_behind_service() {
    let dir = TempDir::new().unwrap();
    let store = FlatStore::open(dir.path().join("flat.bin"), cipher(), &FlatSettings::default())
        .unwrap();
    let handle = MemoryService::spawn(Box::new(store));

    handle.store("north", vec![0.0, 1.0], Metadata::new()).await.unwrap();
    handle.store("east", vec![1.0, 0.0], Metadata::new()).await.unwrap();

    let results = handle.recall(vec![0.9, 0.1], 1).await.unwrap();
    assert_eq!(results[0].content, "east");

    let err = handle.recall(vec![1.0], 1).await.unwrap_err();
    assert!(matches!(err, VectorError::DimensionMismatch { .. }));
}

#[tokio::test]
async fn test_service_persists_after_handles_drop() {
    let dir = TempDir::new().unwrap();
    {
        let index = HnswIndex::open(dir.path(), cipher(), HnswConfig::default()).unwrap();
        let handle = MemoryService::spawn(Box::new(index));
        handle.store("remember me", direction(1), Metadata::new()).await.unwrap();
    }

    // the actor releases the database once its last handle is gone
    let mut reopened = None;
    for _ in 0..50 {
        match HnswIndex::open(dir.path(), cipher(), HnswConfig::default()) {
            Ok(index) => {
                reopened = Some(index);
                break;
            }
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
        }
    }
    let index = reopened.expect("database was not released");
    assert_eq!(index.search_vectors(&direction(1), 1).unwrap()[0].content, "remember me");
}
