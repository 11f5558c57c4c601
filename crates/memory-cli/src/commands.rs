//! Command implementations for the memory tool.
//!
//! Handles:
//! - store: encrypt and persist one memory, print its id
//! - recall: print the closest memories as JSON
//! - stats: print backend statistics as JSON

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::info;

use memory_types::{Metadata, Settings};
use memory_vector::{cipher_from_settings, FlatStore, HnswIndex, MemoryService, MemoryStore};

use crate::cli::Backend;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    backend: Backend,
    path_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    if let Some(path) = path_override {
        match backend {
            Backend::Hnsw => settings.db_path = path.to_string(),
            Backend::Flat => settings.flat_store_path = path.to_string(),
        }
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level. Logs go to stderr so stdout stays machine readable.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open the selected backend. Fails in production without a key.
pub fn open_store(settings: &Settings, backend: Backend) -> Result<Box<dyn MemoryStore>> {
    let cipher = cipher_from_settings(settings).context("Failed to resolve encryption key")?;

    match backend {
        Backend::Hnsw => {
            let db_path = settings.expanded_db_path();
            create_parent(&db_path)?;
            info!(path = ?db_path, "Opening graph index");
            let index = HnswIndex::open(&db_path, cipher, settings.hnsw.clone())
                .context("Failed to open graph index")?;
            Ok(Box::new(index))
        }
        Backend::Flat => {
            let path = settings.expanded_flat_store_path();
            info!(path = ?path, "Opening flat store");
            let store = FlatStore::open(path, cipher, &settings.flat)
                .context("Failed to open flat store")?;
            Ok(Box::new(store))
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
    }
    Ok(())
}

/// Parse "0.1, 0.2,0.3" or "[0.1, 0.2, 0.3]".
pub fn parse_vector(raw: &str) -> Result<Vec<f32>> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    let vector = trimmed
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f32>()
                .with_context(|| format!("Invalid vector component: {:?}", part))
        })
        .collect::<Result<Vec<f32>>>()?;

    if vector.is_empty() {
        bail!("Vector must have at least one component");
    }
    Ok(vector)
}

/// Parse an optional JSON object; absent means empty metadata.
pub fn parse_metadata(raw: Option<&str>) -> Result<Metadata> {
    match raw {
        Some(raw) => serde_json::from_str(raw).context("Metadata must be a JSON object"),
        None => Ok(Metadata::new()),
    }
}

pub async fn handle_store(
    settings: &Settings,
    backend: Backend,
    content: String,
    vector: &str,
    metadata: Option<&str>,
) -> Result<()> {
    let vector = parse_vector(vector)?;
    let metadata = parse_metadata(metadata)?;

    let handle = MemoryService::spawn(open_store(settings, backend)?);
    let id = handle
        .store(content, vector, metadata)
        .await
        .context("Failed to store memory")?;

    println!("{}", json!({ "id": id }));
    Ok(())
}

pub async fn handle_recall(
    settings: &Settings,
    backend: Backend,
    vector: &str,
    limit: usize,
) -> Result<()> {
    let query = parse_vector(vector)?;

    let handle = MemoryService::spawn(open_store(settings, backend)?);
    let records = handle
        .recall(query, limit)
        .await
        .context("Failed to recall memories")?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

pub fn handle_stats(settings: &Settings, backend: Backend) -> Result<()> {
    let cipher = cipher_from_settings(settings).context("Failed to resolve encryption key")?;

    let report = match backend {
        Backend::Hnsw => {
            let db_path = settings.expanded_db_path();
            create_parent(&db_path)?;
            let index = HnswIndex::open(&db_path, cipher, settings.hnsw.clone())
                .context("Failed to open graph index")?;
            let storage = index
                .storage()
                .get_stats()
                .context("Failed to read storage stats")?;
            json!({
                "backend": "hnsw",
                "path": db_path,
                "index": index.stats(),
                "selector": index.selector_name(),
                "storage": {
                    "records": storage.record_count,
                    "vectors": storage.vector_count,
                    "adjacency_rows": storage.adjacency_count,
                    "disk_usage_bytes": storage.disk_usage_bytes,
                },
            })
        }
        Backend::Flat => {
            let path = settings.expanded_flat_store_path();
            let store =
                FlatStore::open(&path, cipher, &settings.flat).context("Failed to open flat store")?;
            json!({
                "backend": "flat",
                "path": path,
                "items": store.len(),
                "size_bytes": store.size_bytes(),
                "max_bytes": store.max_bytes(),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
