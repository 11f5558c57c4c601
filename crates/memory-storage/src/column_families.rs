//! Column family definitions for RocksDB.
//!
//! Each column family plays the role of one table:
//! - records: encrypted content/metadata, keyed by node id
//! - vector_data: raw vector blobs, keyed by node id
//! - layers: neighbour lists, keyed by (layer, node id)
//! - index_config: small key/value settings (entryPoint, maxLayer)

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for encrypted node records
pub const CF_RECORDS: &str = "records";

/// Column family name for raw vector payloads
pub const CF_VECTOR_DATA: &str = "vector_data";

/// Column family name for per-layer adjacency lists
pub const CF_LAYERS: &str = "layers";

/// Column family name for index configuration
pub const CF_INDEX_CONFIG: &str = "index_config";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_RECORDS, CF_VECTOR_DATA, CF_LAYERS, CF_INDEX_CONFIG];

/// Ciphertext does not compress; skip the work.
fn records_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::None);
    opts
}

/// Adjacency rows are small JSON arrays rewritten often.
fn layers_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_RECORDS, records_options()),
        ColumnFamilyDescriptor::new(CF_VECTOR_DATA, Options::default()),
        ColumnFamilyDescriptor::new(CF_LAYERS, layers_options()),
        ColumnFamilyDescriptor::new(CF_INDEX_CONFIG, Options::default()),
    ]
}
