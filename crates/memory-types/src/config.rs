//! Configuration loading for the memory engine.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/agent-memory/config.toml.

use config::{Config, Environment as EnvSource, File};
use directories::{BaseDirs, ProjectDirs};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MemoryError;

/// Deployment environment.
///
/// Production refuses to run without an explicit encryption key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// HNSW graph tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswSettings {
    /// Target neighbour count; also the base of the level distribution.
    #[serde(default = "default_m")]
    pub m: usize,

    /// Maximum neighbours per node on layers above 0.
    #[serde(default = "default_m_max")]
    pub m_max: usize,

    /// Maximum neighbours per node on layer 0.
    #[serde(default = "default_m_max0")]
    pub m_max0: usize,

    /// Beam width used while inserting.
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// Beam width used while searching.
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

fn default_m() -> usize {
    16
}

fn default_m_max() -> usize {
    16
}

fn default_m_max0() -> usize {
    32
}

fn default_ef_construction() -> usize {
    200
}

fn default_ef_search() -> usize {
    50
}

impl Default for HnswSettings {
    fn default() -> Self {
        Self {
            m: default_m(),
            m_max: default_m_max(),
            m_max0: default_m_max0(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
        }
    }
}

impl HnswSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.m < 2 {
            return Err(format!("m must be >= 2, got {}", self.m));
        }
        if self.m_max == 0 || self.m_max0 == 0 {
            return Err("m_max and m_max0 must be > 0".to_string());
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err("ef_construction and ef_search must be > 0".to_string());
        }
        Ok(())
    }
}

/// Flat store quota settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatSettings {
    /// Size cap in megabytes; oldest items are evicted beyond it.
    #[serde(default = "default_max_mb")]
    pub max_mb: f64,
}

fn default_max_mb() -> f64 {
    10.0
}

impl Default for FlatSettings {
    fn default() -> Self {
        Self {
            max_mb: default_max_mb(),
        }
    }
}

impl FlatSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_mb.is_nan() || self.max_mb <= 0.0 {
            return Err(format!("max_mb must be > 0, got {}", self.max_mb));
        }
        Ok(())
    }

    /// Quota in bytes.
    pub fn max_bytes(&self) -> usize {
        (self.max_mb * 1024.0 * 1024.0) as usize
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    /// Path to the RocksDB directory backing the graph index
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Path to the encrypted flat store file
    #[serde(default = "default_flat_store_path")]
    pub flat_store_path: String,

    /// Hex-encoded 256-bit key (loaded from env var, never written back out)
    #[serde(default, skip_serializing)]
    pub encryption_key: Option<SecretString>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Graph index tunables
    #[serde(default)]
    pub hnsw: HnswSettings,

    /// Flat store quota
    #[serde(default)]
    pub flat: FlatSettings,
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "agent-memory")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn default_db_path() -> String {
    data_dir().join("graph").to_string_lossy().to_string()
}

fn default_flat_store_path() -> String {
    data_dir()
        .join("flat-memory.bin")
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            db_path: default_db_path(),
            flat_store_path: default_flat_store_path(),
            encryption_key: None,
            log_level: default_log_level(),
            hnsw: HnswSettings::default(),
            flat: FlatSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/agent-memory/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (MEMORY_*, nested keys with `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, MemoryError> {
        let config_dir = ProjectDirs::from("", "", "agent-memory")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");
        let hnsw = HnswSettings::default();

        let mut builder = Config::builder()
            .set_default("environment", "development")
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("db_path", default_db_path())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("flat_store_path", default_flat_store_path())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("hnsw.m", hnsw.m as i64)
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("hnsw.m_max", hnsw.m_max as i64)
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("hnsw.m_max0", hnsw.m_max0 as i64)
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("hnsw.ef_construction", hnsw.ef_construction as i64)
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("hnsw.ef_search", hnsw.ef_search as i64)
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .set_default("flat.max_mb", default_max_mb())
            .map_err(|e| MemoryError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // MEMORY_DB_PATH, MEMORY_ENCRYPTION_KEY, MEMORY_HNSW__EF_SEARCH, ...
        // Values stay strings so an all-digit hex key is not parsed as a number.
        builder = builder.add_source(
            EnvSource::with_prefix("MEMORY")
                .prefix_separator("_")
                .separator("__"),
        );

        let config = builder
            .build()
            .map_err(|e| MemoryError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| MemoryError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate nested settings.
    pub fn validate(&self) -> Result<(), MemoryError> {
        self.hnsw.validate().map_err(MemoryError::Config)?;
        self.flat.validate().map_err(MemoryError::Config)?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in flat_store_path to the home directory
    pub fn expanded_flat_store_path(&self) -> PathBuf {
        expand_home(&self.flat_store_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(settings.hnsw.m, 16);
        assert_eq!(settings.hnsw.m_max0, 32);
        assert!(settings.encryption_key.is_none());
        assert!(!settings.is_production());
    }

    #[test]
    fn test_load_with_cli_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "environment = \"production\"\nlog_level = \"debug\"\n\n[hnsw]\nef_search = 99\n\n[flat]\nmax_mb = 2.5"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path().to_str().unwrap())).unwrap();
        assert!(settings.is_production());
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.hnsw.ef_search, 99);
        assert_eq!(settings.hnsw.m, 16);
        assert!((settings.flat.max_mb - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_key_loads_as_secret() {
        use secrecy::ExposeSecret;

        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "encryption_key = \"{}\"", "ab".repeat(32)).unwrap();

        let settings = Settings::load(Some(file.path().to_str().unwrap())).unwrap();
        let key = settings.encryption_key.as_ref().unwrap();
        assert_eq!(key.expose_secret(), "ab".repeat(32));
        assert!(!format!("{:?}", settings).contains(&"ab".repeat(32)));
    }

    #[test]
    fn test_hnsw_validation() {
        let mut hnsw = HnswSettings::default();
        assert!(hnsw.validate().is_ok());

        hnsw.m = 1;
        assert!(hnsw.validate().is_err());

        hnsw.m = 8;
        hnsw.ef_search = 0;
        assert!(hnsw.validate().is_err());
    }

    #[test]
    fn test_flat_validation_and_quota() {
        let flat = FlatSettings { max_mb: 1.0 };
        assert!(flat.validate().is_ok());
        assert_eq!(flat.max_bytes(), 1024 * 1024);

        assert!(FlatSettings { max_mb: 0.0 }.validate().is_err());
        assert!(FlatSettings { max_mb: f64::NAN }.validate().is_err());
    }

    #[test]
    fn test_encryption_key_never_serialized() {
        let settings = Settings {
            encryption_key: Some(SecretString::from("00".repeat(32))),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("encryption_key"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        if BaseDirs::new().is_some() {
            assert!(!expand_home("~/x").starts_with("~"));
        }
    }
}
