//! Configuration for the bank ledger
//!
//! The configuration is an explicitly constructed value passed into the
//! engine at startup; there is no ambient global state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bank ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Scope of the external-reference unique index
    pub external_ref_scope: ExternalRefScope,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/bank"),
            service_name: "bank-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            external_ref_scope: ExternalRefScope::Global,
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Whether an external reference (e.g. TON tx hash) must be unique
/// across the whole log or only within one reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalRefScope {
    /// One reference may appear at most once in the whole log
    Global,
    /// One reference may appear at most once per reason code
    PerReason,
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BANK_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("BANK_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(scope) = std::env::var("BANK_EXTERNAL_REF_SCOPE") {
            config.external_ref_scope = match scope.as_str() {
                "global" => ExternalRefScope::Global,
                "per_reason" => ExternalRefScope::PerReason,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown external ref scope: {}",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "bank-core");
        assert_eq!(config.external_ref_scope, ExternalRefScope::Global);
        assert_eq!(config.metrics_listen_addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            data_dir = "/tmp/bank"
            service_name = "bank-core"
            service_version = "0.1.0"
            metrics_listen_addr = "127.0.0.1:9100"
            external_ref_scope = "per_reason"

            [rocksdb]
            write_buffer_size_mb = 32
            max_write_buffer_number = 2
            target_file_size_mb = 32
            max_background_jobs = 2
            enable_statistics = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.external_ref_scope, ExternalRefScope::PerReason);
        assert_eq!(config.rocksdb.write_buffer_size_mb, 32);
    }
}
