//! Process-wide configuration (spec §6.3).
//!
//! Follows the host codebase's loader shape: a `serde`-derived struct with
//! `#[serde(default = "...")]` on every field, loaded from a TOML file or
//! built from defaults, erroring out only on malformed TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::common::error::StoreError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of shards; fixed at process start (spec §4.1 assumes no
    /// reshard).
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    /// Directory holding each shard's data file and the table catalog.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Reserved for an eventual HTTP front-end; `0` means "not bound" since
    /// this crate exposes only the Rust-level contract layer (spec §1).
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_lock_lease_ms")]
    pub lock_lease_ms: u64,

    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,

    #[serde(default = "default_lock_retry_base_ms")]
    pub lock_retry_base_ms: u64,

    #[serde(default = "default_lock_retry_cap_ms")]
    pub lock_retry_cap_ms: u64,

    #[serde(default = "default_lock_retry_budget_ms")]
    pub lock_retry_budget_ms: u64,
}

fn default_shard_count() -> u32 {
    4
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_port() -> u16 {
    0
}
fn default_lock_lease_ms() -> u64 {
    30_000
}
fn default_idempotency_ttl_secs() -> u64 {
    600
}
fn default_lock_retry_base_ms() -> u64 {
    5
}
fn default_lock_retry_cap_ms() -> u64 {
    200
}
fn default_lock_retry_budget_ms() -> u64 {
    1_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            data_dir: default_data_dir(),
            port: default_port(),
            lock_lease_ms: default_lock_lease_ms(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            lock_retry_base_ms: default_lock_retry_base_ms(),
            lock_retry_cap_ms: default_lock_retry_cap_ms(),
            lock_retry_budget_ms: default_lock_retry_budget_ms(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file, falling back to defaults if the
    /// file does not exist.
    ///
    /// # Errors
    /// Returns [`StoreError::Validation`] if the file exists but cannot be
    /// parsed, or [`StoreError::Io`] if it cannot be read for any other
    /// reason.
    pub fn load_from_file(path: &Path) -> Result<Self, StoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).map_err(|e| {
                StoreError::Validation(format!("failed to parse config file '{}': {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    #[must_use]
    pub fn data_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    #[must_use]
    pub fn shard_path(&self, shard_id: u32) -> PathBuf {
        self.data_dir_path().join(format!("shard-{shard_id}.db"))
    }

    #[must_use]
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir_path().join("catalog.json")
    }

    #[must_use]
    pub fn lock_lease(&self) -> Duration {
        Duration::from_millis(self.lock_lease_ms)
    }

    #[must_use]
    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    #[must_use]
    pub fn lock_retry_base(&self) -> Duration {
        Duration::from_millis(self.lock_retry_base_ms)
    }

    #[must_use]
    pub fn lock_retry_cap(&self) -> Duration {
        Duration::from_millis(self.lock_retry_cap_ms)
    }

    #[must_use]
    pub fn lock_retry_budget(&self) -> Duration {
        Duration::from_millis(self.lock_retry_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.shard_count, 4);
        assert_eq!(config.lock_lease_ms, 30_000);
        assert_eq!(config.idempotency_ttl_secs, 600);
    }

    #[test]
    fn loads_partial_overrides_and_fills_in_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"shard_count = 8"#).unwrap();
        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.shard_count, 8);
        assert_eq!(config.data_dir, "./data");
    }

    #[test]
    fn missing_file_returns_defaults() {
        let config = Config::load_from_file(Path::new("definitely-not-a-real-file.toml")).unwrap();
        assert_eq!(config.shard_count, Config::default().shard_count);
    }

    #[test]
    fn malformed_toml_is_a_validation_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml {{{{").unwrap();
        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
