//! Engine configuration via `dbzero.toml`, covering the six host-provided
//! config keys (spec §6): `autocommit`, `autocommit_interval`,
//! `cache_size`, `lang_cache_size`, `slab_size`, `meta_io_step_size`.
//!
//! On first open, a default `dbzero.toml` is written into the data
//! directory. To change settings, edit the file and reopen — same model
//! as the teacher's `strata.toml`.

use std::path::Path;
use std::time::Duration;

use dbzero_core::{DbZeroError, DbZeroResult, Limits};
use serde::{Deserialize, Serialize};

/// Config file name placed in the engine's data directory.
pub const CONFIG_FILE_NAME: &str = "dbzero.toml";

fn default_autocommit() -> bool {
    true
}

fn default_autocommit_interval_ms() -> u64 {
    200
}

fn default_cache_size() -> usize {
    10_000
}

fn default_lang_cache_size() -> usize {
    1_000
}

fn default_slab_size() -> u64 {
    dbzero_core::limits::MIN_SLAB_SIZE
}

fn default_dp_size() -> u32 {
    dbzero_core::limits::DEFAULT_DP_SIZE
}

fn default_meta_io_step_size() -> u32 {
    dbzero_core::limits::DEFAULT_META_IO_STEP_SIZE
}

/// Host-provided tuning knobs for one `Engine` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbZeroConfig {
    /// Whether the background autocommit ticker runs at all.
    #[serde(default = "default_autocommit")]
    pub autocommit: bool,
    /// Autocommit tick period, in milliseconds.
    #[serde(default = "default_autocommit_interval_ms")]
    pub autocommit_interval_ms: u64,
    /// Max resident entries in the per-prefix object cache (host-facing
    /// sizing knob; `dbzero-engine` itself keeps every live object
    /// resident, so this bounds a future eviction policy rather than
    /// being enforced today).
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Max resident entries in the host-language reflection cache.
    #[serde(default = "default_lang_cache_size")]
    pub lang_cache_size: usize,
    /// Slab size, in bytes, for any prefix created from scratch.
    #[serde(default = "default_slab_size")]
    pub slab_size: u64,
    /// Data-page size, in bytes, for any prefix created from scratch.
    #[serde(default = "default_dp_size")]
    pub dp_size: u32,
    /// Metaio log step size, in bytes.
    #[serde(default = "default_meta_io_step_size")]
    pub meta_io_step_size: u32,
}

impl Default for DbZeroConfig {
    fn default() -> Self {
        Self {
            autocommit: default_autocommit(),
            autocommit_interval_ms: default_autocommit_interval_ms(),
            cache_size: default_cache_size(),
            lang_cache_size: default_lang_cache_size(),
            slab_size: default_slab_size(),
            dp_size: default_dp_size(),
            meta_io_step_size: default_meta_io_step_size(),
        }
    }
}

impl DbZeroConfig {
    /// Autocommit tick period as a `Duration`.
    pub fn autocommit_interval(&self) -> Duration {
        Duration::from_millis(self.autocommit_interval_ms)
    }

    /// The `Limits` a freshly created prefix should use.
    pub fn limits(&self) -> DbZeroResult<Limits> {
        Limits::new(self.slab_size, self.dp_size, self.meta_io_step_size)
            .map_err(|e| DbZeroError::InvalidState { reason: e.to_string() })
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> DbZeroResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DbZeroConfig = toml::from_str(&content)
            .map_err(|e| DbZeroError::InvalidState { reason: format!("invalid config at {}: {e}", path.display()) })?;
        config.limits()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> DbZeroResult<()> {
        if !path.exists() {
            Self::default().write_to_file(path)?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to `path`.
    pub fn write_to_file(&self, path: &Path) -> DbZeroResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DbZeroError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        DbZeroConfig::write_default_if_missing(&path).unwrap();
        let loaded = DbZeroConfig::from_file(&path).unwrap();
        assert_eq!(loaded, DbZeroConfig::default());
    }

    #[test]
    fn write_default_if_missing_does_not_clobber_an_edited_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut custom = DbZeroConfig::default();
        custom.autocommit = false;
        custom.cache_size = 42;
        custom.write_to_file(&path).unwrap();

        DbZeroConfig::write_default_if_missing(&path).unwrap();
        let loaded = DbZeroConfig::from_file(&path).unwrap();
        assert_eq!(loaded.autocommit, false);
        assert_eq!(loaded.cache_size, 42);
    }

    #[test]
    fn rejects_limits_that_dont_validate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "dp_size = 3000\n").unwrap();
        assert!(DbZeroConfig::from_file(&path).is_err());
    }
}
