//! Configuration for territory-engine

use h3o::Resolution;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TerritoryError;

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("territory-engine")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// H3 resolution every cell must be at (0-15)
    #[serde(default = "default_resolution")]
    pub resolution: u8,

    /// Number of users returned by the global leaderboard
    #[serde(default = "default_global_leaderboard_size")]
    pub global_leaderboard_size: usize,

    /// Upper bound on cells a single region query may resolve to
    #[serde(default = "default_max_region_cells")]
    pub max_region_cells: usize,

    /// Per-call store deadline in milliseconds (0 = no deadline)
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_resolution() -> u8 {
    9
}

fn default_global_leaderboard_size() -> usize {
    10
}

fn default_max_region_cells() -> usize {
    20_000
}

fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            resolution: default_resolution(),
            global_leaderboard_size: default_global_leaderboard_size(),
            max_region_cells: default_max_region_cells(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TerritoryError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TerritoryError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TerritoryError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TerritoryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Configured resolution as an H3 resolution
    pub fn h3_resolution(&self) -> Result<Resolution, TerritoryError> {
        Resolution::try_from(self.resolution).map_err(|_| {
            TerritoryError::Config(format!(
                "resolution {} is outside the H3 range 0-15",
                self.resolution
            ))
        })
    }

    /// Store deadline, if any
    pub fn store_timeout(&self) -> Option<Duration> {
        (self.store_timeout_ms > 0).then(|| Duration::from_millis(self.store_timeout_ms))
    }

    /// Get database path
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("territory.db")
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("resolution = 8\n").unwrap();
        assert_eq!(config.resolution, 8);
        assert_eq!(config.global_leaderboard_size, 10);
        assert_eq!(config.h3_resolution().unwrap(), Resolution::Eight);
    }

    #[test]
    fn test_out_of_range_resolution() {
        let config = Config { resolution: 16, ..Default::default() };
        assert!(matches!(config.h3_resolution(), Err(TerritoryError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config = Config { store_timeout_ms: 0, ..Default::default() };
        assert!(config.store_timeout().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            storage_dir: dir.path().to_path_buf(),
            max_region_cells: 500,
            ..Default::default()
        };
        config.save(config.config_path()).unwrap();

        let loaded = Config::load(config.config_path()).unwrap();
        assert_eq!(loaded.max_region_cells, 500);
        assert_eq!(loaded.db_path(), dir.path().join("territory.db"));
    }
}
