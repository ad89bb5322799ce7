//! Configuration loading for the region engine.
//!
//! All engine settings are loaded from a TOML configuration file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Spatial index settings
    #[serde(default)]
    pub index: IndexConfig,
    /// Caller-visible warning thresholds
    #[serde(default)]
    pub advisories: AdvisoryConfig,
    /// Region store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl GuardConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parses configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes the configuration as a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Spatial index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Grid cells are `2^cell_shift` blocks wide on x and z
    pub cell_shift: u8,
    /// Regions spanning more cells than this are tested linearly instead
    pub max_cells_per_region: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cell_shift: 4,
            max_cells_per_region: 4096,
        }
    }
}

/// Advisory thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    /// Warn when a region is this many blocks tall or less
    pub short_height_blocks: i64,
    /// Show the first-region hint while the world has at most this many regions
    pub new_user_hint_max_regions: usize,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            short_height_blocks: 3,
            new_user_hint_max_regions: 2,
        }
    }
}

/// Region store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one sub-directory per world
    pub directory: PathBuf,
    /// Write indented JSON
    pub pretty: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("worlds"),
            pretty: true,
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error parsing TOML config
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Error writing TOML config
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Generates a default configuration file content.
pub fn default_config_toml() -> String {
    r#"# Region engine configuration

[index]
cell_shift = 4
max_cells_per_region = 4096

[advisories]
short_height_blocks = 3
new_user_hint_max_regions = 2

[storage]
directory = "worlds"
pretty = true
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GuardConfig::default();

        assert_eq!(config.index.cell_shift, 4);
        assert_eq!(config.index.max_cells_per_region, 4096);
        assert_eq!(config.advisories.short_height_blocks, 3);
        assert_eq!(config.storage.directory, PathBuf::from("worlds"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
            [index]
            cell_shift = 6
        "#;

        let config = GuardConfig::from_str(toml).unwrap();

        // Specified value
        assert_eq!(config.index.cell_shift, 6);
        // Default values
        assert_eq!(config.index.max_cells_per_region, 4096);
        assert_eq!(config.advisories.new_user_hint_max_regions, 2);
        assert!(config.storage.pretty);
    }

    #[test]
    fn test_default_config_toml_parses() {
        let config = GuardConfig::from_str(&default_config_toml()).unwrap();

        assert_eq!(config.index.cell_shift, 4);
        assert_eq!(config.storage.directory, PathBuf::from("worlds"));
    }

    #[test]
    fn test_config_to_toml() {
        let toml = GuardConfig::default().to_toml().unwrap();

        assert!(toml.contains("[index]"));
        assert!(toml.contains("[advisories]"));
        assert!(toml.contains("[storage]"));
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = GuardConfig::from_str("[index]\ncell_shift = \"wide\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guard.toml");
        std::fs::write(&path, "[storage]\npretty = false\n").unwrap();

        let config = GuardConfig::from_file(&path).unwrap();
        assert!(!config.storage.pretty);
    }
}
