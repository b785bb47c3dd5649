use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

/// upper bound on the default hashing worker count
const DEFAULT_MAX_WORKERS: usize = 8;

/// store configuration stored in config.toml
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }
}

/// snapshot build settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// maximum number of files hashed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// follow symlinks while walking (skipped otherwise)
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            follow_symlinks: false,
        }
    }
}

/// on-disk record settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// zstd level for snapshot records
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression_level: default_compression_level(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, DEFAULT_MAX_WORKERS)
}

fn default_compression_level() -> i32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_toml_roundtrip() {
        let config = Config {
            build: BuildConfig {
                workers: 3,
                follow_symlinks: true,
            },
            storage: StorageConfig {
                compression_level: 9,
            },
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.build.workers >= 1);
        assert!(config.build.workers <= DEFAULT_MAX_WORKERS);
        assert!(!config.build.follow_symlinks);
    }

    #[test]
    fn test_config_partial_section() {
        let toml_str = r#"
[build]
follow_symlinks = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.build.follow_symlinks);
        assert_eq!(config.build.workers, default_workers());
        assert_eq!(config.storage.compression_level, 3);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.build.workers = 2;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
