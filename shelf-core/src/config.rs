use crate::cache::eviction::DEFAULT_EVICTION_MARGIN;
use crate::mounts::DEFAULT_MOUNTS_PATH;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use xdg::BaseDirectories;

const CONFIG_PREFIX: &str = "shelf";
const CONFIG_FILE: &str = "shelf.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub external: ExternalConfig,
    pub content: ContentConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub eviction_margin: usize,
    pub initial_size_hint: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub enabled: bool,
    pub batch_delay_ms: u64,
    pub mounts_path: PathBuf,
    pub extra_remote_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub enabled: bool,
    pub thumbnail_dir: Option<PathBuf>,
    pub prefer_large: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            eviction_margin: DEFAULT_EVICTION_MARGIN,
            initial_size_hint: 0,
        }
    }
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_delay_ms: 20,
            mounts_path: PathBuf::from(DEFAULT_MOUNTS_PATH),
            extra_remote_types: Vec::new(),
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            thumbnail_dir: None,
            prefer_large: false,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { debounce_ms: 50 }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let xdg_dirs = BaseDirectories::with_prefix(CONFIG_PREFIX)
            .map_err(|e| Error::Config(format!("Failed to get XDG directories: {}", e)))?;

        let config_path = xdg_dirs
            .find_config_file(CONFIG_FILE)
            .unwrap_or_else(|| xdg_dirs.get_config_home().join(CONFIG_FILE));

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            Ok(default_config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(Into::into)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_str)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let xdg_dirs = BaseDirectories::with_prefix(CONFIG_PREFIX)
            .map_err(|e| Error::Config(format!("Failed to get XDG directories: {}", e)))?;
        Ok(xdg_dirs.get_config_home().join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.eviction_margin, 500);
        assert_eq!(config.external.mounts_path, PathBuf::from("/proc/mounts"));
        assert!(config.content.enabled);
        assert_eq!(config.watcher.debounce_ms, 50);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("shelf.toml");

        let mut config = Config::default();
        config.cache.eviction_margin = 64;
        config.external.extra_remote_types = vec!["zfs".to_string()];
        config.content.thumbnail_dir = Some(PathBuf::from("/var/thumbs"));
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shelf.toml");
        std::fs::write(&path, "[cache]\neviction_margin = 10\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.cache.eviction_margin, 10);
        assert_eq!(config.cache.initial_size_hint, 0);
        assert!(config.external.enabled);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shelf.toml");
        std::fs::write(&path, "[cache\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
