pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod mounts;
pub mod provider;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Metadata, MetadataCache, ObserverId, Relation};
pub use entry::{Entry, EntryKind};
pub use error::{Error, Result};

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use watcher::CacheInvalidator;

pub struct ShelfCore {
    config: Arc<RwLock<config::Config>>,
    cache: MetadataCache,
}

impl ShelfCore {
    pub fn new() -> Result<Self> {
        Self::with_config(config::Config::load()?)
    }

    pub fn with_config(config: config::Config) -> Result<Self> {
        let cache = MetadataCache::create_full(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            cache,
        })
    }

    pub fn config(&self) -> Arc<RwLock<config::Config>> {
        Arc::clone(&self.config)
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn invalidator(&self) -> CacheInvalidator {
        let debounce = Duration::from_millis(self.config.read().watcher.debounce_ms);
        CacheInvalidator::new(self.cache.clone(), debounce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_full_cache_provider_order() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config::Config::default();
        config.content.thumbnail_dir = Some(temp_dir.path().to_path_buf());
        config.external.mounts_path = temp_dir.path().join("mounts");
        std::fs::write(&config.external.mounts_path, "/dev/sda1 / ext4 rw 0 0\n").unwrap();

        let core = ShelfCore::with_config(config).unwrap();
        let ids: Vec<&str> = core.cache().providers().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["filesystem", "external", "content"]);
        assert!(core.cache().is_initialized());
    }

    #[test]
    fn test_disabled_providers_are_skipped() {
        let mut config = config::Config::default();
        config.external.enabled = false;
        config.content.enabled = false;
        config.cache.initial_size_hint = 10;

        let core = ShelfCore::with_config(config).unwrap();
        assert_eq!(core.cache().providers().len(), 1);
        assert_eq!(core.cache().eviction_threshold(), 520);
    }

    #[tokio::test]
    async fn test_unreadable_mount_table_still_initializes() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config::Config::default();
        config.content.thumbnail_dir = Some(temp_dir.path().to_path_buf());
        config.external.mounts_path = temp_dir.path().join("missing-mounts");

        let core = ShelfCore::with_config(config).unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();
        let entry = Entry::from_path(&file).unwrap();

        let results = core.cache().get(&[entry], "filesystem|external").await;
        assert!(results[0].contains("filesystem"));
        assert!(!results[0].contains("external"));
        assert!(core.cache().is_initialized());
    }
}
