use crate::cache::namespace::{MEDIA, THUMBNAIL};
use crate::entry::{path_to_url, Entry};
use crate::provider::{MetadataProvider, Properties};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use xdg::BaseDirectories;

const PROVIDER_ID: &str = "content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThumbnailSize {
    Normal,
    Large,
}

impl ThumbnailSize {
    pub fn directory_name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Large => "large",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Audio,
    Video,
}

impl MediaType {
    pub fn of(entry: &Entry) -> Option<Self> {
        if !entry.is_file() {
            return None;
        }

        let mime = mime_guess::from_ext(&entry.extension()?).first()?;
        let top = mime.type_();
        if top == mime_guess::mime::IMAGE {
            Some(Self::Image)
        } else if top == mime_guess::mime::AUDIO {
            Some(Self::Audio)
        } else if top == mime_guess::mime::VIDEO {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThumbnailStore {
    cache_dir: PathBuf,
    preferred: ThumbnailSize,
}

impl ThumbnailStore {
    pub fn new(cache_dir: PathBuf, prefer_large: bool) -> Self {
        Self {
            cache_dir,
            preferred: if prefer_large {
                ThumbnailSize::Large
            } else {
                ThumbnailSize::Normal
            },
        }
    }

    pub fn default_dir() -> Result<PathBuf> {
        let xdg_dirs = BaseDirectories::new()
            .map_err(|e| Error::Config(format!("Failed to get XDG directories: {}", e)))?;
        Ok(xdg_dirs.get_cache_home().join("thumbnails"))
    }

    pub fn thumbnail_path(&self, entry: &Entry, size: ThumbnailSize) -> PathBuf {
        self.cache_dir
            .join(size.directory_name())
            .join(format!("{}.png", compute_hash(entry.url())))
    }

    pub async fn lookup(&self, entry: &Entry) -> Option<PathBuf> {
        let fallback = match self.preferred {
            ThumbnailSize::Normal => ThumbnailSize::Large,
            ThumbnailSize::Large => ThumbnailSize::Normal,
        };

        for size in [self.preferred, fallback] {
            let path = self.thumbnail_path(entry, size);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Some(path);
            }
        }

        None
    }
}

fn compute_hash(uri: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct ContentProvider {
    store: ThumbnailStore,
}

impl ContentProvider {
    pub fn new(store: ThumbnailStore) -> Self {
        Self { store }
    }

    async fn thumbnail_url(&self, entry: &Entry, media_type: MediaType) -> Result<Option<String>> {
        if let Some(path) = self.store.lookup(entry).await {
            return path_to_url(&path).map(Some);
        }

        // Images can stand in for their own thumbnail.
        Ok((media_type == MediaType::Image).then(|| entry.url().to_string()))
    }
}

#[async_trait]
impl MetadataProvider for ContentProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports_entry(&self, entry: &Entry) -> bool {
        MediaType::of(entry).is_some()
    }

    fn provides_type(&self, namespace: &str) -> bool {
        namespace == THUMBNAIL || namespace == MEDIA
    }

    async fn fetch(&self, entry: &Entry, _namespace: &str) -> Result<Option<Properties>> {
        let Some(media_type) = MediaType::of(entry) else {
            return Ok(None);
        };

        let mime_type = mime_guess::from_path(entry.name()).first_or_octet_stream();
        let mut properties = Properties::new();
        properties.insert(
            MEDIA.to_string(),
            json!({
                "mimeType": mime_type.essence_str(),
                "mediaType": media_type.as_str(),
            }),
        );

        if let Some(url) = self.thumbnail_url(entry, media_type).await? {
            properties.insert(THUMBNAIL.to_string(), json!({ "url": url }));
        }

        Ok(Some(properties))
    }
}
