use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const FILE_SCHEME: &str = "file://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    url: String,
    kind: EntryKind,
}

impl Entry {
    pub fn new(url: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            url: normalize_url(url.into()),
            kind,
        }
    }

    pub fn file(url: impl Into<String>) -> Self {
        Self::new(url, EntryKind::File)
    }

    pub fn directory(url: impl Into<String>) -> Self {
        Self::new(url, EntryKind::Directory)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::symlink_metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };

        Self::from_path_with_kind(path, kind)
    }

    pub fn from_path_with_kind(path: &Path, kind: EntryKind) -> Result<Self> {
        Ok(Self::new(path_to_url(path)?, kind))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn to_path(&self) -> Option<PathBuf> {
        url_to_path(&self.url)
    }

    pub fn name(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or_default()
    }

    pub fn parent_url(&self) -> Option<&str> {
        let (parent, _) = self.url.rsplit_once('/')?;
        if parent.ends_with("://") {
            // "file:///a" splits into "file://" and "a"; the parent is "file:///"
            let root_len = parent.len() + 1;
            return (root_len < self.url.len()).then(|| &self.url[..root_len]);
        }
        Some(parent)
    }

    pub fn extension(&self) -> Option<String> {
        let name = self.name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

pub fn path_to_url(path: &Path) -> Result<String> {
    if !path.is_absolute() {
        return Err(Error::InvalidPath {
            path: path.to_path_buf(),
        });
    }

    let path_str = path.to_str().ok_or_else(|| Error::InvalidPath {
        path: path.to_path_buf(),
    })?;

    Ok(normalize_url(format!("{}{}", FILE_SCHEME, path_str)))
}

pub fn url_to_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix(FILE_SCHEME)
        .filter(|p| p.starts_with('/'))
        .map(PathBuf::from)
}

/// Part of `key` below `root`, honouring path-segment boundaries.
///
/// Returns `Some("")` when the keys are equal and `None` when `key` is not
/// `root` or one of its descendants. `"dir"` is not an ancestor of `"dir2/a"`.
pub fn relative_to<'a>(root: &str, key: &'a str) -> Option<&'a str> {
    if key == root {
        return Some("");
    }

    let rest = key.strip_prefix(root)?;
    let rest = if root.ends_with('/') {
        rest
    } else {
        rest.strip_prefix('/')?
    };

    (!rest.is_empty()).then_some(rest)
}

fn normalize_url(mut url: String) -> String {
    while url.len() > 1 && url.ends_with('/') && !url.ends_with(":///") && !url.ends_with("://") {
        url.pop();
    }
    url
}
