use crate::entry::Entry;
use crate::provider::external::{ExternalBackend, ExternalProperties};
use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

pub const DEFAULT_MOUNTS_PATH: &str = "/proc/mounts";

const NETWORK_TYPES: &[&str] = &[
    "nfs", "nfs4", "cifs", "smb3", "smbfs", "sshfs", "fuse.sshfs", "9p", "afs", "ceph", "glusterfs",
    "davfs", "fuse.rclone", "fuse.gvfsd-fuse",
];

const REMOVABLE_TYPES: &[&str] = &["vfat", "exfat", "ntfs", "ntfs3", "fuseblk", "iso9660", "udf", "hfsplus"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    Network,
    Removable,
    Fuse,
}

impl VolumeType {
    pub fn classify(filesystem_type: &str, extra_remote_types: &[String]) -> Option<Self> {
        if NETWORK_TYPES.contains(&filesystem_type)
            || extra_remote_types.iter().any(|t| t == filesystem_type)
        {
            Some(Self::Network)
        } else if REMOVABLE_TYPES.contains(&filesystem_type) {
            Some(Self::Removable)
        } else if filesystem_type.starts_with("fuse.") {
            Some(Self::Fuse)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Removable => "removable",
            Self::Fuse => "fuse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub device: String,
    pub mount_path: PathBuf,
    pub filesystem_type: String,
    pub read_only: bool,
}

pub fn parse_mount_table(contents: &str) -> Vec<MountPoint> {
    let mut mounts = Vec::new();

    for line in contents.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            continue;
        }

        mounts.push(MountPoint {
            device: unescape(parts[0]),
            mount_path: PathBuf::from(unescape(parts[1])),
            filesystem_type: parts[2].to_string(),
            read_only: parts[3].split(',').any(|o| o == "ro"),
        });
    }

    mounts
}

/// Decodes the octal escapes (`\040` for space) the kernel uses.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let escape = bytes.get(i + 1..i + 4).filter(|digits| {
            bytes[i] == b'\\' && digits.iter().all(|b| (b'0'..=b'7').contains(b))
        });

        match escape.and_then(|d| {
            u8::try_from(
                u32::from(d[0] - b'0') * 64 + u32::from(d[1] - b'0') * 8 + u32::from(d[2] - b'0'),
            )
            .ok()
        }) {
            Some(code) => {
                out.push(code);
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

pub fn find_mount<'a>(mounts: &'a [MountPoint], path: &Path) -> Option<&'a MountPoint> {
    mounts
        .iter()
        .filter(|m| path.starts_with(&m.mount_path))
        .max_by_key(|m| m.mount_path.components().count())
}

pub struct MountTableBackend {
    mounts_path: PathBuf,
    extra_remote_types: Vec<String>,
    table: RwLock<Vec<MountPoint>>,
    loaded: AtomicBool,
}

impl MountTableBackend {
    pub fn new(mounts_path: PathBuf, extra_remote_types: Vec<String>) -> Self {
        let backend = Self {
            mounts_path,
            extra_remote_types,
            table: RwLock::new(Vec::new()),
            loaded: AtomicBool::new(false),
        };

        if let Err(e) = backend.load_blocking() {
            tracing::warn!(
                "Failed to read mount table {}: {}",
                backend.mounts_path.display(),
                e
            );
        }
        // Ready even without a table; supports_entry retries the read.
        backend.loaded.store(true, Ordering::Release);

        backend
    }

    fn load_blocking(&self) -> Result<()> {
        let contents = std::fs::read_to_string(&self.mounts_path)?;
        self.replace_table(parse_mount_table(&contents));
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let contents = tokio::fs::read_to_string(&self.mounts_path).await?;
        self.replace_table(parse_mount_table(&contents));
        Ok(())
    }

    fn replace_table(&self, mounts: Vec<MountPoint>) {
        *self.table.write() = mounts;
        self.loaded.store(true, Ordering::Release);
    }

    fn describe(&self, entry: &Entry) -> Option<ExternalProperties> {
        let path = entry.to_path()?;
        let table = self.table.read();
        let mount = find_mount(&table, &path)?;
        let volume_type = VolumeType::classify(&mount.filesystem_type, &self.extra_remote_types)?;

        Some(ExternalProperties {
            volume_type: volume_type.as_str().to_string(),
            filesystem_type: mount.filesystem_type.clone(),
            device: mount.device.clone(),
            mount_path: mount.mount_path.to_string_lossy().into_owned(),
            remote: volume_type == VolumeType::Network,
            read_only: mount.read_only,
            thumbnail_url: None,
        })
    }
}

#[async_trait]
impl ExternalBackend for MountTableBackend {
    fn supports_entry(&self, entry: &Entry) -> bool {
        if self.table.read().is_empty() {
            if let Err(e) = self.load_blocking() {
                tracing::debug!("Mount table {} still unreadable: {}", self.mounts_path.display(), e);
            }
        }
        self.describe(entry).is_some()
    }

    fn is_initialized(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    async fn get_entry_properties(&self, entries: &[Entry]) -> Result<Vec<Option<ExternalProperties>>> {
        if let Err(e) = self.reload().await {
            tracing::warn!(
                "Failed to refresh mount table {}: {}",
                self.mounts_path.display(),
                e
            );
        }

        Ok(entries.iter().map(|entry| self.describe(entry)).collect())
    }
}
