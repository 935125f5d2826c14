use crate::cache::namespace::FILESYSTEM;
use crate::entry::Entry;
use crate::provider::{MetadataProvider, Properties};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

const PROVIDER_ID: &str = "filesystem";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemMetadata {
    pub size: i64,
    pub modification_time: String,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub mode: u32,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    pub mime_type: Option<String>,
}

impl FilesystemMetadata {
    pub fn from_metadata(entry: &Entry, metadata: &std::fs::Metadata) -> Self {
        let is_directory = metadata.is_dir();
        let mode = get_mode(metadata);
        let (owner, group) = get_owner_group(metadata);

        Self {
            size: if is_directory {
                -1
            } else {
                i64::try_from(metadata.len()).unwrap_or(i64::MAX)
            },
            modification_time: format_time(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH)),
            is_directory,
            is_symlink: metadata.is_symlink(),
            mode,
            permissions: format_permissions(mode),
            owner,
            group,
            mime_type: (!is_directory).then(|| {
                mime_guess::from_path(entry.name())
                    .first_or_octet_stream()
                    .to_string()
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct FilesystemProvider;

impl FilesystemProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetadataProvider for FilesystemProvider {
    fn id(&self) -> &str {
        PROVIDER_ID
    }

    fn supports_entry(&self, entry: &Entry) -> bool {
        entry.to_path().is_some()
    }

    fn provides_type(&self, namespace: &str) -> bool {
        namespace == FILESYSTEM
    }

    async fn fetch(&self, entry: &Entry, _namespace: &str) -> Result<Option<Properties>> {
        let Some(path) = entry.to_path() else {
            return Ok(None);
        };

        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Entry vanished before stat: {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let value = serde_json::to_value(FilesystemMetadata::from_metadata(entry, &metadata))?;
        Ok(Some(Properties::from([(FILESYSTEM.to_string(), value)])))
    }
}

#[cfg(unix)]
fn get_owner_group(metadata: &std::fs::Metadata) -> (String, String) {
    use nix::unistd::{Gid, Group, Uid, User};
    use std::os::unix::fs::MetadataExt;

    let uid = Uid::from_raw(metadata.uid());
    let gid = Gid::from_raw(metadata.gid());

    let owner = User::from_uid(uid)
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string());

    let group = Group::from_gid(gid)
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string());

    (owner, group)
}

#[cfg(not(unix))]
fn get_owner_group(_metadata: &std::fs::Metadata) -> (String, String) {
    ("unknown".to_string(), "unknown".to_string())
}

#[cfg(unix)]
fn get_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn get_mode(metadata: &std::fs::Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

pub fn format_permissions(mode: u32) -> String {
    const BITS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];

    BITS.iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}

pub fn format_time(time: SystemTime) -> String {
    use chrono::{DateTime, SecondsFormat, Utc};

    let datetime: DateTime<Utc> = time.into();
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}
