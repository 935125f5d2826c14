use crate::cache::namespace::{FILESYSTEM, WILDCARD};
use crate::cache::MetadataCache;
use crate::entry::{path_to_url, Entry, EntryKind};
use crate::{Error, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const DEBOUNCE_DURATION: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
}

impl WatchEvent {
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Created(p) | Self::Modified(p) | Self::Deleted(p) => vec![p.as_path()],
            Self::Renamed { from, to } => vec![from.as_path(), to.as_path()],
        }
    }
}

pub fn invalidate(cache: &MetadataCache, event: &WatchEvent) {
    let gone: Option<&Path> = match event {
        WatchEvent::Deleted(p) => Some(p.as_path()),
        WatchEvent::Renamed { from, .. } => Some(from.as_path()),
        _ => None,
    };

    for path in event.paths() {
        let Ok(url) = path_to_url(path) else {
            continue;
        };

        if gone == Some(path) {
            cache.clear_recursively(&Entry::new(url, EntryKind::Directory), WILDCARD);
        } else {
            cache.clear_by_url(&[url.as_str()], WILDCARD);
        }

        if let Some(parent) = path.parent().and_then(|p| path_to_url(p).ok()) {
            cache.clear_by_url(&[parent.as_str()], FILESYSTEM);
        }
    }
}

pub struct CacheInvalidator {
    cache: MetadataCache,
    inner: Arc<Mutex<Option<notify::RecommendedWatcher>>>,
    watched_paths: Arc<Mutex<HashMap<PathBuf, Instant>>>,
    debounce_duration: Duration,
}

impl CacheInvalidator {
    pub fn new(cache: MetadataCache, debounce_duration: Duration) -> Self {
        Self {
            cache,
            inner: Arc::new(Mutex::new(None)),
            watched_paths: Arc::new(Mutex::new(HashMap::new())),
            debounce_duration,
        }
    }

    pub fn with_default_debounce(cache: MetadataCache) -> Self {
        Self::new(cache, DEBOUNCE_DURATION)
    }

    pub fn start(&self, listener: Option<mpsc::UnboundedSender<WatchEvent>>) -> Result<()> {
        let cache = self.cache.clone();
        let watched_paths = Arc::clone(&self.watched_paths);
        let debounce_duration = self.debounce_duration;

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(watch_event) = convert_event(event) else {
                    return;
                };

                invalidate(&cache, &watch_event);

                if let Some(sender) = &listener {
                    if !is_bounced(&watched_paths, &watch_event, debounce_duration) {
                        let _ = sender.send(watch_event);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Watcher error: {}", e);
            }
        })?;

        *self.inner.lock() = Some(watcher);
        Ok(())
    }

    pub fn watch(&self, path: &Path) -> Result<()> {
        let mut watcher = self.inner.lock();

        if let Some(w) = watcher.as_mut() {
            w.watch(path, RecursiveMode::NonRecursive)?;
            self.watched_paths.lock().insert(path.to_path_buf(), Instant::now());
            tracing::debug!("Watching {}", path.display());
            Ok(())
        } else {
            Err(Error::Watcher("Watcher not started".to_string()))
        }
    }

    pub fn unwatch(&self, path: &Path) -> Result<()> {
        let mut watcher = self.inner.lock();

        if let Some(w) = watcher.as_mut() {
            w.unwatch(path)?;
            self.watched_paths.lock().remove(path);
            Ok(())
        } else {
            Err(Error::Watcher("Watcher not started".to_string()))
        }
    }

    pub fn stop(&self) {
        *self.inner.lock() = None;
        self.watched_paths.lock().clear();
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched_paths.lock().contains_key(path)
    }
}

impl Drop for CacheInvalidator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_bounced(
    last_seen: &Mutex<HashMap<PathBuf, Instant>>,
    event: &WatchEvent,
    debounce_duration: Duration,
) -> bool {
    let now = Instant::now();
    let path = event.paths()[0].to_path_buf();
    let mut last_seen = last_seen.lock();

    if let Some(last_event) = last_seen.get(&path) {
        if now.duration_since(*last_event) < debounce_duration {
            return true;
        }
    }
    last_seen.insert(path, now);
    false
}

fn convert_event(event: Event) -> Option<WatchEvent> {
    use notify::event::{ModifyKind, RenameMode};

    let paths = event.paths;
    let path = paths.first()?.clone();

    match event.kind {
        EventKind::Create(_) => Some(WatchEvent::Created(path)),
        EventKind::Remove(_) => Some(WatchEvent::Deleted(path)),
        EventKind::Modify(ModifyKind::Name(rename_mode)) => match rename_mode {
            RenameMode::Both if paths.len() >= 2 => Some(WatchEvent::Renamed {
                from: path,
                to: paths[1].clone(),
            }),
            RenameMode::From => Some(WatchEvent::Deleted(path)),
            RenameMode::To => Some(WatchEvent::Created(path)),
            _ => Some(WatchEvent::Modified(path)),
        },
        EventKind::Modify(_) => Some(WatchEvent::Modified(path)),
        _ => None,
    }
}
