pub mod batch;
pub mod eviction;
pub(crate) mod fetch;
pub(crate) mod item;
pub mod namespace;
pub mod observer;


use crate::config::Config;
use crate::entry::{relative_to, Entry};
use crate::mounts::MountTableBackend;
use crate::provider::content::{ContentProvider, ThumbnailStore};
use crate::provider::external::ExternalProvider;
use crate::provider::filesystem::FilesystemProvider;
use crate::provider::{MetadataProvider, Properties};
use crate::Result;
use batch::BatchState;
use futures::future::join_all;
use item::{CacheItem, LogicalClock};
use observer::{deliver_all, Notification, ObserverRegistry};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub use batch::BatchGuard;
pub use item::Tick;
pub use namespace::NamespaceSelector;
pub use observer::{ObserverFn, ObserverId, Relation};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Option<Value>>);

impl Metadata {
    pub fn get(&self, namespace: &str) -> Option<&Value> {
        self.0.get(namespace).and_then(Option::as_ref)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.get(namespace).is_some()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, Option<Value>> {
        self.0
    }
}

impl FromIterator<(String, Option<Value>)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

pub(crate) struct CacheState {
    items: HashMap<String, CacheItem>,
    clock: LogicalClock,
    batch: BatchState,
    observers: ObserverRegistry,
    current_cache_size: usize,
    eviction_margin: usize,
    next_generation: u64,
}

impl CacheState {
    fn new(eviction_margin: usize) -> Self {
        Self {
            items: HashMap::new(),
            clock: LogicalClock::default(),
            batch: BatchState::default(),
            observers: ObserverRegistry::default(),
            current_cache_size: 0,
            eviction_margin,
            next_generation: 0,
        }
    }

    fn ensure_item(&mut self, key: &str) -> &mut CacheItem {
        let clock = &mut self.clock;
        self.items
            .entry(key.to_string())
            .or_insert_with(|| CacheItem::new(clock.now()))
    }

    fn cached_value(&self, key: &str, namespace: &str) -> Option<Value> {
        self.items
            .get(key)
            .and_then(|item| item.properties.get(namespace))
            .cloned()
    }

    fn threshold(&self) -> usize {
        eviction::threshold(self.current_cache_size, self.eviction_margin)
    }

    fn evict_if_needed(&mut self) {
        let threshold = self.threshold();
        let total = self.items.len();
        if total <= threshold {
            return;
        }

        let victims = eviction::select_victims(&self.items, self.batch.last_start(), total - threshold);
        for key in &victims {
            self.items.remove(key);
        }

        tracing::debug!(
            "Evicted {} of {} cached items (threshold {})",
            victims.len(),
            total,
            threshold
        );
    }

    fn queue_notification(&mut self, entry: &Entry, namespace: &str, out: &mut Vec<Notification>) {
        let value = self
            .items
            .get(entry.url())
            .and_then(|item| item.properties.get(namespace));
        self.observers
            .notify(entry, namespace, self.batch.is_batching(), value, out);
    }

    fn store(&mut self, entry: &Entry, namespace: &str, value: Value, out: &mut Vec<Notification>) {
        let now = self.clock.now();
        let item = self.ensure_item(entry.url());
        item.properties.insert(namespace.to_string(), value);
        item.time = now;
        self.queue_notification(entry, namespace, out);
    }

    fn merge(&mut self, entry: &Entry, properties: Properties, out: &mut Vec<Notification>) -> Vec<String> {
        let now = self.clock.now();
        let item = self.ensure_item(entry.url());
        let mut merged = Vec::with_capacity(properties.len());

        for (namespace, value) in properties {
            item.properties.insert(namespace.clone(), value);
            merged.push(namespace);
        }
        item.time = now;

        for namespace in &merged {
            self.queue_notification(entry, namespace, out);
        }

        merged
    }

    fn clear_where<F>(&mut self, selector: &NamespaceSelector, mut matches: F)
    where
        F: FnMut(&str) -> bool,
    {
        for (key, item) in self.items.iter_mut() {
            if !matches(key) {
                continue;
            }
            match selector {
                NamespaceSelector::All => item.properties.clear(),
                NamespaceSelector::Only(namespaces) => {
                    for namespace in namespaces {
                        item.properties.remove(namespace);
                    }
                }
            }
        }
    }

    fn close_batch(&mut self) -> Result<Vec<Notification>> {
        if !self.batch.leave()? {
            return Ok(Vec::new());
        }

        self.evict_if_needed();

        let items = &self.items;
        Ok(self.observers.drain_pending(|key, namespace| {
            items
                .get(key)
                .and_then(|item| item.properties.get(namespace))
                .cloned()
        }))
    }
}

#[derive(Clone)]
pub struct MetadataCache {
    state: Arc<Mutex<CacheState>>,
    providers: Arc<[Arc<dyn MetadataProvider>]>,
}

impl MetadataCache {
    /// Creates a cache over `providers`.
    ///
    /// The order of `providers` is the fetch priority: for each namespace the
    /// first provider that supports the entry and the namespace is asked
    /// first, and later providers only when it does not supply the namespace.
    pub fn new(providers: Vec<Arc<dyn MetadataProvider>>) -> Self {
        Self::with_eviction_margin(providers, eviction::DEFAULT_EVICTION_MARGIN)
    }

    pub fn with_eviction_margin(providers: Vec<Arc<dyn MetadataProvider>>, margin: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(margin))),
            providers: providers.into(),
        }
    }

    pub fn create_full(config: &Config) -> Result<Self> {
        let mut providers: Vec<Arc<dyn MetadataProvider>> = vec![Arc::new(FilesystemProvider::new())];

        if config.external.enabled {
            let backend = MountTableBackend::new(
                config.external.mounts_path.clone(),
                config.external.extra_remote_types.clone(),
            );
            providers.push(Arc::new(ExternalProvider::new(
                Arc::new(backend),
                Duration::from_millis(config.external.batch_delay_ms),
            )));
        }

        if config.content.enabled {
            let thumbnail_dir = match &config.content.thumbnail_dir {
                Some(dir) => dir.clone(),
                None => ThumbnailStore::default_dir()?,
            };
            let store = ThumbnailStore::new(thumbnail_dir, config.content.prefer_large);
            providers.push(Arc::new(ContentProvider::new(store)));
        }

        let cache = Self::with_eviction_margin(providers, config.cache.eviction_margin);
        if config.cache.initial_size_hint > 0 {
            cache.resize_by(config.cache.initial_size_hint as isize);
        }

        Ok(cache)
    }

    pub fn providers(&self) -> &[Arc<dyn MetadataProvider>] {
        &self.providers
    }

    pub async fn get(&self, entries: &[Entry], expr: &str) -> Vec<Metadata> {
        self.get_internal(entries, expr, false).await
    }

    pub async fn get_latest(&self, entries: &[Entry], expr: &str) -> Vec<Metadata> {
        self.get_internal(entries, expr, true).await
    }

    pub async fn get_one(&self, entry: &Entry, expr: &str) -> Metadata {
        let _batch = self.batch();
        self.get_one_internal(entry, expr, false).await
    }

    async fn get_internal(&self, entries: &[Entry], expr: &str, refresh: bool) -> Vec<Metadata> {
        let _batch = self.batch();
        join_all(
            entries
                .iter()
                .map(|entry| self.get_one_internal(entry, expr, refresh)),
        )
        .await
    }

    pub(crate) async fn get_one_internal(&self, entry: &Entry, expr: &str, refresh: bool) -> Metadata {
        let namespaces = namespace::parse(expr);
        let values = join_all(
            namespaces
                .iter()
                .map(|namespace| self.get_namespace(entry, namespace, refresh)),
        )
        .await;

        namespaces.into_iter().zip(values).collect()
    }

    async fn get_namespace(&self, entry: &Entry, namespace: &str, refresh: bool) -> Option<Value> {
        let cached = {
            let mut state = self.state.lock();
            state
                .ensure_item(entry.url())
                .properties
                .get(namespace)
                .cloned()
        };

        if !refresh {
            if let Some(value) = cached {
                tokio::task::yield_now().await;
                return Some(value);
            }
        }

        let _batch = self.batch();
        for provider in self.providers.iter() {
            if !provider.supports_entry(entry) || !provider.provides_type(namespace) {
                continue;
            }

            let supplied = self.fetch_from_provider(entry, provider, namespace, refresh).await;
            if supplied.iter().any(|n| n == namespace) {
                return self.get_cached(entry, namespace);
            }
            if !refresh {
                if let Some(value) = self.get_cached(entry, namespace) {
                    return Some(value);
                }
            }
        }

        tokio::task::yield_now().await;
        // A refresh nobody could answer leaves the previous value in place.
        if refresh {
            self.get_cached(entry, namespace)
        } else {
            None
        }
    }

    pub fn get_cached(&self, entry: &Entry, namespace: &str) -> Option<Value> {
        self.state.lock().cached_value(entry.url(), namespace)
    }

    pub fn set(&self, entry: &Entry, namespace: &str, value: Value) {
        self.set_many(std::iter::once((entry.clone(), value)), namespace);
    }

    pub fn set_many<I>(&self, values: I, namespace: &str)
    where
        I: IntoIterator<Item = (Entry, Value)>,
    {
        let _batch = self.batch();
        let notifications = {
            let mut state = self.state.lock();
            let mut out = Vec::new();
            for (entry, value) in values {
                state.store(&entry, namespace, value, &mut out);
            }
            out
        };
        deliver_all(notifications);
    }

    pub fn clear(&self, entries: &[Entry], expr: &str) {
        let urls: Vec<&str> = entries.iter().map(Entry::url).collect();
        self.clear_by_url(&urls, expr);
    }

    pub fn clear_by_url<S: AsRef<str>>(&self, urls: &[S], expr: &str) {
        let selector = NamespaceSelector::parse(expr);
        let urls: HashSet<&str> = urls.iter().map(AsRef::as_ref).collect();
        let mut state = self.state.lock();
        state.clear_where(&selector, |key| urls.contains(key));
    }

    pub fn clear_recursively(&self, entry: &Entry, expr: &str) {
        let selector = NamespaceSelector::parse(expr);
        let root = entry.url();
        let mut state = self.state.lock();
        state.clear_where(&selector, |key| relative_to(root, key).is_some());
    }

    pub fn is_initialized(&self) -> bool {
        self.providers.iter().all(|p| p.is_initialized())
    }

    pub fn resize_by(&self, delta: isize) {
        let mut state = self.state.lock();
        state.current_cache_size = state.current_cache_size.saturating_add_signed(delta);
        state.evict_if_needed();
    }

    pub fn eviction_threshold(&self) -> usize {
        self.state.lock().threshold()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_observer<F>(&self, entry: &Entry, relation: Relation, namespace: &str, observer: F) -> ObserverId
    where
        F: Fn(&[Entry], &HashMap<String, Option<Value>>) + Send + Sync + 'static,
    {
        self.state
            .lock()
            .observers
            .add(entry, relation, namespace, Arc::new(observer))
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.state.lock().observers.remove(id)
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn start_batch_updates(&self) {
        let mut state = self.state.lock();
        let now = state.clock.now();
        state.batch.enter(now);
    }

    pub fn end_batch_updates(&self) -> Result<()> {
        let notifications = self.state.lock().close_batch().map_err(|e| {
            tracing::error!("Unbalanced batch close: {}", e);
            e
        })?;
        deliver_all(notifications);
        Ok(())
    }

    pub fn batch_depth(&self) -> usize {
        self.state.lock().batch.depth()
    }

    pub fn batch(&self) -> BatchGuard {
        BatchGuard::new(self)
    }
}
