use crate::cache::item::PendingFetch;
use crate::cache::observer::deliver_all;
use crate::cache::{CacheState, MetadataCache};
use crate::entry::Entry;
use crate::provider::{MetadataProvider, Properties};
use futures::FutureExt;
use std::collections::hash_map;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) type FetchOutcome = Arc<[String]>;

impl CacheState {
    fn subscribe(
        &mut self,
        key: &str,
        provider_id: &str,
        waiter: oneshot::Sender<FetchOutcome>,
        refresh: bool,
    ) -> Option<u64> {
        self.next_generation += 1;
        let generation = self.next_generation;

        let item = self.ensure_item(key);
        match item.pending.entry(provider_id.to_string()) {
            hash_map::Entry::Occupied(mut occupied) => {
                let pending = occupied.get_mut();
                pending.waiters.push(waiter);
                if !refresh {
                    tracing::debug!(
                        "Joining in-flight {} fetch for {} ({} waiting)",
                        provider_id,
                        key,
                        pending.waiters.len()
                    );
                    return None;
                }
                tracing::debug!(
                    "Refresh supersedes {} fetch generation {} for {}",
                    provider_id,
                    pending.generation,
                    key
                );
                pending.generation = generation;
                Some(generation)
            }
            hash_map::Entry::Vacant(vacant) => {
                vacant.insert(PendingFetch {
                    generation,
                    waiters: vec![waiter],
                });
                Some(generation)
            }
        }
    }

    fn take_waiters(
        &mut self,
        key: &str,
        provider_id: &str,
        generation: u64,
    ) -> Option<Vec<oneshot::Sender<FetchOutcome>>> {
        let item = self.items.get_mut(key)?;
        match item.pending.get(provider_id) {
            Some(pending) if pending.generation == generation => {
                item.pending.remove(provider_id).map(|p| p.waiters)
            }
            _ => None,
        }
    }
}

impl MetadataCache {
    pub(crate) async fn fetch_from_provider(
        &self,
        entry: &Entry,
        provider: &Arc<dyn MetadataProvider>,
        namespace: &str,
        refresh: bool,
    ) -> FetchOutcome {
        let (tx, rx) = oneshot::channel();
        let launch = self
            .state
            .lock()
            .subscribe(entry.url(), provider.id(), tx, refresh);

        if let Some(generation) = launch {
            self.spawn_fetch(entry.clone(), Arc::clone(provider), namespace.to_string(), generation);
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    "Fetch from {} for {} ended without a result",
                    provider.id(),
                    entry.url()
                );
                Arc::from(Vec::new())
            }
        }
    }

    fn spawn_fetch(
        &self,
        entry: Entry,
        provider: Arc<dyn MetadataProvider>,
        namespace: String,
        generation: u64,
    ) {
        let cache = self.clone();
        tokio::spawn(async move {
            let fetched = AssertUnwindSafe(provider.fetch(&entry, &namespace))
                .catch_unwind()
                .await;

            let properties = match fetched {
                Ok(Ok(properties)) => properties,
                Ok(Err(e)) => {
                    tracing::warn!(
                        "Provider {} failed for {}: {}",
                        provider.id(),
                        entry.url(),
                        e
                    );
                    None
                }
                Err(_) => {
                    tracing::error!("Provider {} panicked while fetching {}", provider.id(), entry.url());
                    None
                }
            };

            cache.complete_fetch(&entry, provider.id(), generation, properties);
        });
    }

    fn complete_fetch(
        &self,
        entry: &Entry,
        provider_id: &str,
        generation: u64,
        properties: Option<Properties>,
    ) {
        let mut notifications = Vec::new();
        let (waiters, outcome) = {
            let mut state = self.state.lock();
            let Some(waiters) = state.take_waiters(entry.url(), provider_id, generation) else {
                tracing::debug!(
                    "Discarding superseded {} fetch generation {} for {}",
                    provider_id,
                    generation,
                    entry.url()
                );
                return;
            };

            let merged = match properties {
                Some(properties) => state.merge(entry, properties, &mut notifications),
                None => Vec::new(),
            };
            (waiters, FetchOutcome::from(merged))
        };

        deliver_all(notifications);
        for waiter in waiters {
            let _ = waiter.send(Arc::clone(&outcome));
        }
    }
}
