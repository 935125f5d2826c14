use crate::cache::item::{CacheItem, Tick};
use std::collections::HashMap;

pub const DEFAULT_EVICTION_MARGIN: usize = 500;

pub fn threshold(cache_size: usize, margin: usize) -> usize {
    cache_size.saturating_mul(2).saturating_add(margin)
}

/// Picks up to `remove_count` keys to drop, oldest first.
///
/// Only items last touched before `floor` (the start of the current batch)
/// and with no fetch in flight are eligible.
pub(crate) fn select_victims(
    items: &HashMap<String, CacheItem>,
    floor: Tick,
    remove_count: usize,
) -> Vec<String> {
    if remove_count == 0 {
        return Vec::new();
    }

    let mut candidates: Vec<(Tick, &String)> = items
        .iter()
        .filter(|(_, item)| item.time < floor && !item.has_pending_fetch())
        .map(|(key, item)| (item.time, key))
        .collect();

    candidates.sort_unstable();
    candidates
        .into_iter()
        .take(remove_count)
        .map(|(_, key)| key.clone())
        .collect()
}
