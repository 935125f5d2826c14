use crate::cache::fetch::FetchOutcome;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(u64);

#[derive(Debug, Default)]
pub(crate) struct LogicalClock {
    current: u64,
}

impl LogicalClock {
    pub fn now(&mut self) -> Tick {
        self.current += 1;
        Tick(self.current)
    }
}

pub(crate) struct CacheItem {
    pub properties: HashMap<String, Value>,
    pub time: Tick,
    pub pending: HashMap<String, PendingFetch>,
}

impl CacheItem {
    pub fn new(time: Tick) -> Self {
        Self {
            properties: HashMap::new(),
            time,
            pending: HashMap::new(),
        }
    }

    pub fn has_pending_fetch(&self) -> bool {
        !self.pending.is_empty()
    }
}

pub(crate) struct PendingFetch {
    pub generation: u64,
    pub waiters: Vec<oneshot::Sender<FetchOutcome>>,
}
