use crate::cache::item::Tick;
use crate::cache::MetadataCache;
use crate::{Error, Result};

#[derive(Debug, Default)]
pub(crate) struct BatchState {
    depth: usize,
    last_start: Tick,
}

impl BatchState {
    pub fn is_batching(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn last_start(&self) -> Tick {
        self.last_start
    }

    pub fn enter(&mut self, now: Tick) {
        if self.depth == 0 {
            self.last_start = now;
        }
        self.depth += 1;
    }

    /// Returns `true` when this closed the outermost batch.
    pub fn leave(&mut self) -> Result<bool> {
        if self.depth == 0 {
            return Err(Error::UnbalancedBatch);
        }
        self.depth -= 1;
        Ok(self.depth == 0)
    }
}

#[must_use = "the batch closes as soon as the guard is dropped"]
pub struct BatchGuard {
    cache: MetadataCache,
}

impl BatchGuard {
    pub(crate) fn new(cache: &MetadataCache) -> Self {
        cache.start_batch_updates();
        Self {
            cache: cache.clone(),
        }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if let Err(e) = self.cache.end_batch_updates() {
            tracing::error!("Failed to close batch: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::item::LogicalClock;

    #[test]
    fn test_nesting() {
        let mut clock = LogicalClock::default();
        let mut state = BatchState::default();
        assert!(!state.is_batching());

        let first = clock.now();
        state.enter(first);
        state.enter(clock.now());
        assert_eq!(state.depth(), 2);
        assert_eq!(state.last_start(), first);

        assert!(!state.leave().unwrap());
        assert!(state.leave().unwrap());
        assert!(!state.is_batching());
    }

    #[test]
    fn test_unbalanced_leave() {
        let mut state = BatchState::default();
        assert!(matches!(state.leave(), Err(Error::UnbalancedBatch)));
    }
}
