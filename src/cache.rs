use std::time::Duration;

use tokio::time::Instant;

/// Single-entry response cache. Entries expire by TTL only.
#[derive(Debug)]
pub(crate) struct ResponseCache<T> {
    entry: Option<CacheEntry<T>>,
}

#[derive(Debug)]
struct CacheEntry<T> {
    payload: T,
    stored_at: Instant,
}

impl<T> Default for ResponseCache<T> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<T> ResponseCache<T> {
    /// Payload stored less than `ttl` ago.
    pub(crate) fn get(&self, ttl: Duration, now: Instant) -> Option<&T> {
        self.entry
            .as_ref()
            .filter(|entry| entry.stored_at + ttl > now)
            .map(|entry| &entry.payload)
    }

    pub(crate) fn store(&mut self, payload: T, now: Instant) {
        self.entry = Some(CacheEntry {
            payload,
            stored_at: now,
        });
    }
}
