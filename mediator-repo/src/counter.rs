//! In-process fixed-window counter store backing the rate limiter.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use mediator_types::{CounterStore, CounterStoreError, WindowCount};

struct Window {
    count: u64,
    expires_at: Instant,
}

/// Counters keyed by identity; each key expires `window` after its first hit.
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, Window>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops windows that have expired. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, w| w.expires_at > now);
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount, CounterStoreError> {
        let now = Instant::now();
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + window,
        });

        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count += 1;

        Ok(WindowCount {
            count: entry.count,
            resets_in: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn ping(&self) -> Result<(), CounterStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_counts_within_window() {
        let store = MemoryCounterStore::new();
        for expected in 1..=3 {
            let hit = store.increment("a", WINDOW).await.unwrap();
            assert_eq!(hit.count, expected);
        }
        let other = store.increment("b", WINDOW).await.unwrap();
        assert_eq!(other.count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_ttl() {
        let store = MemoryCounterStore::new();
        store.increment("a", WINDOW).await.unwrap();
        store.increment("a", WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        let hit = store.increment("a", WINDOW).await.unwrap();
        assert_eq!(hit.count, 3);
        assert_eq!(hit.resets_in, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(31)).await;
        let hit = store.increment("a", WINDOW).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(hit.resets_in, WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryCounterStore::new();
        store.increment("short", Duration::from_secs(1)).await.unwrap();
        store.increment("long", WINDOW).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
