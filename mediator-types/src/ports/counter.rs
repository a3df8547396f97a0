//! Shared fixed-window counters backing the request rate limiter.

use std::time::Duration;

use crate::error::CounterStoreError;

/// Counter value after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    /// Time until the window (and the counter) expires.
    pub resets_in: Duration,
}

#[async_trait::async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Increments `key`, creating it with a TTL of `window` when absent or
    /// expired.
    async fn increment(&self, key: &str, window: Duration)
    -> Result<WindowCount, CounterStoreError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), CounterStoreError>;
}
