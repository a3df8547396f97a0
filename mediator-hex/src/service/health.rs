//! Liveness of the database, the counter store and the webhook worker.

use std::collections::BTreeMap;
use std::time::Instant;

use mediator_types::{
    ComponentHealth, HealthReport, HealthStatus, ProviderGateway, Repository,
};
use serde_json::json;

use super::MediatorService;

/// Heartbeats older than this many poll intervals mark the queue unhealthy.
const STALE_INTERVALS: u32 = 3;

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    /// Overall report; unhealthy when any component is.
    pub async fn health(&self) -> HealthReport {
        let mut components = BTreeMap::new();
        components.insert("database".to_string(), self.database_health().await);
        components.insert("cache".to_string(), self.cache_health().await);
        components.insert("queue".to_string(), self.queue_health().await);
        HealthReport::from_components(components, self.now())
    }

    pub async fn database_health(&self) -> ComponentHealth {
        let started = Instant::now();
        let result = self.repo.ping().await;
        component(started, result.err().map(|e| e.to_string()), None)
    }

    pub async fn cache_health(&self) -> ComponentHealth {
        let started = Instant::now();
        let result = self.counters.ping().await;
        component(started, result.err().map(|e| e.to_string()), None)
    }

    /// Healthy while the worker ticked recently; reports the pending backlog.
    pub async fn queue_health(&self) -> ComponentHealth {
        let started = Instant::now();
        let now = self.now();
        let last = self.queue.heartbeat().last();
        let max_age = self.settings.webhook_poll_interval * STALE_INTERVALS;

        let mut error = match last {
            None => Some("Webhook worker has not started".to_string()),
            Some(at) => {
                let age = (now - at).to_std().unwrap_or_default();
                (age > max_age).then(|| format!("Webhook worker idle for {} ms", age.as_millis()))
            }
        };

        let pending = match self.repo.webhook_stats(None, None).await {
            Ok(stats) => Some(stats.pending),
            Err(e) => {
                error.get_or_insert_with(|| format!("Cannot read backlog: {}", e));
                None
            }
        };

        let details = json!({
            "last_heartbeat": last,
            "pending": pending,
        });
        component(started, error, Some(details))
    }
}

fn component(
    started: Instant,
    error: Option<String>,
    details: Option<serde_json::Value>,
) -> ComponentHealth {
    ComponentHealth {
        status: if error.is_none() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        latency_ms: started.elapsed().as_millis() as u64,
        error,
        details,
    }
}
