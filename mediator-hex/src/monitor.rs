//! Periodic provider status probes and expired key cleanup.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument};

use mediator_types::{ProviderGateway, Repository};

use crate::MediatorService;

pub struct ProviderMonitor<R: Repository, G: ProviderGateway> {
    service: Arc<MediatorService<R, G>>,
    interval: Duration,
}

impl<R: Repository, G: ProviderGateway> ProviderMonitor<R, G> {
    pub fn new(service: Arc<MediatorService<R, G>>, interval: Duration) -> Self {
        Self { service, interval }
    }

    #[instrument(skip(self), fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(self) {
        info!("Starting provider monitor");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match self.service.check_all_providers().await {
                Ok(results) => {
                    let healthy = results.iter().filter(|r| r.is_healthy).count();
                    info!(
                        checked = results.len(),
                        healthy,
                        "Provider status sweep finished"
                    );
                }
                Err(e) => error!("Provider status sweep failed: {}", e),
            }
            if let Err(e) = self.service.cleanup_expired_provider_keys().await {
                error!("Expired provider key cleanup failed: {}", e);
            }
        }
    }
}
