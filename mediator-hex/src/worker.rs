//! Background processing of received webhooks.
//!
//! Intake and retry push event ids onto a bounded channel; the worker drains
//! it and additionally sweeps the `pending` backlog on every tick, so an id
//! dropped from a full queue is still processed later.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument};

use mediator_types::{ProviderGateway, ProviderWebhookId, Repository};

use crate::MediatorService;

/// Default capacity of the in-process webhook queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Timestamp of the worker's last loop iteration.
#[derive(Debug, Clone, Default)]
pub struct Heartbeat(Arc<AtomicI64>);

impl Heartbeat {
    pub fn beat(&self, now: DateTime<Utc>) {
        self.0.store(now.timestamp_millis(), Ordering::Relaxed);
    }

    /// `None` until the first beat.
    pub fn last(&self) -> Option<DateTime<Utc>> {
        match self.0.load(Ordering::Relaxed) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }
}

/// Producer side of the webhook queue.
#[derive(Debug, Clone)]
pub struct WebhookQueue {
    sender: mpsc::Sender<ProviderWebhookId>,
    heartbeat: Heartbeat,
}

impl WebhookQueue {
    /// Queues an event for processing. A full or closed queue is not an
    /// error: the sweep picks the event up from storage.
    pub fn enqueue(&self, id: ProviderWebhookId) -> bool {
        match self.sender.try_send(id) {
            Ok(()) => true,
            Err(e) => {
                debug!(webhook_id = %id, "Webhook not queued, left for sweep: {}", e);
                false
            }
        }
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }
}

/// Consumer side of the webhook queue, handed to [`WebhookWorker`].
#[derive(Debug)]
pub struct WebhookReceiver {
    receiver: mpsc::Receiver<ProviderWebhookId>,
    heartbeat: Heartbeat,
}

impl WebhookReceiver {
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<ProviderWebhookId> {
        self.receiver.try_recv().ok()
    }
}

/// Creates a bounded queue sharing one heartbeat between both ends.
pub fn webhook_queue(capacity: usize) -> (WebhookQueue, WebhookReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let heartbeat = Heartbeat::default();
    (
        WebhookQueue {
            sender,
            heartbeat: heartbeat.clone(),
        },
        WebhookReceiver {
            receiver,
            heartbeat,
        },
    )
}

pub struct WebhookWorker<R: Repository, G: ProviderGateway> {
    service: Arc<MediatorService<R, G>>,
    receiver: WebhookReceiver,
    poll_interval: Duration,
}

impl<R: Repository, G: ProviderGateway> WebhookWorker<R, G> {
    pub fn new(
        service: Arc<MediatorService<R, G>>,
        receiver: WebhookReceiver,
        poll_interval: Duration,
    ) -> Self {
        Self {
            service,
            receiver,
            poll_interval,
        }
    }

    #[instrument(skip(self), fields(poll_interval_ms = self.poll_interval.as_millis() as u64))]
    pub async fn run(mut self) {
        info!("Starting webhook worker");
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut queue_open = true;

        loop {
            self.receiver.heartbeat.beat(Utc::now());
            tokio::select! {
                received = self.receiver.receiver.recv(), if queue_open => match received {
                    Some(id) => self.process(id).await,
                    None => {
                        info!("Webhook queue closed; continuing with sweeps only");
                        queue_open = false;
                    }
                },
                _ = ticker.tick() => self.sweep().await,
            }
        }
    }

    #[instrument(skip(self), fields(webhook_id = %id))]
    async fn process(&self, id: ProviderWebhookId) {
        match self.service.process_webhook(id).await {
            Ok(Some(status)) => info!(%status, "Webhook processed"),
            Ok(None) => debug!("Webhook already handled"),
            Err(e) => error!("Failed to process webhook: {}", e),
        }
    }

    async fn sweep(&self) {
        match self.service.sweep_pending_webhooks().await {
            Ok(0) => {}
            Ok(n) => info!("Processed {} pending webhooks", n),
            Err(e) => error!("Failed to sweep pending webhooks: {}", e),
        }
    }
}
