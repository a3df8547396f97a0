//! Provider webhook intake and processing.
//!
//! Intake verifies the signature, stores the event as `pending` and hands
//! its id to the worker queue. Processing claims the event, applies its side
//! effect and records the outcome. A claim that is never finished expires
//! after the configured lease and the sweep picks the event up again.

use chrono::{DateTime, Duration, Utc};
use mediator_repo::security::verify_signature;
use mediator_types::{
    AppError, AuditAction, InboundWebhook, KycProfileId, ProviderGateway, ProviderStatus,
    ProviderWebhook, ProviderWebhookId, Repository, Transaction, TransactionId, WebhookQuery,
    WebhookStatus, WebhookSummary,
};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{Caller, MediatorService, not_found};

/// Headers kept with a received event.
pub const RECORDED_HEADERS: &[&str] = &[
    "content-type",
    "user-agent",
    "x-request-id",
    "x-webhook-id",
    "x-webhook-timestamp",
];

/// Events fetched per sweep of the pending backlog.
pub const SWEEP_BATCH: i64 = 10;

/// A received callback, before verification.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub body: Vec<u8>,
    pub signature: Option<String>,
    pub ip_address: Option<String>,
    pub headers: Value,
}

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    // ─────────────────────────────────────────────────────────────────────────
    // Intake
    // ─────────────────────────────────────────────────────────────────────────

    /// Verifies and stores a provider callback.
    ///
    /// Returns the stored event and whether it was newly created; a repeated
    /// `event_id` returns the event already on file.
    #[tracing::instrument(skip(self, delivery), fields(provider = %provider_code))]
    pub async fn receive_webhook(
        &self,
        provider_code: &str,
        delivery: WebhookDelivery,
    ) -> Result<(ProviderWebhook, bool), AppError> {
        let provider = self
            .repo
            .find_provider_by_code(provider_code)
            .await?
            .ok_or_else(|| not_found("Provider", provider_code))?;
        if !provider.is_active {
            return Err(AppError::Forbidden(format!(
                "Provider {} is not active",
                provider.code
            )));
        }

        let signature = delivery
            .signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".into()))?;
        if !verify_signature(&delivery.body, &signature, &provider.webhook_secret) {
            tracing::warn!(ip = ?delivery.ip_address, "Rejected webhook with invalid signature");
            return Err(AppError::Unauthorized("Invalid webhook signature".into()));
        }

        let payload: Value = serde_json::from_slice(&delivery.body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;
        if !payload.is_object() {
            return Err(AppError::BadRequest("Webhook body must be a JSON object".into()));
        }
        let inbound: InboundWebhook = serde_json::from_value(payload.clone()).map_err(|e| {
            AppError::BadRequest(format!("Invalid webhook body: {}", e))
        })?;

        let event = ProviderWebhook::receive(
            provider.id,
            inbound.event_id.unwrap_or_else(Uuid::new_v4),
            inbound.event_type,
            payload,
            signature,
            delivery.ip_address,
            delivery.headers,
            self.now(),
        )?;
        let (stored, created) = self.repo.insert_webhook(&event).await?;

        if created {
            tracing::info!(
                webhook_id = %stored.id,
                event_type = %stored.event_type,
                "Webhook accepted"
            );
            self.queue.enqueue(stored.id);
        } else {
            tracing::info!(webhook_id = %stored.id, "Duplicate webhook delivery");
        }
        Ok((stored, created))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Administration
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_webhooks(
        &self,
        caller: &Caller,
        query: WebhookQuery,
    ) -> Result<Vec<ProviderWebhook>, AppError> {
        caller.require_admin()?;
        self.repo.list_webhooks(&query).await.map_err(Into::into)
    }

    pub async fn get_webhook(
        &self,
        caller: &Caller,
        id: ProviderWebhookId,
    ) -> Result<ProviderWebhook, AppError> {
        caller.require_admin()?;
        self.repo
            .get_webhook(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| not_found("Webhook", id)))
    }

    /// `failed -> pending`, counting one more attempt, and re-queues it.
    #[tracing::instrument(skip(self, caller), fields(webhook_id = %id))]
    pub async fn retry_webhook(
        &self,
        caller: &Caller,
        id: ProviderWebhookId,
    ) -> Result<ProviderWebhook, AppError> {
        caller.require_admin()?;
        let event = self.repo.retry_webhook(id, self.now()).await?;
        self.audit(
            Some(caller),
            AuditAction::Retry,
            "provider_webhook",
            id,
            json!({"retry_count": event.retry_count}),
        )
        .await;
        self.queue.enqueue(event.id);
        Ok(event)
    }

    #[tracing::instrument(skip(self, caller), fields(webhook_id = %id))]
    pub async fn cancel_webhook(
        &self,
        caller: &Caller,
        id: ProviderWebhookId,
    ) -> Result<ProviderWebhook, AppError> {
        caller.require_admin()?;
        let event = self.repo.cancel_webhook(id, self.now()).await?;
        self.audit(Some(caller), AuditAction::Cancel, "provider_webhook", id, json!({}))
            .await;
        Ok(event)
    }

    /// Counts and success rate over the last 24 hours.
    pub async fn webhook_summary(&self, caller: &Caller) -> Result<WebhookSummary, AppError> {
        caller.require_admin()?;
        let period_end = self.now();
        let period_start = period_end - Duration::hours(24);
        let stats = self.repo.webhook_stats(None, Some(period_start)).await?;
        Ok(WebhookSummary {
            period_start,
            period_end,
            success_rate: stats.success_rate(),
            stats,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Claims and processes one event.
    ///
    /// Returns the final status, or `None` when the event was not claimable
    /// (claimed by a live worker, finished or cancelled) or another worker
    /// took it over meanwhile.
    #[tracing::instrument(skip(self), fields(webhook_id = %id))]
    pub async fn process_webhook(
        &self,
        id: ProviderWebhookId,
    ) -> Result<Option<WebhookStatus>, AppError> {
        let now = self.now();
        let Some(claimed) = self
            .repo
            .claim_webhook(id, now, self.stale_claims_before(now))
            .await?
        else {
            return Ok(None);
        };

        let mut event = claimed.clone();
        let outcome = self.dispatch(&event).await;
        let now = self.now();
        let recorded = match outcome {
            Ok(()) => event.complete(now),
            Err(reason) => {
                tracing::warn!(event_type = %event.event_type, "Webhook processing failed: {}", reason);
                event.fail(reason, now)
            }
        };
        let finished = match recorded {
            Ok(()) => self.repo.finish_webhook(&event).await.map_err(AppError::from),
            Err(e) => Err(e.into()),
        };

        match finished {
            Ok(true) => Ok(Some(event.status)),
            Ok(false) => {
                tracing::info!("Webhook taken over by another worker; outcome discarded");
                Ok(None)
            }
            Err(e) => {
                tracing::error!("Failed to record webhook outcome: {}", e);
                self.release_failed(claimed, e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Processes up to one batch of claimable events: the pending backlog
    /// and claims whose lease has run out.
    pub async fn sweep_pending_webhooks(&self) -> Result<usize, AppError> {
        let stale_before = self.stale_claims_before(self.now());
        let pending = self.repo.pending_webhooks(SWEEP_BATCH, stale_before).await?;
        let mut processed = 0;
        for event in pending {
            if self.process_webhook(event.id).await?.is_some() {
                processed += 1;
            }
        }
        Ok(processed)
    }

    /// Claims last touched before this instant may be taken over.
    fn stale_claims_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::from_std(self.settings.webhook_lease)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Best effort: moves a claimed event to `failed` so it does not wait out
    /// its lease. When this fails too the sweep retries after the lease.
    async fn release_failed(&self, mut event: ProviderWebhook, reason: String) {
        let released = match event.fail(reason, self.now()) {
            Ok(()) => self
                .repo
                .finish_webhook(&event)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = released {
            tracing::error!(
                webhook_id = %event.id,
                "Webhook stays processing until its lease expires: {}",
                e
            );
        }
    }

    /// Applies the side effect of an event. The error is the message stored
    /// on the failed event.
    async fn dispatch(&self, event: &ProviderWebhook) -> Result<(), String> {
        let data = event.payload.get("data").cloned().unwrap_or(Value::Null);
        let event_type = event.event_type.as_str();

        match event_type {
            "payment.success" | "payment.completed" => {
                let mut tx = self.referenced_transaction(&data).await?;
                tx.complete(Some(data), self.now())
                    .map_err(|e| e.to_string())?;
                self.repo
                    .finalize_transaction(&tx)
                    .await
                    .map_err(|e| e.to_string())
            }
            "payment.failure" | "payment.failed" => {
                let mut tx = self.referenced_transaction(&data).await?;
                let error = data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Payment failed at provider")
                    .to_string();
                tx.fail(error, Some(data), self.now())
                    .map_err(|e| e.to_string())?;
                self.repo
                    .finalize_transaction(&tx)
                    .await
                    .map_err(|e| e.to_string())
            }
            "payment.refund" => Ok(()),
            "kyc.verified" | "kyc.rejected" => {
                let id: KycProfileId = string_field(&data, "kyc_profile_id")?
                    .parse()
                    .map_err(|_| "data.kyc_profile_id is not a valid id".to_string())?;
                let rejection = (event_type == "kyc.rejected").then(|| {
                    data.get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("Rejected by provider")
                        .to_string()
                });
                self.apply_kyc_decision(id, rejection)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            "provider.status" => {
                let status: ProviderStatus = string_field(&data, "status")?
                    .parse()
                    .map_err(|e: mediator_types::DomainError| e.to_string())?;
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(String::from);
                let mut provider = self
                    .repo
                    .get_provider(event.provider_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| "provider no longer exists".to_string())?;
                let previous = provider.status;
                provider.set_status(status, message, self.now());
                self.repo
                    .record_provider_status(&provider)
                    .await
                    .map_err(|e| e.to_string())?;
                self.notify_status_change(None, &provider, previous, "webhook")
                    .await;
                Ok(())
            }
            other if other.starts_with("wallet.") || other.starts_with("bank.") => Ok(()),
            _ => Err("unsupported event type".to_string()),
        }
    }

    /// Looks up `data.transaction_id` (id or reference) or `data.reference`.
    async fn referenced_transaction(&self, data: &Value) -> Result<Transaction, String> {
        let found = if let Some(id) = data.get("transaction_id").and_then(Value::as_str) {
            match id.parse::<TransactionId>() {
                Ok(id) => self.repo.get_transaction(id).await,
                Err(_) => self.repo.find_transaction_by_reference(id).await,
            }
        } else if let Some(reference) = data.get("reference").and_then(Value::as_str) {
            self.repo.find_transaction_by_reference(reference).await
        } else {
            return Err("data.transaction_id or data.reference is required".to_string());
        };

        found
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "referenced transaction not found".to_string())
    }
}

fn string_field<'a>(data: &'a Value, field: &str) -> Result<&'a str, String> {
    data.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("data.{} is required", field))
}
