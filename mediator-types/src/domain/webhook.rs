//! Inbound provider webhook events and their processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::ProviderId;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a stored ProviderWebhook.
    ProviderWebhookId
);

text_enum!(
    /// Processing state of a received event.
    ///
    /// `pending -> processing -> completed | failed`; `failed -> pending` on
    /// retry; `pending -> cancelled`. A `processing` event whose claim has
    /// gone stale may be claimed again.
    WebhookStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
);

impl WebhookStatus {
    /// States a worker may claim from.
    pub const CLAIMABLE: &'static [WebhookStatus] = &[WebhookStatus::Pending];
    /// States a worker may finish from.
    pub const FINISHABLE: &'static [WebhookStatus] = &[WebhookStatus::Processing];
    /// States a manual retry may start from.
    pub const RETRYABLE: &'static [WebhookStatus] = &[WebhookStatus::Failed];
    /// States a cancel may start from. A claimed event is left to its worker.
    pub const CANCELLABLE: &'static [WebhookStatus] = &[WebhookStatus::Pending];

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WebhookStatus::Completed | WebhookStatus::Cancelled)
    }
}

/// A provider callback as received and stored.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ProviderWebhook {
    pub id: ProviderWebhookId,
    /// Provider-assigned event identifier; unique per provider.
    pub event_id: Uuid,
    pub provider_id: ProviderId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: WebhookStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub signature: String,
    pub ip_address: Option<String>,
    pub headers: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ProviderWebhook {
    #[allow(clippy::too_many_arguments)]
    pub fn receive(
        provider_id: ProviderId,
        event_id: Uuid,
        event_type: String,
        payload: serde_json::Value,
        signature: String,
        ip_address: Option<String>,
        headers: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if event_type.trim().is_empty() || event_type.len() > 100 {
            return Err(DomainError::validation(
                "event_type must be between 1 and 100 characters",
            ));
        }
        Ok(Self {
            id: ProviderWebhookId::new(),
            event_id,
            provider_id,
            event_type,
            payload,
            status: WebhookStatus::Pending,
            error_message: None,
            retry_count: 0,
            signature,
            ip_address,
            headers,
            created_at: now,
            updated_at: now,
            processed_at: None,
        })
    }

    fn transition(
        &mut self,
        allowed: &[WebhookStatus],
        to: WebhookStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::transition("webhook", self.status, to));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// Worker claim: `pending -> processing`.
    pub fn begin_processing(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(WebhookStatus::CLAIMABLE, WebhookStatus::Processing, now)
    }

    /// `true` when a worker may claim the event: it is pending, or its
    /// current claim was last touched before `stale_before`.
    pub fn is_claimable(&self, stale_before: DateTime<Utc>) -> bool {
        match self.status {
            WebhookStatus::Pending => true,
            WebhookStatus::Processing => self.updated_at < stale_before,
            _ => false,
        }
    }

    /// Claims a pending event, or takes over a stale claim.
    pub fn claim(
        &mut self,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status == WebhookStatus::Processing && self.is_claimable(stale_before) {
            self.updated_at = now;
            return Ok(());
        }
        self.begin_processing(now)
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(WebhookStatus::FINISHABLE, WebhookStatus::Completed, now)?;
        self.error_message = None;
        self.processed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, error: String, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(WebhookStatus::FINISHABLE, WebhookStatus::Failed, now)?;
        self.error_message = Some(error);
        self.processed_at = Some(now);
        Ok(())
    }

    /// Manual retry: `failed -> pending`, counting exactly one attempt.
    pub fn retry(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(WebhookStatus::RETRYABLE, WebhookStatus::Pending, now)?;
        self.retry_count += 1;
        self.error_message = None;
        self.processed_at = None;
        Ok(())
    }

    /// Cancel before a worker claims the event. Terminal.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(WebhookStatus::CANCELLABLE, WebhookStatus::Cancelled, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ProviderWebhook {
        ProviderWebhook::receive(
            ProviderId::new(),
            Uuid::new_v4(),
            "payment.success".into(),
            serde_json::json!({"data": {}}),
            "sig".into(),
            Some("10.0.0.1".into()),
            serde_json::json!({}),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_happy_path() {
        let now = Utc::now();
        let mut e = event();
        assert_eq!(e.status, WebhookStatus::Pending);
        e.begin_processing(now).unwrap();
        e.complete(now).unwrap();
        assert_eq!(e.status, WebhookStatus::Completed);
        assert!(e.processed_at.is_some());
        assert!(e.status.is_terminal());
    }

    #[test]
    fn test_retry_increments_exactly_once() {
        let now = Utc::now();
        let mut e = event();
        for expected in 1..=3 {
            e.begin_processing(now).unwrap();
            e.fail("boom".into(), now).unwrap();
            e.retry(now).unwrap();
            assert_eq!(e.retry_count, expected);
            assert_eq!(e.status, WebhookStatus::Pending);
            assert!(e.error_message.is_none());
        }
    }

    #[test]
    fn test_retry_only_from_failed() {
        let now = Utc::now();
        let mut e = event();
        assert!(e.retry(now).is_err());
        assert_eq!(e.retry_count, 0);
    }

    #[test]
    fn test_cancelled_never_completes() {
        let now = Utc::now();
        let mut e = event();
        e.cancel(now).unwrap();
        assert!(e.begin_processing(now).is_err());
        assert!(e.claim(now, now).is_err());
        assert!(e.retry(now).is_err());
        assert_eq!(e.status, WebhookStatus::Cancelled);
    }

    #[test]
    fn test_processing_cannot_be_cancelled() {
        let now = Utc::now();
        let mut e = event();
        e.begin_processing(now).unwrap();
        assert!(matches!(
            e.cancel(now),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(e.status, WebhookStatus::Processing);
    }

    #[test]
    fn test_stale_claim_can_be_taken_over() {
        let claimed_at = Utc::now() - chrono::Duration::minutes(10);
        let mut e = event();
        e.begin_processing(claimed_at).unwrap();

        let now = Utc::now();
        assert!(!e.is_claimable(claimed_at));
        assert!(e.claim(now, claimed_at).is_err());

        let stale_before = now - chrono::Duration::minutes(5);
        assert!(e.is_claimable(stale_before));
        e.claim(now, stale_before).unwrap();
        assert_eq!(e.status, WebhookStatus::Processing);
        assert_eq!(e.updated_at, now);
        assert!(!e.is_claimable(stale_before));
    }

    #[test]
    fn test_completed_cannot_be_cancelled() {
        let now = Utc::now();
        let mut e = event();
        e.begin_processing(now).unwrap();
        e.complete(now).unwrap();
        assert!(matches!(
            e.cancel(now),
            Err(DomainError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_blank_event_type_rejected() {
        let result = ProviderWebhook::receive(
            ProviderId::new(),
            Uuid::new_v4(),
            " ".into(),
            serde_json::json!({}),
            String::new(),
            None,
            serde_json::json!({}),
            Utc::now(),
        );
        assert!(result.is_err());
    }
}
