//! Service tests over the in-memory repository and a scripted gateway.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use mediator_repo::security::sign_payload;
use mediator_repo::{CredentialCipher, InMemoryRepo, MemoryCounterStore};
use mediator_types::{
    AccountType, AppError, AuditAction, AuditQuery, BootstrapRequest, CreateAccountRequest,
    CreateProviderKeyRequest, CreateProviderRequest, CreateTransactionRequest, CreateUserRequest,
    CurrencyCode, Environment, ForwardResponse, GatewayError, HealthStatus, MovementRequest,
    ProbeOutcome, Provider, ProviderEndpoint, ProviderGateway, ProviderKeyQuery,
    ProviderKeyRepository, ProviderStatus, ProviderType, ProviderWebhook, Repository, Role,
    Transaction, TransactionStatus, UserQuery, WebhookRepository, WebhookStatus,
};
use serde_json::{Value, json};

use crate::worker::{WebhookReceiver, webhook_queue};
use crate::{Caller, MediatorService, ServiceSettings, WebhookDelivery};

// ─────────────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct StubState {
    status_check: Mutex<ProbeOutcome>,
    forward: Mutex<Result<ForwardResponse, GatewayError>>,
    forwarded: Mutex<Vec<(String, Value)>>,
    /// Added before every status check and forward answer.
    delay: Mutex<Duration>,
}

/// Gateway whose answers are set by the test. Clones share state.
#[derive(Debug, Clone)]
struct StubGateway(Arc<StubState>);

impl Default for StubGateway {
    fn default() -> Self {
        Self(Arc::new(StubState {
            status_check: Mutex::new(ProbeOutcome {
                healthy: true,
                http_status: Some(200),
                latency: Duration::from_millis(5),
                error: None,
            }),
            forward: Mutex::new(Ok(ForwardResponse {
                http_status: 200,
                body: json!({"status": "accepted"}),
            })),
            forwarded: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
        }))
    }
}

impl StubGateway {
    fn set_status_check(&self, outcome: ProbeOutcome) {
        *self.0.status_check.lock().unwrap() = outcome;
    }

    fn set_forward(&self, result: Result<ForwardResponse, GatewayError>) {
        *self.0.forward.lock().unwrap() = result;
    }

    fn forwarded(&self) -> Vec<(String, Value)> {
        self.0.forwarded.lock().unwrap().clone()
    }

    fn set_delay(&self, delay: Duration) {
        *self.0.delay.lock().unwrap() = delay;
    }

    async fn pause(&self) {
        let delay = *self.0.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl ProviderGateway for StubGateway {
    async fn probe(&self, _endpoint: &ProviderEndpoint) -> ProbeOutcome {
        self.pause().await;
        self.0.status_check.lock().unwrap().clone()
    }

    async fn forward(
        &self,
        endpoint: &ProviderEndpoint,
        payload: &Value,
        _idempotency_key: &str,
    ) -> Result<ForwardResponse, GatewayError> {
        self.0
            .forwarded
            .lock()
            .unwrap()
            .push((endpoint.url.clone(), payload.clone()));
        self.pause().await;
        self.0.forward.lock().unwrap().clone()
    }
}

struct Harness {
    service: MediatorService<InMemoryRepo, StubGateway>,
    gateway: StubGateway,
    receiver: WebhookReceiver,
    admin: Caller,
    admin_key: String,
}

async fn harness() -> Harness {
    let gateway = StubGateway::default();
    let (queue, receiver) = webhook_queue(16);
    let service = MediatorService::new(
        InMemoryRepo::new(),
        gateway.clone(),
        Arc::new(MemoryCounterStore::new()),
        CredentialCipher::ephemeral(),
        queue,
        ServiceSettings::default(),
    );

    let boot = service
        .bootstrap(
            BootstrapRequest {
                username: "admin".into(),
                email: "ops@example.com".into(),
            },
            Some("10.0.0.1".into()),
        )
        .await
        .unwrap();
    let admin_user = service.authenticate(&boot.api_key).await.unwrap();

    Harness {
        service,
        gateway,
        receiver,
        admin: Caller::new(admin_user, Some("10.0.0.1".into())),
        admin_key: boot.api_key,
    }
}

impl Harness {
    async fn user(&self, username: &str) -> Caller {
        let user = self
            .service
            .create_user(
                &self.admin,
                CreateUserRequest {
                    username: username.into(),
                    email: format!("{}@example.com", username),
                    role: None,
                },
            )
            .await
            .unwrap();
        Caller::new(user, None)
    }

    /// Registers an NPR payment provider and returns it with its webhook secret.
    async fn provider(&self, code: &str) -> (Provider, String) {
        let created = self
            .service
            .create_provider(
                &self.admin,
                CreateProviderRequest {
                    name: format!("Provider {}", code),
                    code: code.into(),
                    provider_type: ProviderType::Payment,
                    supported_currencies: vec!["NPR".into()],
                    supported_countries: vec!["NP".into()],
                    base_url: "https://pay.example".into(),
                    status_path: None,
                    submit_path: None,
                    auth_type: None,
                    rate_limit: None,
                    is_active: None,
                    credentials: None,
                },
            )
            .await
            .unwrap();
        (created.provider, created.webhook_secret)
    }

    async fn transaction(&self, caller: &Caller, reference: &str, target: &str) -> Transaction {
        self.service
            .create_transaction(
                caller,
                CreateTransactionRequest {
                    reference: reference.into(),
                    source_system: "core-banking".into(),
                    target_system: target.into(),
                    transaction_type: "payment".into(),
                    amount: 150_000,
                    currency: npr(),
                    request_payload: Some(json!({"customer": "alice"})),
                },
            )
            .await
            .unwrap()
    }

    async fn deliver(
        &self,
        code: &str,
        secret: &str,
        body: Value,
    ) -> Result<(ProviderWebhook, bool), AppError> {
        let raw = serde_json::to_vec(&body).unwrap();
        let signature = sign_payload(&raw, secret);
        self.service
            .receive_webhook(code, delivery(raw, Some(signature)))
            .await
    }
}

fn npr() -> CurrencyCode {
    CurrencyCode::parse("NPR").unwrap()
}

fn delivery(body: Vec<u8>, signature: Option<String>) -> WebhookDelivery {
    WebhookDelivery {
        body,
        signature,
        ip_address: Some("203.0.113.7".into()),
        headers: json!({"content-type": "application/json"}),
    }
}

fn movement(amount: i64) -> MovementRequest {
    MovementRequest {
        amount,
        currency: npr(),
        reference: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users and authentication
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bootstrap_only_once() {
    let h = harness().await;
    assert_eq!(h.admin.user.role, Role::Admin);

    let again = h
        .service
        .bootstrap(
            BootstrapRequest {
                username: "second".into(),
                email: "second@example.com".into(),
            },
            None,
        )
        .await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_authenticate_rejects_unknown_key() {
    let h = harness().await;
    assert!(h.service.authenticate(&h.admin_key).await.is_ok());

    let result = h.service.authenticate("mk_not-a-real-key").await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn test_user_listing_requires_admin() {
    let h = harness().await;
    let alice = h.user("alice").await;

    let result = h.service.list_users(&alice, UserQuery::default()).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let users = h
        .service
        .list_users(&h.admin, UserQuery::default())
        .await
        .unwrap();
    assert_eq!(users.len(), 2);
}

#[tokio::test]
async fn test_other_users_records_are_not_found() {
    let h = harness().await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;

    let tx = h.transaction(&alice, "ORD-1", "esewa").await;
    assert!(h.service.get_transaction(&alice, tx.id).await.is_ok());
    assert!(h.service.get_transaction(&h.admin, tx.id).await.is_ok());

    let result = h.service.get_transaction(&bob, tx.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_deposit_withdraw_and_statement() {
    let h = harness().await;
    let alice = h.user("alice").await;
    let account = h
        .service
        .create_account(
            &alice,
            CreateAccountRequest {
                account_number: "0012345678".into(),
                bank_name: "Nabil Bank".into(),
                holder_name: "Alice Sharma".into(),
                account_type: AccountType::Savings,
                currency: npr(),
                user_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(account.balance, 0);

    let deposited = h
        .service
        .deposit(&alice, account.id, movement(5_000))
        .await
        .unwrap();
    assert_eq!(deposited.balance, 5_000);
    assert_eq!(deposited.transaction.status, TransactionStatus::Completed);

    let withdrawn = h
        .service
        .withdraw(&alice, account.id, movement(2_000))
        .await
        .unwrap();
    assert_eq!(withdrawn.balance, 3_000);

    let overdraw = h
        .service
        .withdraw(&alice, account.id, movement(10_000))
        .await;
    assert!(matches!(
        overdraw,
        Err(AppError::InsufficientFunds {
            available: 3_000,
            requested: 10_000
        })
    ));

    let statement = h
        .service
        .statement(&alice, account.id, None)
        .await
        .unwrap();
    assert_eq!(statement.account.balance, 3_000);
    assert_eq!(statement.transactions.len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook intake and processing
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_signed_webhook_is_stored_and_queued() {
    let mut h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let event_id = uuid::Uuid::new_v4();

    let (event, created) = h
        .deliver(
            "esewa",
            &secret,
            json!({"event_type": "payment.refund", "event_id": event_id, "data": {}}),
        )
        .await
        .unwrap();
    assert!(created);
    assert_eq!(event.status, WebhookStatus::Pending);
    assert_eq!(event.event_id, event_id);
    assert_eq!(event.ip_address.as_deref(), Some("203.0.113.7"));

    let queued = h.receiver.try_recv().unwrap();
    assert_eq!(queued, event.id);
}

#[tokio::test]
async fn test_duplicate_event_id_returns_existing_event() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let body = json!({
        "event_type": "payment.refund",
        "event_id": uuid::Uuid::new_v4(),
        "data": {}
    });

    let (first, created) = h.deliver("esewa", &secret, body.clone()).await.unwrap();
    assert!(created);
    let (second, created) = h.deliver("esewa", &secret, body).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn test_webhook_signature_is_enforced() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let raw = serde_json::to_vec(&json!({"event_type": "payment.refund"})).unwrap();

    let missing = h
        .service
        .receive_webhook("esewa", delivery(raw.clone(), None))
        .await;
    assert!(matches!(missing, Err(AppError::Unauthorized(_))));

    let wrong = sign_payload(&raw, "whsec_someone-else");
    let invalid = h
        .service
        .receive_webhook("esewa", delivery(raw.clone(), Some(wrong)))
        .await;
    assert!(matches!(invalid, Err(AppError::Unauthorized(_))));

    let prefixed = format!("sha256={}", sign_payload(&raw, &secret));
    assert!(
        h.service
            .receive_webhook("esewa", delivery(raw, Some(prefixed)))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_webhook_for_unknown_provider_is_not_found() {
    let h = harness().await;
    let result = h
        .deliver("nobody", "whsec_x", json!({"event_type": "payment.refund"}))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_webhook_without_event_type_is_rejected() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let result = h.deliver("esewa", &secret, json!({"data": {}})).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_payment_success_completes_referenced_transaction() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let alice = h.user("alice").await;
    let tx = h.transaction(&alice, "ORD-42", "esewa").await;

    let (event, _) = h
        .deliver(
            "esewa",
            &secret,
            json!({"event_type": "payment.success", "data": {"reference": "ORD-42"}}),
        )
        .await
        .unwrap();

    let status = h.service.process_webhook(event.id).await.unwrap();
    assert_eq!(status, Some(WebhookStatus::Completed));

    let tx = h.service.get_transaction(&alice, tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);

    // Already finished events are not processed twice.
    assert_eq!(h.service.process_webhook(event.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_unsupported_event_fails_and_can_be_retried() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let (event, _) = h
        .deliver("esewa", &secret, json!({"event_type": "mystery.event"}))
        .await
        .unwrap();

    let status = h.service.process_webhook(event.id).await.unwrap();
    assert_eq!(status, Some(WebhookStatus::Failed));
    let failed = h.service.get_webhook(&h.admin, event.id).await.unwrap();
    assert_eq!(failed.error_message.as_deref(), Some("unsupported event type"));

    let retried = h.service.retry_webhook(&h.admin, event.id).await.unwrap();
    assert_eq!(retried.status, WebhookStatus::Pending);
    assert_eq!(retried.retry_count, failed.retry_count + 1);

    let again = h.service.retry_webhook(&h.admin, event.id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_cancelled_event_is_not_processed() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let (event, _) = h
        .deliver("esewa", &secret, json!({"event_type": "payment.refund"}))
        .await
        .unwrap();

    let cancelled = h.service.cancel_webhook(&h.admin, event.id).await.unwrap();
    assert_eq!(cancelled.status, WebhookStatus::Cancelled);
    assert_eq!(h.service.process_webhook(event.id).await.unwrap(), None);
    assert_eq!(h.service.sweep_pending_webhooks().await.unwrap(), 0);
}

#[tokio::test]
async fn test_claimed_event_cannot_be_cancelled() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let (event, _) = h
        .deliver("esewa", &secret, json!({"event_type": "payment.refund"}))
        .await
        .unwrap();

    let now = Utc::now();
    h.service
        .repo()
        .claim_webhook(event.id, now, now - chrono::Duration::minutes(5))
        .await
        .unwrap()
        .unwrap();

    let result = h.service.cancel_webhook(&h.admin, event.id).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    // A live claim is left to its worker.
    assert_eq!(h.service.process_webhook(event.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_abandoned_claim_is_processed_after_lease() {
    let h = harness().await;
    let (_, secret) = h.provider("esewa").await;
    let alice = h.user("alice").await;
    let tx = h.transaction(&alice, "ORD-43", "esewa").await;
    let (event, _) = h
        .deliver(
            "esewa",
            &secret,
            json!({"event_type": "payment.success", "data": {"reference": "ORD-43"}}),
        )
        .await
        .unwrap();

    // Claimed by a worker that died long before the lease ran out.
    let claimed_at = Utc::now() - chrono::Duration::hours(1);
    h.service
        .repo()
        .claim_webhook(event.id, claimed_at, claimed_at - chrono::Duration::minutes(5))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.service.sweep_pending_webhooks().await.unwrap(), 1);
    let stored = h.service.get_webhook(&h.admin, event.id).await.unwrap();
    assert_eq!(stored.status, WebhookStatus::Completed);
    let tx = h.service.get_transaction(&alice, tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_webhook_administration_requires_admin() {
    let h = harness().await;
    let alice = h.user("alice").await;
    let result = h.service.webhook_summary(&alice).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert!(h.service.webhook_summary(&h.admin).await.is_ok());
}

// ─────────────────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_check_status_records_outcome() {
    let h = harness().await;
    let (provider, _) = h.provider("esewa").await;
    assert_eq!(provider.status, ProviderStatus::Offline);

    let online = h.service.check_status(&h.admin, provider.id).await.unwrap();
    assert_eq!(online.status, ProviderStatus::Online);
    assert!(online.is_healthy);
    assert_eq!(online.http_status, Some(200));

    h.gateway.set_status_check(ProbeOutcome {
        healthy: false,
        http_status: Some(500),
        latency: Duration::from_millis(12),
        error: Some("HTTP 500".into()),
    });
    let offline = h.service.check_status(&h.admin, provider.id).await.unwrap();
    assert_eq!(offline.status, ProviderStatus::Offline);

    let stored = h.service.get_provider(provider.id).await.unwrap();
    assert_eq!(stored.status, ProviderStatus::Offline);
    assert_eq!(stored.status_message.as_deref(), Some("HTTP 500"));
    assert!(stored.last_check_at.is_some());
}

#[tokio::test]
async fn test_status_check_keeps_secret_rotated_meanwhile() {
    let h = harness().await;
    let (provider, original) = h.provider("esewa").await;
    h.gateway.set_delay(Duration::from_millis(100));

    let (checked, rotated) = tokio::join!(
        h.service.check_status(&h.admin, provider.id),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.service.rotate_webhook_secret(&h.admin, provider.id).await
        }
    );
    let rotated = rotated.unwrap();
    assert_eq!(checked.unwrap().status, ProviderStatus::Online);
    assert_ne!(rotated.webhook_secret, original);

    let stored = h.service.get_provider(provider.id).await.unwrap();
    assert_eq!(stored.webhook_secret, rotated.webhook_secret);
    assert_eq!(stored.status, ProviderStatus::Online);
}

#[tokio::test]
async fn test_monitor_sweep_audits_status_transitions() {
    let h = harness().await;
    let (provider, _) = h.provider("esewa").await;
    let query = AuditQuery {
        action: Some(AuditAction::StatusChange),
        resource_type: Some("provider".into()),
        ..Default::default()
    };

    let results = h.service.check_all_providers().await.unwrap();
    assert_eq!(results.len(), 1);
    let logs = h.service.list_audit_logs(&h.admin, query.clone()).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].resource_id, provider.id.to_string());
    assert_eq!(logs[0].actor_id, None);
    assert_eq!(logs[0].details["from"], "offline");
    assert_eq!(logs[0].details["to"], "online");
    assert_eq!(logs[0].details["source"], "monitor");

    // No transition, nothing new to report.
    h.service.check_all_providers().await.unwrap();
    let logs = h.service.list_audit_logs(&h.admin, query).await.unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn test_expired_provider_keys_are_deactivated() {
    let h = harness().await;
    let (alice, _) = submittable(&h).await;
    let keys = h
        .service
        .list_provider_keys(&alice, ProviderKeyQuery::default())
        .await
        .unwrap();
    assert_eq!(keys.len(), 1);

    let mut expired = keys[0].clone();
    expired.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
    h.service.repo().update_provider_key(&expired).await.unwrap();

    assert_eq!(h.service.cleanup_expired_provider_keys().await.unwrap(), 1);
    assert_eq!(h.service.cleanup_expired_provider_keys().await.unwrap(), 0);
    let stored = h.service.get_provider_key(&alice, expired.id).await.unwrap();
    assert!(!stored.is_active);
}

async fn submittable(h: &Harness) -> (Caller, Transaction) {
    let (provider, _) = h.provider("esewa").await;
    let alice = h.user("alice").await;
    h.service
        .create_provider_key(
            &alice,
            CreateProviderKeyRequest {
                provider_id: provider.id,
                environment: Environment::Sandbox,
                daily_limit: None,
                monthly_limit: None,
                expires_at: None,
                user_id: None,
            },
        )
        .await
        .unwrap();
    let tx = h.transaction(&alice, "ORD-7", "esewa").await;
    (alice, tx)
}

#[tokio::test]
async fn test_submit_requires_provider_key() {
    let h = harness().await;
    h.provider("esewa").await;
    let bob = h.user("bob").await;
    let tx = h.transaction(&bob, "ORD-9", "esewa").await;

    let result = h.service.submit_transaction(&bob, tx.id).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert!(h.gateway.forwarded().is_empty());
}

#[tokio::test]
async fn test_submit_completes_on_success() {
    let h = harness().await;
    let (alice, tx) = submittable(&h).await;

    let submitted = h.service.submit_transaction(&alice, tx.id).await.unwrap();
    assert_eq!(submitted.status, TransactionStatus::Completed);
    assert_eq!(submitted.response_payload, Some(json!({"status": "accepted"})));

    let forwarded = h.gateway.forwarded();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].0, "https://pay.example/transactions");
    assert_eq!(forwarded[0].1["reference"], "ORD-7");

    let again = h.service.submit_transaction(&alice, tx.id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_submit_fails_on_provider_error_status() {
    let h = harness().await;
    let (alice, tx) = submittable(&h).await;
    h.gateway.set_forward(Ok(ForwardResponse {
        http_status: 500,
        body: json!({"error": "boom"}),
    }));

    let submitted = h.service.submit_transaction(&alice, tx.id).await.unwrap();
    assert_eq!(submitted.status, TransactionStatus::Failed);
    assert_eq!(
        submitted.error_message.as_deref(),
        Some("Provider responded with HTTP 500")
    );
}

#[tokio::test]
async fn test_submit_throttled_leaves_transaction_pending() {
    let h = harness().await;
    let (alice, tx) = submittable(&h).await;
    h.gateway.set_forward(Err(GatewayError::Throttled {
        provider: "esewa".into(),
    }));

    let result = h.service.submit_transaction(&alice, tx.id).await;
    assert!(matches!(result, Err(AppError::RateLimited(_))));

    let stored = h.service.get_transaction(&alice, tx.id).await.unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);
    assert_eq!(stored.submitted_at, None);

    h.gateway.set_forward(Ok(ForwardResponse {
        http_status: 200,
        body: json!({"status": "accepted"}),
    }));
    let resubmitted = h.service.submit_transaction(&alice, tx.id).await.unwrap();
    assert_eq!(resubmitted.status, TransactionStatus::Completed);
    assert_eq!(h.gateway.forwarded().len(), 2);
}

#[tokio::test]
async fn test_concurrent_submits_forward_once() {
    let h = harness().await;
    let (alice, tx) = submittable(&h).await;
    h.gateway.set_delay(Duration::from_millis(100));

    let (first, second) = tokio::join!(
        h.service.submit_transaction(&alice, tx.id),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.service.submit_transaction(&alice, tx.id).await
        }
    );
    assert_eq!(first.unwrap().status, TransactionStatus::Completed);
    assert!(matches!(second, Err(AppError::Conflict(_))));
    assert_eq!(h.gateway.forwarded().len(), 1);

    let keys = h
        .service
        .list_provider_keys(&alice, ProviderKeyQuery::default())
        .await
        .unwrap();
    assert_eq!(keys[0].daily_usage, 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_queue_health_follows_worker_heartbeat() {
    let h = harness().await;
    let before = h.service.queue_health().await;
    assert_eq!(before.status, HealthStatus::Unhealthy);

    h.receiver.heartbeat().beat(Utc::now());
    let after = h.service.queue_health().await;
    assert_eq!(after.status, HealthStatus::Healthy);
    assert_eq!(after.details.unwrap()["pending"], 0);

    let report = h.service.health().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(h.service.repo().ping().await.is_ok());
}
