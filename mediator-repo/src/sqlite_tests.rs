//! SQLite repository integration tests.

use chrono::{Duration, Utc};

use mediator_types::{
    AccountMovement, AccountRepository, AccountType, ApiKey, ApiKeyRepository, AuditAction,
    AuditLog, AuditLogRepository, AuditQuery, BankAccount, CurrencyCode, Money, NewTransaction,
    PaymentMethod, PaymentMethodQuery, PaymentMethodRepository, PaymentMethodType,
    ProviderKeyRepository, ProviderRepository, ProviderStatus, RepoError, Repository, Role,
    Transaction, TransactionQuery, TransactionRepository, TransactionStatus, UserQuery,
    UserRepository, WebhookQuery, WebhookRepository, WebhookStatus,
};

use crate::SqlRepo;
use crate::fixtures;
use crate::security::{API_KEY_PREFIX, generate_secret, hash_api_key};

async fn setup_repo() -> SqlRepo {
    SqlRepo::new("sqlite::memory:").await.unwrap()
}

#[tokio::test]
async fn test_ping() {
    let repo = setup_repo().await;
    repo.ping().await.unwrap();
}

#[tokio::test]
async fn test_user_round_trip_and_filters() {
    let repo = setup_repo().await;
    let mut admin = fixtures::user("admin");
    admin.role = Role::Admin;
    let member = fixtures::user("member");
    repo.insert_user(&admin).await.unwrap();
    repo.insert_user(&member).await.unwrap();

    let fetched = repo.get_user(admin.id).await.unwrap().unwrap();
    assert_eq!(fetched.username, "admin");
    assert_eq!(fetched.role, Role::Admin);

    let admins = repo
        .list_users(&UserQuery {
            role: Some(Role::Admin),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(repo.count_users().await.unwrap(), 2);
}

#[tokio::test]
async fn test_duplicate_user_conflicts() {
    let repo = setup_repo().await;
    repo.insert_user(&fixtures::user("alice")).await.unwrap();
    let err = repo.insert_user(&fixtures::user("alice")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_api_key_lookup_by_hash() {
    let repo = setup_repo().await;
    let user = fixtures::user("owner");
    repo.insert_user(&user).await.unwrap();

    let raw = generate_secret(API_KEY_PREFIX);
    let key = ApiKey::new(
        user.id,
        "ci".into(),
        &raw,
        hash_api_key(&raw),
        None,
        Utc::now(),
    );
    repo.insert_api_key(&key).await.unwrap();

    let found = repo
        .find_api_key_by_hash(&hash_api_key(&raw))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, key.id);
    assert!(found.last_used_at.is_none());

    repo.touch_api_key(key.id, Utc::now()).await.unwrap();
    let touched = repo.get_api_key(key.id).await.unwrap().unwrap();
    assert!(touched.last_used_at.is_some());
}

#[tokio::test]
async fn test_transaction_finalize_and_stats() {
    let repo = setup_repo().await;
    let first = fixtures::transaction("REF-1", "esewa");
    let second = fixtures::transaction("REF-2", "esewa");
    repo.insert_transaction(&first).await.unwrap();
    repo.insert_transaction(&second).await.unwrap();

    let err = repo
        .insert_transaction(&fixtures::transaction("REF-1", "esewa"))
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    let mut done = first.clone();
    done.complete(Some(serde_json::json!({"ok": true})), Utc::now())
        .unwrap();
    repo.finalize_transaction(&done).await.unwrap();

    let mut again = first.clone();
    again.fail("late", None, Utc::now()).unwrap();
    assert!(matches!(
        repo.finalize_transaction(&again).await.unwrap_err(),
        RepoError::Conflict(_)
    ));

    let stored = repo
        .find_transaction_by_reference("REF-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Completed);
    assert_eq!(stored.response_payload, Some(serde_json::json!({"ok": true})));

    let stats = repo.transaction_stats("esewa").await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 1);

    let pending = repo
        .list_transactions(&TransactionQuery {
            status: Some(TransactionStatus::Pending),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reference, "REF-2");
}

#[tokio::test]
async fn test_account_movement_is_compare_and_set() {
    let repo = setup_repo().await;
    let user = fixtures::user("saver");
    repo.insert_user(&user).await.unwrap();

    let npr = CurrencyCode::parse("NPR").unwrap();
    let mut account = BankAccount::new(
        user.id,
        "0011223344".into(),
        "Nabil".into(),
        "Saver".into(),
        AccountType::Savings,
        npr.clone(),
        Utc::now(),
    )
    .unwrap();
    repo.insert_account(&account).await.unwrap();

    let amount = Money::positive(500, npr).unwrap();
    account.credit(&amount, Utc::now()).unwrap();
    let deposit = Transaction::new(
        NewTransaction {
            reference: "DEP-1".into(),
            source_system: "internal".into(),
            target_system: account.account_number.clone(),
            transaction_type: "deposit".into(),
            amount: amount.clone(),
            user_id: Some(user.id),
            request_payload: None,
        },
        Utc::now(),
    )
    .unwrap();
    let movement = AccountMovement {
        account: account.clone(),
        transaction: deposit,
    };
    repo.post_movement(&movement, 0).await.unwrap();

    // Replaying with the stale balance must not double-credit.
    let err = repo.post_movement(&movement, 0).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    let stored = repo.get_account(account.id).await.unwrap().unwrap();
    assert_eq!(stored.balance, 500);
    let history = repo
        .list_account_transactions(&account.account_number, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_single_default_payment_method() {
    let repo = setup_repo().await;
    let user = fixtures::user("payer");
    repo.insert_user(&user).await.unwrap();

    let mut ids = Vec::new();
    for name in ["wallet", "bank"] {
        let method = PaymentMethod::new(
            user.id,
            name.into(),
            PaymentMethodType::Wallet,
            "esewa".into(),
            format!("pm_{name}"),
            None,
            None,
            Utc::now(),
        )
        .unwrap();
        repo.insert_payment_method(&method).await.unwrap();
        ids.push(method.id);
    }

    repo.set_default_payment_method(user.id, ids[0]).await.unwrap();
    repo.set_default_payment_method(user.id, ids[1]).await.unwrap();

    let methods = repo
        .list_payment_methods(&PaymentMethodQuery {
            user_id: Some(user.id),
            ..Default::default()
        })
        .await
        .unwrap();
    let defaults: Vec<_> = methods.iter().filter(|m| m.is_default).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0].id, ids[1]);

    let stranger = fixtures::user("stranger");
    let err = repo
        .set_default_payment_method(stranger.id, ids[0])
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn test_provider_round_trip_and_cascade() {
    let repo = setup_repo().await;
    let user = fixtures::user("owner");
    repo.insert_user(&user).await.unwrap();

    let mut provider = fixtures::provider("esewa");
    repo.insert_provider(&provider).await.unwrap();
    assert!(matches!(
        repo.insert_provider(&fixtures::provider("esewa"))
            .await
            .unwrap_err(),
        RepoError::Conflict(_)
    ));

    provider.record_check(true, None, Utc::now());
    repo.update_provider(&provider).await.unwrap();
    let stored = repo.find_provider_by_code("esewa").await.unwrap().unwrap();
    assert_eq!(stored.status, ProviderStatus::Online);
    assert!(stored.last_check_at.is_some());
    assert_eq!(stored.supported_currencies, vec!["NPR".to_string()]);

    let key = fixtures::provider_key(provider.id, user.id);
    repo.insert_provider_key(&key).await.unwrap();
    assert!(matches!(
        repo.insert_provider_key(&fixtures::provider_key(provider.id, user.id))
            .await
            .unwrap_err(),
        RepoError::Conflict(_)
    ));
    assert_eq!(
        repo.count_active_provider_keys(provider.id).await.unwrap(),
        1
    );

    repo.insert_webhook(&fixtures::webhook(provider.id, "payment.success"))
        .await
        .unwrap();

    assert!(repo.delete_provider(provider.id).await.unwrap());
    assert!(repo.get_provider_key(key.id).await.unwrap().is_none());
    let stats = repo.webhook_stats(Some(provider.id), None).await.unwrap();
    assert_eq!(stats.total, 0);
}

#[tokio::test]
async fn test_status_write_leaves_other_columns() {
    let repo = setup_repo().await;
    let provider = fixtures::provider("esewa");
    repo.insert_provider(&provider).await.unwrap();

    let mut rotated = provider.clone();
    rotated.webhook_secret = "whsec_rotated".into();
    repo.update_provider(&rotated).await.unwrap();

    // A check that read the provider before the rotation.
    let mut checked = provider.clone();
    checked.record_check(false, Some("HTTP 503".into()), Utc::now());
    repo.record_provider_status(&checked).await.unwrap();

    let stored = repo.get_provider(provider.id).await.unwrap().unwrap();
    assert_eq!(stored.webhook_secret, "whsec_rotated");
    assert_eq!(stored.status, ProviderStatus::Offline);
    assert_eq!(stored.status_message.as_deref(), Some("HTTP 503"));

    let mut missing = fixtures::provider("khalti");
    missing.record_check(true, None, Utc::now());
    let err = repo.record_provider_status(&missing).await.unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[tokio::test]
async fn test_key_usage_write_is_compare_and_set() {
    let repo = setup_repo().await;
    let user = fixtures::user("owner");
    repo.insert_user(&user).await.unwrap();
    let provider = fixtures::provider("esewa");
    repo.insert_provider(&provider).await.unwrap();
    let key = fixtures::provider_key(provider.id, user.id);
    repo.insert_provider_key(&key).await.unwrap();

    let now = Utc::now();
    let mut first = key.clone();
    first.record_usage(now).unwrap();
    let mut second = key.clone();
    second.record_usage(now).unwrap();
    assert!(repo.record_provider_key_usage(&key, &first).await.unwrap());
    assert!(!repo.record_provider_key_usage(&key, &second).await.unwrap());

    let stored = repo.get_provider_key(key.id).await.unwrap().unwrap();
    assert_eq!(stored.daily_usage, 1);
    assert_eq!(stored.monthly_usage, 1);

    let mut deactivated = stored.clone();
    deactivated.deactivate(now);
    repo.update_provider_key(&deactivated).await.unwrap();
    let mut late = stored.clone();
    late.record_usage(now).unwrap();
    assert!(!repo.record_provider_key_usage(&stored, &late).await.unwrap());
}

#[tokio::test]
async fn test_expired_provider_keys_deactivated() {
    let repo = setup_repo().await;
    let owner = fixtures::user("owner");
    let other = fixtures::user("other");
    repo.insert_user(&owner).await.unwrap();
    repo.insert_user(&other).await.unwrap();
    let provider = fixtures::provider("esewa");
    repo.insert_provider(&provider).await.unwrap();

    let live = fixtures::provider_key(provider.id, owner.id);
    let mut expired = fixtures::provider_key(provider.id, other.id);
    expired.expires_at = Some(Utc::now() - Duration::days(1));
    repo.insert_provider_key(&live).await.unwrap();
    repo.insert_provider_key(&expired).await.unwrap();

    let now = Utc::now();
    assert_eq!(repo.deactivate_expired_provider_keys(now).await.unwrap(), 1);
    assert_eq!(repo.deactivate_expired_provider_keys(now).await.unwrap(), 0);
    assert_eq!(
        repo.count_active_provider_keys(provider.id).await.unwrap(),
        1
    );
    let stored = repo.get_provider_key(expired.id).await.unwrap().unwrap();
    assert!(!stored.is_active);
}

#[tokio::test]
async fn test_transaction_submission_claim() {
    let repo = setup_repo().await;
    let tx = fixtures::transaction("ORD-5", "esewa");
    repo.insert_transaction(&tx).await.unwrap();

    let now = Utc::now();
    assert!(repo.claim_transaction_submission(tx.id, now).await.unwrap());
    assert!(!repo.claim_transaction_submission(tx.id, now).await.unwrap());
    let stored = repo.get_transaction(tx.id).await.unwrap().unwrap();
    assert!(stored.submitted_at.is_some());

    repo.release_transaction_submission(tx.id).await.unwrap();
    assert!(repo.claim_transaction_submission(tx.id, now).await.unwrap());

    let mut done = tx.clone();
    done.complete(None, now).unwrap();
    repo.finalize_transaction(&done).await.unwrap();
    repo.release_transaction_submission(tx.id).await.unwrap();
    assert!(!repo.claim_transaction_submission(tx.id, now).await.unwrap());
}

#[tokio::test]
async fn test_webhook_lifecycle() {
    let repo = setup_repo().await;
    let provider = fixtures::provider("khalti");
    repo.insert_provider(&provider).await.unwrap();

    let event = fixtures::webhook(provider.id, "payment.success");
    let (stored, inserted) = repo.insert_webhook(&event).await.unwrap();
    assert!(inserted);
    assert_eq!(stored.status, WebhookStatus::Pending);

    let mut replay = fixtures::webhook(provider.id, "payment.success");
    replay.event_id = event.event_id;
    let (existing, inserted) = repo.insert_webhook(&replay).await.unwrap();
    assert!(!inserted);
    assert_eq!(existing.id, event.id);

    let now = Utc::now();
    let stale_before = now - Duration::minutes(5);
    let mut claimed = repo
        .claim_webhook(event.id, now, stale_before)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.status, WebhookStatus::Processing);
    assert!(
        repo.claim_webhook(event.id, now, stale_before)
            .await
            .unwrap()
            .is_none()
    );

    claimed.fail("downstream error".into(), now).unwrap();
    assert!(repo.finish_webhook(&claimed).await.unwrap());

    for expected in 1..=2 {
        let retried = repo.retry_webhook(event.id, Utc::now()).await.unwrap();
        assert_eq!(retried.retry_count, expected);
        assert_eq!(retried.status, WebhookStatus::Pending);
        assert!(retried.error_message.is_none());

        let mut again = repo
            .claim_webhook(event.id, now, stale_before)
            .await
            .unwrap()
            .unwrap();
        again.fail("still failing".into(), now).unwrap();
        assert!(repo.finish_webhook(&again).await.unwrap());
    }

    let err = repo
        .cancel_webhook(event.id, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));
}

#[tokio::test]
async fn test_cancel_only_from_pending() {
    let repo = setup_repo().await;
    let provider = fixtures::provider("khalti");
    repo.insert_provider(&provider).await.unwrap();
    let claimed_event = fixtures::webhook(provider.id, "payment.success");
    let queued_event = fixtures::webhook(provider.id, "payment.success");
    repo.insert_webhook(&claimed_event).await.unwrap();
    repo.insert_webhook(&queued_event).await.unwrap();

    let now = Utc::now();
    let stale_before = now - Duration::minutes(5);
    let mut claimed = repo
        .claim_webhook(claimed_event.id, now, stale_before)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        repo.cancel_webhook(claimed_event.id, now).await.unwrap_err(),
        RepoError::Conflict(_)
    ));
    claimed.complete(now).unwrap();
    assert!(repo.finish_webhook(&claimed).await.unwrap());

    let cancelled = repo.cancel_webhook(queued_event.id, now).await.unwrap();
    assert_eq!(cancelled.status, WebhookStatus::Cancelled);
    assert!(
        repo.claim_webhook(queued_event.id, now, stale_before)
            .await
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        repo.retry_webhook(queued_event.id, now).await.unwrap_err(),
        RepoError::Conflict(_)
    ));
}

#[tokio::test]
async fn test_stale_claim_is_taken_over() {
    let repo = setup_repo().await;
    let provider = fixtures::provider("khalti");
    repo.insert_provider(&provider).await.unwrap();

    let mut stuck = fixtures::webhook(provider.id, "payment.success");
    stuck.status = WebhookStatus::Processing;
    stuck.updated_at = Utc::now() - Duration::minutes(30);
    repo.insert_webhook(&stuck).await.unwrap();
    let mut busy = fixtures::webhook(provider.id, "payment.success");
    busy.status = WebhookStatus::Processing;
    repo.insert_webhook(&busy).await.unwrap();

    let now = Utc::now();
    let stale_before = now - Duration::minutes(5);
    let swept = repo.pending_webhooks(10, stale_before).await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].id, stuck.id);

    let mut reclaimed = repo
        .claim_webhook(stuck.id, now, stale_before)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.status, WebhookStatus::Processing);
    assert!(
        repo.claim_webhook(busy.id, now, stale_before)
            .await
            .unwrap()
            .is_none()
    );

    reclaimed.complete(now).unwrap();
    assert!(repo.finish_webhook(&reclaimed).await.unwrap());
    assert!(repo.pending_webhooks(10, stale_before).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_listing_and_stats_window() {
    let repo = setup_repo().await;
    let provider = fixtures::provider("esewa");
    repo.insert_provider(&provider).await.unwrap();

    let mut old = fixtures::webhook(provider.id, "kyc.verified");
    old.created_at = Utc::now() - Duration::days(3);
    old.updated_at = old.created_at;
    repo.insert_webhook(&old).await.unwrap();
    repo.insert_webhook(&fixtures::webhook(provider.id, "payment.success"))
        .await
        .unwrap();

    let recent = repo
        .webhook_stats(Some(provider.id), Some(Utc::now() - Duration::hours(24)))
        .await
        .unwrap();
    assert_eq!(recent.total, 1);
    assert_eq!(recent.pending, 1);

    let kyc_events = repo
        .list_webhooks(&WebhookQuery {
            event_type: Some("kyc.verified".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(kyc_events.len(), 1);

    let pending = repo
        .pending_webhooks(10, Utc::now() - Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].id, old.id);
}

#[tokio::test]
async fn test_audit_log_filters() {
    let repo = setup_repo().await;
    let actor = fixtures::user("auditor");
    repo.insert_user(&actor).await.unwrap();

    for action in [AuditAction::Create, AuditAction::Update, AuditAction::Create] {
        let entry = AuditLog::record(
            action,
            "provider",
            "abc",
            Some(actor.id),
            None,
            serde_json::json!({}),
            Utc::now(),
        );
        repo.append_audit_log(&entry).await.unwrap();
    }

    let creates = repo
        .list_audit_logs(&AuditQuery {
            action: Some(AuditAction::Create),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(creates.len(), 2);

    let limited = repo
        .list_audit_logs(&AuditQuery {
            actor_id: Some(actor.id),
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    let fetched = repo.get_audit_log(limited[0].id).await.unwrap().unwrap();
    assert_eq!(fetched.resource_id, "abc");
}
