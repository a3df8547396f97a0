//! Repository port traits.
//!
//! One trait per aggregate; `Repository` bundles them for the service.
//! Adapters (Postgres, SQLite, InMemory) implement every trait.
//!
//! State-changing operations on webhooks and transactions are conditional on
//! the current status so concurrent callers cannot both win a transition.

use chrono::{DateTime, Utc};

use crate::domain::{
    ApiKey, ApiKeyId, AuditLog, AuditLogId, BankAccount, BankAccountId, Environment, KycProfile,
    KycProfileId, PaymentMethod, PaymentMethodId, Provider, ProviderId, ProviderKey,
    ProviderKeyId, ProviderWebhook, ProviderWebhookId, SystemConfig, SystemConfigId, Transaction,
    TransactionId, User, UserId,
};
use crate::dto::{
    AccountQuery, AuditQuery, KycQuery, PaymentMethodQuery, ProviderKeyQuery, ProviderQuery,
    SystemConfigQuery, TransactionQuery, TransactionStats, UserQuery, WebhookQuery, WebhookStats,
};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Inserts a user. `Conflict` on duplicate username or email.
    async fn insert_user(&self, user: &User) -> Result<(), RepoError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError>;

    async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>, RepoError>;

    /// Persists changed fields. `NotFound` when the user does not exist.
    async fn update_user(&self, user: &User) -> Result<(), RepoError>;

    async fn count_users(&self) -> Result<i64, RepoError>;
}

#[async_trait::async_trait]
pub trait ApiKeyRepository: Send + Sync + 'static {
    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), RepoError>;

    async fn get_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, RepoError>;

    /// Looks up a key by the SHA-256 hash of its raw value.
    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;

    async fn list_api_keys(&self, user_id: Option<UserId>) -> Result<Vec<ApiKey>, RepoError>;

    async fn update_api_key(&self, key: &ApiKey) -> Result<(), RepoError>;

    async fn touch_api_key(&self, id: ApiKeyId, used_at: DateTime<Utc>) -> Result<(), RepoError>;
}

#[async_trait::async_trait]
pub trait TransactionRepository: Send + Sync + 'static {
    /// Inserts a transaction. `Conflict` on duplicate reference.
    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), RepoError>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError>;

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, RepoError>;

    async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, RepoError>;

    /// Writes the outcome of a pending transaction.
    ///
    /// Only rows still `pending` are updated; `Conflict` if the stored row is
    /// already terminal, `NotFound` if it does not exist.
    async fn finalize_transaction(&self, tx: &Transaction) -> Result<(), RepoError>;

    /// Sets `submitted_at` on a `pending` transaction that has none. Returns
    /// `false` when it is terminal, already claimed, or unknown.
    async fn claim_transaction_submission(
        &self,
        id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepoError>;

    /// Clears the claim of a still `pending` transaction, e.g. when the
    /// provider throttled the call before accepting it.
    async fn release_transaction_submission(&self, id: TransactionId) -> Result<(), RepoError>;

    /// Counts transactions whose `target_system` equals `target`.
    async fn transaction_stats(&self, target: &str) -> Result<TransactionStats, RepoError>;
}

/// A balance change posted together with its ledger transaction.
#[derive(Debug, Clone)]
pub struct AccountMovement {
    pub account: BankAccount,
    pub transaction: Transaction,
}

#[async_trait::async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Inserts an account. `Conflict` on duplicate account number.
    async fn insert_account(&self, account: &BankAccount) -> Result<(), RepoError>;

    async fn get_account(&self, id: BankAccountId) -> Result<Option<BankAccount>, RepoError>;

    async fn list_accounts(&self, query: &AccountQuery) -> Result<Vec<BankAccount>, RepoError>;

    /// Persists descriptive fields and flags; the balance is not touched.
    async fn update_account(&self, account: &BankAccount) -> Result<(), RepoError>;

    /// Atomically stores the new balance and inserts the ledger transaction.
    ///
    /// `expected_balance` is the balance the movement was computed from; a
    /// concurrent change yields `Conflict`.
    async fn post_movement(
        &self,
        movement: &AccountMovement,
        expected_balance: i64,
    ) -> Result<(), RepoError>;

    async fn list_account_transactions(
        &self,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, RepoError>;
}

#[async_trait::async_trait]
pub trait PaymentMethodRepository: Send + Sync + 'static {
    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<(), RepoError>;

    async fn get_payment_method(
        &self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepoError>;

    async fn list_payment_methods(
        &self,
        query: &PaymentMethodQuery,
    ) -> Result<Vec<PaymentMethod>, RepoError>;

    async fn update_payment_method(&self, method: &PaymentMethod) -> Result<(), RepoError>;

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool, RepoError>;

    /// Makes `id` the only default method of `user_id`.
    async fn set_default_payment_method(
        &self,
        user_id: UserId,
        id: PaymentMethodId,
    ) -> Result<(), RepoError>;
}

#[async_trait::async_trait]
pub trait KycRepository: Send + Sync + 'static {
    /// Inserts a profile. `Conflict` if the user already has one or the
    /// mobile number is taken.
    async fn insert_kyc(&self, profile: &KycProfile) -> Result<(), RepoError>;

    async fn get_kyc(&self, id: KycProfileId) -> Result<Option<KycProfile>, RepoError>;

    async fn find_kyc_by_user(&self, user_id: UserId) -> Result<Option<KycProfile>, RepoError>;

    async fn list_kyc(&self, query: &KycQuery) -> Result<Vec<KycProfile>, RepoError>;

    async fn update_kyc(&self, profile: &KycProfile) -> Result<(), RepoError>;
}

#[async_trait::async_trait]
pub trait ProviderRepository: Send + Sync + 'static {
    /// Inserts a provider. `Conflict` on duplicate code.
    async fn insert_provider(&self, provider: &Provider) -> Result<(), RepoError>;

    async fn get_provider(&self, id: ProviderId) -> Result<Option<Provider>, RepoError>;

    async fn find_provider_by_code(&self, code: &str) -> Result<Option<Provider>, RepoError>;

    async fn list_providers(&self, query: &ProviderQuery) -> Result<Vec<Provider>, RepoError>;

    async fn update_provider(&self, provider: &Provider) -> Result<(), RepoError>;

    /// Stores only `status`, `status_message`, `last_check_at` and
    /// `updated_at` of `provider`, leaving concurrent edits to its other
    /// fields in place. `NotFound` for unknown ids.
    async fn record_provider_status(&self, provider: &Provider) -> Result<(), RepoError>;

    /// Removes a provider with its keys and webhook events.
    async fn delete_provider(&self, id: ProviderId) -> Result<bool, RepoError>;
}

#[async_trait::async_trait]
pub trait ProviderKeyRepository: Send + Sync + 'static {
    /// Inserts a key. `Conflict` if the (provider, user, environment) triple exists.
    async fn insert_provider_key(&self, key: &ProviderKey) -> Result<(), RepoError>;

    async fn get_provider_key(&self, id: ProviderKeyId) -> Result<Option<ProviderKey>, RepoError>;

    async fn find_provider_key(
        &self,
        provider_id: ProviderId,
        user_id: UserId,
        environment: Environment,
    ) -> Result<Option<ProviderKey>, RepoError>;

    async fn list_provider_keys(
        &self,
        query: &ProviderKeyQuery,
    ) -> Result<Vec<ProviderKey>, RepoError>;

    async fn update_provider_key(&self, key: &ProviderKey) -> Result<(), RepoError>;

    /// Stores the usage counters of `key` only if the stored key is still
    /// active and its counters still match `seen`. Returns `false` when
    /// another writer changed them first.
    async fn record_provider_key_usage(
        &self,
        seen: &ProviderKey,
        key: &ProviderKey,
    ) -> Result<bool, RepoError>;

    /// Deactivates every active key whose `expires_at` lies before `now`.
    /// Returns how many keys were deactivated.
    async fn deactivate_expired_provider_keys(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError>;

    async fn delete_provider_key(&self, id: ProviderKeyId) -> Result<bool, RepoError>;

    async fn count_active_provider_keys(&self, provider_id: ProviderId) -> Result<i64, RepoError>;
}

#[async_trait::async_trait]
pub trait WebhookRepository: Send + Sync + 'static {
    /// Stores a received event, or returns the already stored event with the
    /// same `(provider_id, event_id)`. The flag is `true` when newly inserted.
    async fn insert_webhook(
        &self,
        event: &ProviderWebhook,
    ) -> Result<(ProviderWebhook, bool), RepoError>;

    async fn get_webhook(&self, id: ProviderWebhookId)
    -> Result<Option<ProviderWebhook>, RepoError>;

    async fn list_webhooks(&self, query: &WebhookQuery) -> Result<Vec<ProviderWebhook>, RepoError>;

    /// Claimable events, oldest first: `pending` ones and `processing` ones
    /// not updated since `stale_before`.
    async fn pending_webhooks(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<ProviderWebhook>, RepoError>;

    /// `pending -> processing`, or a takeover of a `processing` event not
    /// updated since `stale_before`. `None` when another caller holds a live
    /// claim or the event is no longer claimable.
    async fn claim_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<ProviderWebhook>, RepoError>;

    /// `processing -> completed | failed` with the outcome in `event`.
    /// Returns `false` when the event left `processing` meanwhile.
    async fn finish_webhook(&self, event: &ProviderWebhook) -> Result<bool, RepoError>;

    /// `failed -> pending` with `retry_count + 1`. `Conflict` from any other
    /// state, `NotFound` for unknown ids.
    async fn retry_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
    ) -> Result<ProviderWebhook, RepoError>;

    /// `pending -> cancelled`. `Conflict` from any other state.
    async fn cancel_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
    ) -> Result<ProviderWebhook, RepoError>;

    /// Counts per status, optionally for one provider and since an instant.
    async fn webhook_stats(
        &self,
        provider_id: Option<ProviderId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<WebhookStats, RepoError>;
}

/// Append-only: entries are never updated or deleted.
#[async_trait::async_trait]
pub trait AuditLogRepository: Send + Sync + 'static {
    async fn append_audit_log(&self, entry: &AuditLog) -> Result<(), RepoError>;

    async fn get_audit_log(&self, id: AuditLogId) -> Result<Option<AuditLog>, RepoError>;

    /// Newest first.
    async fn list_audit_logs(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, RepoError>;
}

#[async_trait::async_trait]
pub trait SystemConfigRepository: Send + Sync + 'static {
    /// Inserts a config. `Conflict` on duplicate system name.
    async fn insert_system_config(&self, config: &SystemConfig) -> Result<(), RepoError>;

    async fn get_system_config(
        &self,
        id: SystemConfigId,
    ) -> Result<Option<SystemConfig>, RepoError>;

    async fn list_system_configs(
        &self,
        query: &SystemConfigQuery,
    ) -> Result<Vec<SystemConfig>, RepoError>;

    async fn update_system_config(&self, config: &SystemConfig) -> Result<(), RepoError>;

    async fn delete_system_config(&self, id: SystemConfigId) -> Result<bool, RepoError>;
}

/// Everything the application service needs from storage.
#[async_trait::async_trait]
pub trait Repository:
    UserRepository
    + ApiKeyRepository
    + TransactionRepository
    + AccountRepository
    + PaymentMethodRepository
    + KycRepository
    + ProviderRepository
    + ProviderKeyRepository
    + WebhookRepository
    + AuditLogRepository
    + SystemConfigRepository
{
    /// Round-trips to the backing store.
    async fn ping(&self) -> Result<(), RepoError>;
}
