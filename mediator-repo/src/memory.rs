//! In-memory repository adapter.
//!
//! Backs the `memory://` development mode and the service tests. All state
//! sits behind one mutex so uniqueness checks and conditional transitions are
//! atomic, matching the guarantees of the SQL adapter.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mediator_types::{
    AccountMovement, AccountQuery, AccountRepository, ApiKey, ApiKeyId, ApiKeyRepository,
    AuditLog, AuditLogId, AuditLogRepository, AuditQuery, BankAccount, BankAccountId,
    Environment, KycProfile, KycProfileId, KycQuery, KycRepository, PaymentMethod,
    PaymentMethodId, PaymentMethodQuery, PaymentMethodRepository, Provider, ProviderId,
    ProviderKey, ProviderKeyId, ProviderKeyQuery, ProviderKeyRepository, ProviderQuery,
    ProviderRepository, ProviderWebhook, ProviderWebhookId, RepoError, Repository, SystemConfig,
    SystemConfigId, SystemConfigQuery, SystemConfigRepository, Transaction, TransactionId,
    TransactionQuery, TransactionRepository, TransactionStats, TransactionStatus, User, UserId,
    UserQuery, UserRepository, WebhookQuery, WebhookRepository, WebhookStats, WebhookStatus,
    effective_limit,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    api_keys: HashMap<ApiKeyId, ApiKey>,
    transactions: HashMap<TransactionId, Transaction>,
    accounts: HashMap<BankAccountId, BankAccount>,
    payment_methods: HashMap<PaymentMethodId, PaymentMethod>,
    kyc: HashMap<KycProfileId, KycProfile>,
    providers: HashMap<ProviderId, Provider>,
    provider_keys: HashMap<ProviderKeyId, ProviderKey>,
    webhooks: HashMap<ProviderWebhookId, ProviderWebhook>,
    audit_logs: Vec<AuditLog>,
    system_configs: HashMap<SystemConfigId, SystemConfig>,
}

/// Process-local repository. Data is lost on restart.
#[derive(Default)]
pub struct InMemoryRepo {
    state: Mutex<State>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, RepoError> {
        self.state
            .lock()
            .map_err(|_| RepoError::Database("in-memory state lock poisoned".into()))
    }
}

/// Clones matching items, newest first, capped at `limit`.
fn newest_first<'a, T, I, F>(items: I, created_at: F, limit: Option<i64>) -> Vec<T>
where
    T: Clone + 'a,
    I: Iterator<Item = &'a T>,
    F: Fn(&T) -> DateTime<Utc>,
{
    let mut out: Vec<T> = items.cloned().collect();
    out.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    if let Some(limit) = limit {
        out.truncate(usize::try_from(limit).unwrap_or(0));
    }
    out
}

fn filter_eq<T: PartialEq>(filter: &Option<T>, value: &T) -> bool {
    filter.as_ref().is_none_or(|f| f == value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Users and API keys
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl UserRepository for InMemoryRepo {
    async fn insert_user(&self, user: &User) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state
            .users
            .values()
            .any(|u| u.username == user.username || u.email == user.email)
        {
            return Err(RepoError::Conflict(
                "A user with this username or email already exists".into(),
            ));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, RepoError> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>, RepoError> {
        let state = self.state()?;
        let items = state
            .users
            .values()
            .filter(|u| filter_eq(&query.role, &u.role) && filter_eq(&query.is_active, &u.is_active));
        Ok(newest_first(items, |u| u.created_at, None))
    }

    async fn update_user(&self, user: &User) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(RepoError::Conflict("Email is already in use".into()));
        }
        let stored = state.users.get_mut(&user.id).ok_or(RepoError::NotFound)?;
        *stored = user.clone();
        Ok(())
    }

    async fn count_users(&self) -> Result<i64, RepoError> {
        Ok(self.state()?.users.len() as i64)
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryRepo {
    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state.api_keys.values().any(|k| k.key_hash == key.key_hash) {
            return Err(RepoError::Conflict("API key already exists".into()));
        }
        state.api_keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn get_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, RepoError> {
        Ok(self.state()?.api_keys.get(&id).cloned())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        Ok(self
            .state()?
            .api_keys
            .values()
            .find(|k| k.key_hash == key_hash)
            .cloned())
    }

    async fn list_api_keys(&self, user_id: Option<UserId>) -> Result<Vec<ApiKey>, RepoError> {
        let state = self.state()?;
        let items = state
            .api_keys
            .values()
            .filter(|k| filter_eq(&user_id, &k.user_id));
        Ok(newest_first(items, |k| k.created_at, None))
    }

    async fn update_api_key(&self, key: &ApiKey) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state.api_keys.get_mut(&key.id).ok_or(RepoError::NotFound)?;
        *stored = key.clone();
        Ok(())
    }

    async fn touch_api_key(&self, id: ApiKeyId, used_at: DateTime<Utc>) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state.api_keys.get_mut(&id).ok_or(RepoError::NotFound)?;
        stored.last_used_at = Some(used_at);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions and accounts
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl TransactionRepository for InMemoryRepo {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state
            .transactions
            .values()
            .any(|t| t.reference == tx.reference)
        {
            return Err(RepoError::Conflict(format!(
                "Transaction reference {} already exists",
                tx.reference
            )));
        }
        state.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        Ok(self.state()?.transactions.get(&id).cloned())
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        Ok(self
            .state()?
            .transactions
            .values()
            .find(|t| t.reference == reference)
            .cloned())
    }

    async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, RepoError> {
        let state = self.state()?;
        let items = state.transactions.values().filter(|t| {
            filter_eq(&query.status, &t.status)
                && filter_eq(&query.source_system, &t.source_system)
                && filter_eq(&query.target_system, &t.target_system)
                && filter_eq(&query.transaction_type, &t.transaction_type)
                && query.user_id.is_none_or(|u| t.user_id == Some(u))
        });
        Ok(newest_first(
            items,
            |t| t.created_at,
            Some(effective_limit(query.limit)),
        ))
    }

    async fn finalize_transaction(&self, tx: &Transaction) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state
            .transactions
            .get_mut(&tx.id)
            .ok_or(RepoError::NotFound)?;
        if stored.status != TransactionStatus::Pending {
            return Err(RepoError::Conflict(format!(
                "Transaction {} is already {}",
                tx.id, stored.status
            )));
        }
        stored.status = tx.status;
        stored.response_payload = tx.response_payload.clone();
        stored.error_message = tx.error_message.clone();
        stored.updated_at = tx.updated_at;
        Ok(())
    }

    async fn claim_transaction_submission(
        &self,
        id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepoError> {
        let mut state = self.state()?;
        match state.transactions.get_mut(&id) {
            Some(stored)
                if stored.status == TransactionStatus::Pending && stored.submitted_at.is_none() =>
            {
                stored.submitted_at = Some(now);
                stored.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_transaction_submission(&self, id: TransactionId) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if let Some(stored) = state
            .transactions
            .get_mut(&id)
            .filter(|t| t.status == TransactionStatus::Pending)
        {
            stored.submitted_at = None;
        }
        Ok(())
    }

    async fn transaction_stats(&self, target: &str) -> Result<TransactionStats, RepoError> {
        let state = self.state()?;
        let mut stats = TransactionStats::default();
        for tx in state
            .transactions
            .values()
            .filter(|t| t.target_system == target)
        {
            stats.total += 1;
            match tx.status {
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::Completed => stats.completed += 1,
                TransactionStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl AccountRepository for InMemoryRepo {
    async fn insert_account(&self, account: &BankAccount) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state
            .accounts
            .values()
            .any(|a| a.account_number == account.account_number)
        {
            return Err(RepoError::Conflict(format!(
                "Account number {} already exists",
                account.account_number
            )));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: BankAccountId) -> Result<Option<BankAccount>, RepoError> {
        Ok(self.state()?.accounts.get(&id).cloned())
    }

    async fn list_accounts(&self, query: &AccountQuery) -> Result<Vec<BankAccount>, RepoError> {
        let state = self.state()?;
        let items = state.accounts.values().filter(|a| {
            filter_eq(&query.user_id, &a.user_id) && filter_eq(&query.is_active, &a.is_active)
        });
        Ok(newest_first(items, |a| a.created_at, None))
    }

    async fn update_account(&self, account: &BankAccount) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state
            .accounts
            .get_mut(&account.id)
            .ok_or(RepoError::NotFound)?;
        let balance = stored.balance;
        *stored = account.clone();
        stored.balance = balance;
        Ok(())
    }

    async fn post_movement(
        &self,
        movement: &AccountMovement,
        expected_balance: i64,
    ) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let account = &movement.account;
        let tx = &movement.transaction;

        let stored = state.accounts.get(&account.id).ok_or(RepoError::NotFound)?;
        if stored.balance != expected_balance {
            return Err(RepoError::Conflict(
                "Account balance changed concurrently".into(),
            ));
        }
        if state
            .transactions
            .values()
            .any(|t| t.reference == tx.reference)
        {
            return Err(RepoError::Conflict(format!(
                "Transaction reference {} already exists",
                tx.reference
            )));
        }

        if let Some(stored) = state.accounts.get_mut(&account.id) {
            stored.balance = account.balance;
            stored.updated_at = account.updated_at;
        }
        state.transactions.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn list_account_transactions(
        &self,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, RepoError> {
        let state = self.state()?;
        let items = state.transactions.values().filter(|t| {
            t.source_system == account_number || t.target_system == account_number
        });
        Ok(newest_first(items, |t| t.created_at, Some(limit)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment methods and KYC
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentMethodRepository for InMemoryRepo {
    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<(), RepoError> {
        self.state()?.payment_methods.insert(method.id, method.clone());
        Ok(())
    }

    async fn get_payment_method(
        &self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepoError> {
        Ok(self.state()?.payment_methods.get(&id).cloned())
    }

    async fn list_payment_methods(
        &self,
        query: &PaymentMethodQuery,
    ) -> Result<Vec<PaymentMethod>, RepoError> {
        let state = self.state()?;
        let items = state.payment_methods.values().filter(|m| {
            filter_eq(&query.user_id, &m.user_id)
                && filter_eq(&query.method_type, &m.method_type)
                && filter_eq(&query.is_active, &m.is_active)
        });
        Ok(newest_first(items, |m| m.created_at, None))
    }

    async fn update_payment_method(&self, method: &PaymentMethod) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state
            .payment_methods
            .get_mut(&method.id)
            .ok_or(RepoError::NotFound)?;
        *stored = method.clone();
        Ok(())
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool, RepoError> {
        Ok(self.state()?.payment_methods.remove(&id).is_some())
    }

    async fn set_default_payment_method(
        &self,
        user_id: UserId,
        id: PaymentMethodId,
    ) -> Result<(), RepoError> {
        let mut state = self.state()?;
        match state.payment_methods.get(&id) {
            Some(m) if m.user_id == user_id => {}
            _ => return Err(RepoError::NotFound),
        }
        for method in state
            .payment_methods
            .values_mut()
            .filter(|m| m.user_id == user_id)
        {
            method.is_default = method.id == id;
        }
        Ok(())
    }
}

#[async_trait]
impl KycRepository for InMemoryRepo {
    async fn insert_kyc(&self, profile: &KycProfile) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state.kyc.values().any(|p| p.user_id == profile.user_id) {
            return Err(RepoError::Conflict(
                "User already has a KYC profile".into(),
            ));
        }
        if state
            .kyc
            .values()
            .any(|p| p.mobile_number == profile.mobile_number)
        {
            return Err(RepoError::Conflict(
                "Mobile number is already registered".into(),
            ));
        }
        state.kyc.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_kyc(&self, id: KycProfileId) -> Result<Option<KycProfile>, RepoError> {
        Ok(self.state()?.kyc.get(&id).cloned())
    }

    async fn find_kyc_by_user(&self, user_id: UserId) -> Result<Option<KycProfile>, RepoError> {
        Ok(self
            .state()?
            .kyc
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn list_kyc(&self, query: &KycQuery) -> Result<Vec<KycProfile>, RepoError> {
        let state = self.state()?;
        let items = state.kyc.values().filter(|p| {
            filter_eq(&query.status, &p.status) && filter_eq(&query.user_id, &p.user_id)
        });
        Ok(newest_first(items, |p| p.created_at, None))
    }

    async fn update_kyc(&self, profile: &KycProfile) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state
            .kyc
            .values()
            .any(|p| p.id != profile.id && p.mobile_number == profile.mobile_number)
        {
            return Err(RepoError::Conflict(
                "Mobile number is already registered".into(),
            ));
        }
        let stored = state.kyc.get_mut(&profile.id).ok_or(RepoError::NotFound)?;
        *stored = profile.clone();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Providers and provider keys
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ProviderRepository for InMemoryRepo {
    async fn insert_provider(&self, provider: &Provider) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state.providers.values().any(|p| p.code == provider.code) {
            return Err(RepoError::Conflict(format!(
                "Provider code {} already exists",
                provider.code
            )));
        }
        state.providers.insert(provider.id, provider.clone());
        Ok(())
    }

    async fn get_provider(&self, id: ProviderId) -> Result<Option<Provider>, RepoError> {
        Ok(self.state()?.providers.get(&id).cloned())
    }

    async fn find_provider_by_code(&self, code: &str) -> Result<Option<Provider>, RepoError> {
        Ok(self
            .state()?
            .providers
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn list_providers(&self, query: &ProviderQuery) -> Result<Vec<Provider>, RepoError> {
        let state = self.state()?;
        let items = state.providers.values().filter(|p| {
            filter_eq(&query.provider_type, &p.provider_type)
                && filter_eq(&query.status, &p.status)
                && filter_eq(&query.is_active, &p.is_active)
        });
        Ok(newest_first(items, |p| p.created_at, None))
    }

    async fn update_provider(&self, provider: &Provider) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state
            .providers
            .get_mut(&provider.id)
            .ok_or(RepoError::NotFound)?;
        *stored = provider.clone();
        Ok(())
    }

    async fn record_provider_status(&self, provider: &Provider) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state
            .providers
            .get_mut(&provider.id)
            .ok_or(RepoError::NotFound)?;
        stored.status = provider.status;
        stored.status_message = provider.status_message.clone();
        stored.last_check_at = provider.last_check_at;
        stored.updated_at = provider.updated_at;
        Ok(())
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<bool, RepoError> {
        let mut state = self.state()?;
        if state.providers.remove(&id).is_none() {
            return Ok(false);
        }
        state.provider_keys.retain(|_, k| k.provider_id != id);
        state.webhooks.retain(|_, w| w.provider_id != id);
        Ok(true)
    }
}

#[async_trait]
impl ProviderKeyRepository for InMemoryRepo {
    async fn insert_provider_key(&self, key: &ProviderKey) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state.provider_keys.values().any(|k| {
            (k.provider_id == key.provider_id
                && k.user_id == key.user_id
                && k.environment == key.environment)
                || k.public_key == key.public_key
        }) {
            return Err(RepoError::Conflict(format!(
                "A {} key for this provider and user already exists",
                key.environment
            )));
        }
        state.provider_keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn get_provider_key(&self, id: ProviderKeyId) -> Result<Option<ProviderKey>, RepoError> {
        Ok(self.state()?.provider_keys.get(&id).cloned())
    }

    async fn find_provider_key(
        &self,
        provider_id: ProviderId,
        user_id: UserId,
        environment: Environment,
    ) -> Result<Option<ProviderKey>, RepoError> {
        Ok(self
            .state()?
            .provider_keys
            .values()
            .find(|k| {
                k.provider_id == provider_id && k.user_id == user_id && k.environment == environment
            })
            .cloned())
    }

    async fn list_provider_keys(
        &self,
        query: &ProviderKeyQuery,
    ) -> Result<Vec<ProviderKey>, RepoError> {
        let state = self.state()?;
        let items = state.provider_keys.values().filter(|k| {
            filter_eq(&query.provider_id, &k.provider_id)
                && filter_eq(&query.environment, &k.environment)
                && filter_eq(&query.is_active, &k.is_active)
                && filter_eq(&query.user_id, &k.user_id)
        });
        Ok(newest_first(items, |k| k.created_at, None))
    }

    async fn update_provider_key(&self, key: &ProviderKey) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state
            .provider_keys
            .get_mut(&key.id)
            .ok_or(RepoError::NotFound)?;
        *stored = key.clone();
        Ok(())
    }

    async fn record_provider_key_usage(
        &self,
        seen: &ProviderKey,
        key: &ProviderKey,
    ) -> Result<bool, RepoError> {
        let mut state = self.state()?;
        let Some(stored) = state.provider_keys.get_mut(&key.id) else {
            return Ok(false);
        };
        let unchanged = stored.is_active
            && stored.daily_usage == seen.daily_usage
            && stored.monthly_usage == seen.monthly_usage
            && stored.usage_day == seen.usage_day;
        if !unchanged {
            return Ok(false);
        }
        stored.daily_usage = key.daily_usage;
        stored.monthly_usage = key.monthly_usage;
        stored.usage_day = key.usage_day;
        stored.last_used_at = key.last_used_at;
        stored.updated_at = key.updated_at;
        Ok(true)
    }

    async fn deactivate_expired_provider_keys(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        let mut state = self.state()?;
        let mut deactivated = 0;
        for key in state
            .provider_keys
            .values_mut()
            .filter(|k| k.is_active && k.expires_at.is_some_and(|exp| exp < now))
        {
            key.deactivate(now);
            deactivated += 1;
        }
        Ok(deactivated)
    }

    async fn delete_provider_key(&self, id: ProviderKeyId) -> Result<bool, RepoError> {
        Ok(self.state()?.provider_keys.remove(&id).is_some())
    }

    async fn count_active_provider_keys(&self, provider_id: ProviderId) -> Result<i64, RepoError> {
        Ok(self
            .state()?
            .provider_keys
            .values()
            .filter(|k| k.provider_id == provider_id && k.is_active)
            .count() as i64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhook events
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl WebhookRepository for InMemoryRepo {
    async fn insert_webhook(
        &self,
        event: &ProviderWebhook,
    ) -> Result<(ProviderWebhook, bool), RepoError> {
        let mut state = self.state()?;
        if let Some(existing) = state
            .webhooks
            .values()
            .find(|w| w.provider_id == event.provider_id && w.event_id == event.event_id)
        {
            return Ok((existing.clone(), false));
        }
        state.webhooks.insert(event.id, event.clone());
        Ok((event.clone(), true))
    }

    async fn get_webhook(
        &self,
        id: ProviderWebhookId,
    ) -> Result<Option<ProviderWebhook>, RepoError> {
        Ok(self.state()?.webhooks.get(&id).cloned())
    }

    async fn list_webhooks(&self, query: &WebhookQuery) -> Result<Vec<ProviderWebhook>, RepoError> {
        let state = self.state()?;
        let items = state.webhooks.values().filter(|w| {
            filter_eq(&query.provider_id, &w.provider_id)
                && filter_eq(&query.event_type, &w.event_type)
                && filter_eq(&query.status, &w.status)
                && query.start_date.is_none_or(|s| w.created_at >= s)
                && query.end_date.is_none_or(|e| w.created_at <= e)
        });
        Ok(newest_first(
            items,
            |w| w.created_at,
            Some(effective_limit(query.limit)),
        ))
    }

    async fn pending_webhooks(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<ProviderWebhook>, RepoError> {
        let state = self.state()?;
        let mut pending: Vec<ProviderWebhook> = state
            .webhooks
            .values()
            .filter(|w| w.is_claimable(stale_before))
            .cloned()
            .collect();
        pending.sort_by_key(|w| w.created_at);
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn claim_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<ProviderWebhook>, RepoError> {
        let mut state = self.state()?;
        let Some(stored) = state.webhooks.get_mut(&id) else {
            return Ok(None);
        };
        if !stored.is_claimable(stale_before) {
            return Ok(None);
        }
        stored.claim(now, stale_before)?;
        Ok(Some(stored.clone()))
    }

    async fn finish_webhook(&self, event: &ProviderWebhook) -> Result<bool, RepoError> {
        let mut state = self.state()?;
        let stored = state.webhooks.get_mut(&event.id).ok_or(RepoError::NotFound)?;
        if !WebhookStatus::FINISHABLE.contains(&stored.status) {
            return Ok(false);
        }
        stored.status = event.status;
        stored.error_message = event.error_message.clone();
        stored.processed_at = event.processed_at;
        stored.updated_at = event.updated_at;
        Ok(true)
    }

    async fn retry_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
    ) -> Result<ProviderWebhook, RepoError> {
        let mut state = self.state()?;
        let stored = state.webhooks.get_mut(&id).ok_or(RepoError::NotFound)?;
        stored
            .retry(now)
            .map_err(|e| RepoError::Conflict(e.to_string()))?;
        Ok(stored.clone())
    }

    async fn cancel_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
    ) -> Result<ProviderWebhook, RepoError> {
        let mut state = self.state()?;
        let stored = state.webhooks.get_mut(&id).ok_or(RepoError::NotFound)?;
        stored
            .cancel(now)
            .map_err(|e| RepoError::Conflict(e.to_string()))?;
        Ok(stored.clone())
    }

    async fn webhook_stats(
        &self,
        provider_id: Option<ProviderId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<WebhookStats, RepoError> {
        let state = self.state()?;
        let mut stats = WebhookStats::default();
        for w in state.webhooks.values().filter(|w| {
            filter_eq(&provider_id, &w.provider_id) && since.is_none_or(|s| w.created_at >= s)
        }) {
            stats.total += 1;
            match w.status {
                WebhookStatus::Pending => stats.pending += 1,
                WebhookStatus::Processing => stats.processing += 1,
                WebhookStatus::Completed => stats.completed += 1,
                WebhookStatus::Failed => stats.failed += 1,
                WebhookStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit logs and system configs
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AuditLogRepository for InMemoryRepo {
    async fn append_audit_log(&self, entry: &AuditLog) -> Result<(), RepoError> {
        self.state()?.audit_logs.push(entry.clone());
        Ok(())
    }

    async fn get_audit_log(&self, id: AuditLogId) -> Result<Option<AuditLog>, RepoError> {
        Ok(self
            .state()?
            .audit_logs
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn list_audit_logs(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, RepoError> {
        let state = self.state()?;
        let items = state.audit_logs.iter().filter(|l| {
            query.actor_id.is_none_or(|a| l.actor_id == Some(a))
                && filter_eq(&query.action, &l.action)
                && filter_eq(&query.resource_type, &l.resource_type)
                && filter_eq(&query.resource_id, &l.resource_id)
                && query.start_date.is_none_or(|s| l.created_at >= s)
                && query.end_date.is_none_or(|e| l.created_at <= e)
        });
        Ok(newest_first(
            items,
            |l| l.created_at,
            Some(effective_limit(query.limit)),
        ))
    }
}

#[async_trait]
impl SystemConfigRepository for InMemoryRepo {
    async fn insert_system_config(&self, config: &SystemConfig) -> Result<(), RepoError> {
        let mut state = self.state()?;
        if state
            .system_configs
            .values()
            .any(|c| c.system_name == config.system_name)
        {
            return Err(RepoError::Conflict(format!(
                "System {} is already configured",
                config.system_name
            )));
        }
        state.system_configs.insert(config.id, config.clone());
        Ok(())
    }

    async fn get_system_config(
        &self,
        id: SystemConfigId,
    ) -> Result<Option<SystemConfig>, RepoError> {
        Ok(self.state()?.system_configs.get(&id).cloned())
    }

    async fn list_system_configs(
        &self,
        query: &SystemConfigQuery,
    ) -> Result<Vec<SystemConfig>, RepoError> {
        let state = self.state()?;
        let items = state.system_configs.values().filter(|c| {
            filter_eq(&query.system_type, &c.system_type) && filter_eq(&query.is_active, &c.is_active)
        });
        Ok(newest_first(items, |c| c.created_at, None))
    }

    async fn update_system_config(&self, config: &SystemConfig) -> Result<(), RepoError> {
        let mut state = self.state()?;
        let stored = state
            .system_configs
            .get_mut(&config.id)
            .ok_or(RepoError::NotFound)?;
        *stored = config.clone();
        Ok(())
    }

    async fn delete_system_config(&self, id: SystemConfigId) -> Result<bool, RepoError> {
        Ok(self.state()?.system_configs.remove(&id).is_some())
    }
}

#[async_trait]
impl Repository for InMemoryRepo {
    async fn ping(&self) -> Result<(), RepoError> {
        self.state().map(|_| ())
    }
}
