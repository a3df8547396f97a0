//! Row structs and their conversion into domain types.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

use mediator_types::{
    ApiKey, ApiKeyId, AuditLog, AuditLogId, BankAccount, BankAccountId, KycProfile, KycProfileId,
    PaymentMethod, PaymentMethodId, Provider, ProviderId, ProviderKey, ProviderKeyId,
    ProviderWebhook, ProviderWebhookId, RepoError, SealedSecret, SystemConfig, SystemConfigId,
    Transaction, TransactionId, TransactionStats, User, UserId, WebhookStats,
};

// ─────────────────────────────────────────────────────────────────────────────
// Column lists
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) const USER_COLUMNS: &str = "id, username, email, role, is_active, created_at, updated_at";

pub(crate) const API_KEY_COLUMNS: &str =
    "id, user_id, name, key_prefix, key_hash, is_active, created_at, expires_at, last_used_at";

pub(crate) const TRANSACTION_COLUMNS: &str = "id, reference, source_system, target_system, \
    transaction_type, status, amount, currency, user_id, request_payload, response_payload, \
    error_message, submitted_at, created_at, updated_at";

pub(crate) const ACCOUNT_COLUMNS: &str = "id, user_id, account_number, bank_name, holder_name, \
    account_type, balance, currency, is_active, is_verified, created_at, updated_at";

pub(crate) const PAYMENT_METHOD_COLUMNS: &str = "id, user_id, name, method_type, provider, \
    provider_method_id, last_four, expiry_date, is_active, is_default, details, created_at, \
    updated_at";

pub(crate) const KYC_COLUMNS: &str = "id, user_id, full_name, mobile_number, date_of_birth, \
    address, document_type, document_number, status, rejection_reason, verified_at, created_at, \
    updated_at";

pub(crate) const PROVIDER_COLUMNS: &str = "id, name, code, provider_type, supported_currencies, \
    supported_countries, base_url, status_path, submit_path, auth_type, rate_limit, is_active, \
    status, status_message, credentials, webhook_secret, last_check_at, created_at, updated_at";

pub(crate) const PROVIDER_KEY_COLUMNS: &str = "id, provider_id, user_id, environment, \
    public_key, secret_hash, is_active, daily_limit, monthly_limit, daily_usage, monthly_usage, \
    usage_day, expires_at, last_used_at, created_at, updated_at";

pub(crate) const WEBHOOK_COLUMNS: &str = "id, event_id, provider_id, event_type, payload, status, \
    error_message, retry_count, signature, ip_address, headers, created_at, updated_at, \
    processed_at";

pub(crate) const AUDIT_COLUMNS: &str =
    "id, action, resource_type, resource_id, actor_id, ip_address, details, created_at";

pub(crate) const SYSTEM_CONFIG_COLUMNS: &str = "id, system_name, system_type, base_url, \
    auth_type, timeout_seconds, retry_count, settings, is_active, created_at, updated_at";

/// Parses a stored text value into its domain enum.
fn parse<T>(column: &str, value: &str) -> Result<T, RepoError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| RepoError::Database(format!("Invalid stored {}: {}", column, e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbUser {
    pub fn into_domain(self) -> Result<User, RepoError> {
        Ok(User {
            id: UserId::from_uuid(self.id),
            username: self.username,
            email: self.email,
            role: parse("role", &self.role)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl DbApiKey {
    pub fn into_domain(self) -> ApiKey {
        ApiKey {
            id: ApiKeyId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            name: self.name,
            key_prefix: self.key_prefix,
            key_hash: self.key_hash,
            is_active: self.is_active,
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
        }
    }
}

#[derive(FromRow)]
pub struct DbTransaction {
    pub id: Uuid,
    pub reference: String,
    pub source_system: String,
    pub target_system: String,
    pub transaction_type: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    pub user_id: Option<Uuid>,
    pub request_payload: Option<Value>,
    pub response_payload: Option<Value>,
    pub error_message: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbTransaction {
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        Ok(Transaction {
            id: TransactionId::from_uuid(self.id),
            reference: self.reference,
            source_system: self.source_system,
            target_system: self.target_system,
            transaction_type: self.transaction_type,
            status: parse("status", &self.status)?,
            amount: self.amount,
            currency: parse("currency", &self.currency)?,
            user_id: self.user_id.map(UserId::from_uuid),
            request_payload: self.request_payload,
            response_payload: self.response_payload,
            error_message: self.error_message,
            submitted_at: self.submitted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_number: String,
    pub bank_name: String,
    pub holder_name: String,
    pub account_type: String,
    pub balance: i64,
    pub currency: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbAccount {
    pub fn into_domain(self) -> Result<BankAccount, RepoError> {
        Ok(BankAccount {
            id: BankAccountId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            account_number: self.account_number,
            bank_name: self.bank_name,
            holder_name: self.holder_name,
            account_type: parse("account_type", &self.account_type)?,
            balance: self.balance,
            currency: parse("currency", &self.currency)?,
            is_active: self.is_active,
            is_verified: self.is_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbPaymentMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub method_type: String,
    pub provider: String,
    pub provider_method_id: String,
    pub last_four: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub is_active: bool,
    pub is_default: bool,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbPaymentMethod {
    pub fn into_domain(self) -> Result<PaymentMethod, RepoError> {
        Ok(PaymentMethod {
            id: PaymentMethodId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            name: self.name,
            method_type: parse("method_type", &self.method_type)?,
            provider: self.provider,
            provider_method_id: self.provider_method_id,
            last_four: self.last_four,
            expiry_date: self.expiry_date,
            is_active: self.is_active,
            is_default: self.is_default,
            details: self.details.map(SealedSecret),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbKycProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub mobile_number: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub document_type: String,
    pub document_number: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbKycProfile {
    pub fn into_domain(self) -> Result<KycProfile, RepoError> {
        Ok(KycProfile {
            id: KycProfileId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            full_name: self.full_name,
            mobile_number: self.mobile_number,
            date_of_birth: self.date_of_birth,
            address: self.address,
            document_type: parse("document_type", &self.document_type)?,
            document_number: self.document_number,
            status: parse("status", &self.status)?,
            rejection_reason: self.rejection_reason,
            verified_at: self.verified_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbProvider {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub provider_type: String,
    pub supported_currencies: Json<Vec<String>>,
    pub supported_countries: Json<Vec<String>>,
    pub base_url: String,
    pub status_path: String,
    pub submit_path: String,
    pub auth_type: String,
    pub rate_limit: i64,
    pub is_active: bool,
    pub status: String,
    pub status_message: Option<String>,
    pub credentials: Option<String>,
    pub webhook_secret: String,
    pub last_check_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbProvider {
    pub fn into_domain(self) -> Result<Provider, RepoError> {
        Ok(Provider {
            id: ProviderId::from_uuid(self.id),
            name: self.name,
            code: self.code,
            provider_type: parse("provider_type", &self.provider_type)?,
            supported_currencies: self.supported_currencies.0,
            supported_countries: self.supported_countries.0,
            base_url: self.base_url,
            status_path: self.status_path,
            submit_path: self.submit_path,
            auth_type: parse("auth_type", &self.auth_type)?,
            rate_limit: self.rate_limit,
            is_active: self.is_active,
            status: parse("status", &self.status)?,
            status_message: self.status_message,
            credentials: self.credentials.map(SealedSecret),
            webhook_secret: self.webhook_secret,
            last_check_at: self.last_check_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbProviderKey {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub user_id: Uuid,
    pub environment: String,
    pub public_key: String,
    pub secret_hash: String,
    pub is_active: bool,
    pub daily_limit: i64,
    pub monthly_limit: i64,
    pub daily_usage: i64,
    pub monthly_usage: i64,
    pub usage_day: NaiveDate,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbProviderKey {
    pub fn into_domain(self) -> Result<ProviderKey, RepoError> {
        Ok(ProviderKey {
            id: ProviderKeyId::from_uuid(self.id),
            provider_id: ProviderId::from_uuid(self.provider_id),
            user_id: UserId::from_uuid(self.user_id),
            environment: parse("environment", &self.environment)?,
            public_key: self.public_key,
            secret_hash: self.secret_hash,
            is_active: self.is_active,
            daily_limit: self.daily_limit,
            monthly_limit: self.monthly_limit,
            daily_usage: self.daily_usage,
            monthly_usage: self.monthly_usage,
            usage_day: self.usage_day,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbWebhook {
    pub id: Uuid,
    pub event_id: Uuid,
    pub provider_id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub signature: String,
    pub ip_address: Option<String>,
    pub headers: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl DbWebhook {
    pub fn into_domain(self) -> Result<ProviderWebhook, RepoError> {
        Ok(ProviderWebhook {
            id: ProviderWebhookId::from_uuid(self.id),
            event_id: self.event_id,
            provider_id: ProviderId::from_uuid(self.provider_id),
            event_type: self.event_type,
            payload: self.payload,
            status: parse("status", &self.status)?,
            error_message: self.error_message,
            retry_count: self.retry_count,
            signature: self.signature,
            ip_address: self.ip_address,
            headers: self.headers,
            created_at: self.created_at,
            updated_at: self.updated_at,
            processed_at: self.processed_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbAuditLog {
    pub id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub actor_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl DbAuditLog {
    pub fn into_domain(self) -> Result<AuditLog, RepoError> {
        Ok(AuditLog {
            id: AuditLogId::from_uuid(self.id),
            action: parse("action", &self.action)?,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            actor_id: self.actor_id.map(UserId::from_uuid),
            ip_address: self.ip_address,
            details: self.details,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
pub struct DbSystemConfig {
    pub id: Uuid,
    pub system_name: String,
    pub system_type: String,
    pub base_url: String,
    pub auth_type: String,
    pub timeout_seconds: i64,
    pub retry_count: i64,
    pub settings: Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbSystemConfig {
    pub fn into_domain(self) -> Result<SystemConfig, RepoError> {
        Ok(SystemConfig {
            id: SystemConfigId::from_uuid(self.id),
            system_name: self.system_name,
            system_type: parse("system_type", &self.system_type)?,
            base_url: self.base_url,
            auth_type: parse("auth_type", &self.auth_type)?,
            timeout_seconds: self.timeout_seconds,
            retry_count: self.retry_count,
            settings: self.settings,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregates
// ─────────────────────────────────────────────────────────────────────────────

#[derive(FromRow)]
pub struct DbTransactionStats {
    pub total: i64,
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
}

impl From<DbTransactionStats> for TransactionStats {
    fn from(row: DbTransactionStats) -> Self {
        TransactionStats {
            total: row.total,
            pending: row.pending,
            completed: row.completed,
            failed: row.failed,
        }
    }
}

#[derive(FromRow)]
pub struct DbWebhookStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl From<DbWebhookStats> for WebhookStats {
    fn from(row: DbWebhookStats) -> Self {
        WebhookStats {
            total: row.total,
            pending: row.pending,
            processing: row.processing,
            completed: row.completed,
            failed: row.failed,
            cancelled: row.cancelled,
        }
    }
}
