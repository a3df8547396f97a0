//! Data Transfer Objects (DTOs) for requests, responses and list filters.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::domain::{
    AccountType, ApiKeyId, AuditAction, AuthType, BankAccount, CurrencyCode, DocumentType,
    Environment, KycStatus, PaymentMethodType, Provider, ProviderCredentials, ProviderId,
    ProviderKey, ProviderKeyUsage, ProviderStatus, ProviderType, Role, SystemType, Transaction,
    TransactionStatus, UserId, WebhookStatus,
};

/// Default page size for list endpoints that paginate.
pub const DEFAULT_LIST_LIMIT: i64 = 100;
/// Upper bound on any requested page size.
pub const MAX_LIST_LIMIT: i64 = 500;

/// Clamps an optional page size into `1..=MAX_LIST_LIMIT`.
pub fn effective_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}

// ─────────────────────────────────────────────────────────────────────────────
// Users & API keys
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create the first administrator. Only valid on an empty system.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BootstrapRequest {
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "ops@example.com")]
    pub email: String,
}

/// Response after bootstrapping. The API key is shown only once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BootstrapResponse {
    pub user_id: UserId,
    pub username: String,
    pub api_key_id: ApiKeyId,
    /// The raw API key - store it securely, it won't be shown again
    #[schema(example = "mk_AbCdEf1234567890AbCdEf1234567890")]
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Request to create a new API key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    /// Name for the API key (for identification)
    #[schema(example = "ci-pipeline")]
    pub name: String,
    /// Owner; defaults to the caller. Only administrators may set another user.
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

/// A newly created or regenerated API key. The raw key is shown only once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeySecretResponse {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub name: String,
    pub key_prefix: String,
    pub api_key: String,
    pub expires_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    /// Caller-supplied unique reference
    #[schema(example = "ORD-2026-0001")]
    pub reference: String,
    #[schema(example = "core-banking")]
    pub source_system: String,
    /// Provider code when the transaction is to be submitted
    #[schema(example = "esewa")]
    pub target_system: String,
    #[schema(example = "payment")]
    pub transaction_type: String,
    /// Amount in smallest currency unit
    #[schema(example = 150000)]
    pub amount: i64,
    pub currency: CurrencyCode,
    #[serde(default)]
    pub request_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    pub source_system: Option<String>,
    pub target_system: Option<String>,
    pub transaction_type: Option<String>,
    pub user_id: Option<UserId>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CompleteTransactionRequest {
    #[serde(default)]
    pub response_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FailTransactionRequest {
    pub error_message: String,
    #[serde(default)]
    pub response_payload: Option<serde_json::Value>,
}

/// Aggregate counts over a set of transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransactionStats {
    pub total: i64,
    pub pending: i64,
    pub completed: i64,
    pub failed: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    #[schema(example = "0012345678")]
    pub account_number: String,
    #[schema(example = "Nabil Bank")]
    pub bank_name: String,
    #[schema(example = "Alice Sharma")]
    pub holder_name: String,
    pub account_type: AccountType,
    pub currency: CurrencyCode,
    /// Owner; defaults to the caller. Only administrators may set another user.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateAccountRequest {
    pub bank_name: Option<String>,
    pub holder_name: Option<String>,
    pub is_active: Option<bool>,
    /// Administrators only
    pub is_verified: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AccountQuery {
    pub user_id: Option<UserId>,
    pub is_active: Option<bool>,
}

/// Deposit into or withdrawal from a bank account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementRequest {
    /// Amount in smallest currency unit
    #[schema(example = 1000)]
    pub amount: i64,
    pub currency: CurrencyCode,
    /// Optional unique reference; generated when absent
    #[serde(default)]
    pub reference: Option<String>,
}

/// Ledger entry posted by a deposit or withdrawal, with the resulting balance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MovementResponse {
    pub transaction: Transaction,
    pub balance: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StatementQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountStatement {
    pub account: BankAccount,
    /// Newest first
    pub transactions: Vec<Transaction>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment methods
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentMethodRequest {
    #[schema(example = "Personal Visa")]
    pub name: String,
    pub method_type: PaymentMethodType,
    #[schema(example = "stripe")]
    pub provider: String,
    pub provider_method_id: String,
    #[serde(default)]
    pub last_four: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    /// Sensitive details, stored encrypted and never returned
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePaymentMethodRequest {
    pub name: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethodQuery {
    pub user_id: Option<UserId>,
    pub method_type: Option<PaymentMethodType>,
    pub is_active: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// KYC
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct KycRequest {
    #[schema(example = "Alice Sharma")]
    pub full_name: String,
    #[schema(example = "+9779800000000")]
    pub mobile_number: String,
    pub date_of_birth: NaiveDate,
    pub address: String,
    pub document_type: DocumentType,
    pub document_number: String,
    /// Subject; defaults to the caller. Only administrators may set another user.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct KycQuery {
    pub status: Option<KycStatus>,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RejectKycRequest {
    pub reason: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProviderRequest {
    #[schema(example = "eSewa")]
    pub name: String,
    #[schema(example = "esewa")]
    pub code: String,
    pub provider_type: ProviderType,
    #[serde(default)]
    pub supported_currencies: Vec<String>,
    #[serde(default)]
    pub supported_countries: Vec<String>,
    #[schema(example = "https://api.esewa.example")]
    pub base_url: String,
    #[serde(default)]
    pub status_path: Option<String>,
    #[serde(default)]
    pub submit_path: Option<String>,
    #[serde(default)]
    pub auth_type: Option<AuthType>,
    /// Outbound requests per minute (default 100)
    #[serde(default)]
    pub rate_limit: Option<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub credentials: Option<ProviderCredentials>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProviderRequest {
    pub name: Option<String>,
    pub provider_type: Option<ProviderType>,
    pub supported_currencies: Option<Vec<String>>,
    pub supported_countries: Option<Vec<String>>,
    pub base_url: Option<String>,
    pub status_path: Option<String>,
    pub submit_path: Option<String>,
    pub auth_type: Option<AuthType>,
    pub rate_limit: Option<i64>,
    pub is_active: Option<bool>,
    pub credentials: Option<ProviderCredentials>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProviderQuery {
    pub provider_type: Option<ProviderType>,
    pub status: Option<ProviderStatus>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: ProviderStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of probing a provider's status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckStatusResponse {
    pub provider_id: ProviderId,
    pub status: ProviderStatus,
    pub is_healthy: bool,
    pub http_status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderStatistics {
    pub provider_id: ProviderId,
    pub status: ProviderStatus,
    pub total_transactions: i64,
    pub completed_transactions: i64,
    pub failed_transactions: i64,
    pub pending_transactions: i64,
    /// Completed share of finished transactions, in percent
    pub success_rate: f64,
    pub error_rate: f64,
    pub active_keys: i64,
    pub total_webhooks: i64,
    pub webhook_success_rate: f64,
    pub last_check_at: Option<DateTime<Utc>>,
}

/// A newly registered provider with its webhook signing secret.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderCreatedResponse {
    #[serde(flatten)]
    pub provider: Provider,
    pub webhook_secret: String,
}

/// Provider webhook signing secret, shown on create and rotation only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderSecretResponse {
    pub provider_id: ProviderId,
    pub code: String,
    pub webhook_secret: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider keys
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateProviderKeyRequest {
    pub provider_id: ProviderId,
    pub environment: Environment,
    #[serde(default)]
    pub daily_limit: Option<i64>,
    #[serde(default)]
    pub monthly_limit: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Owner; defaults to the caller. Only administrators may set another user.
    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProviderKeyQuery {
    pub provider_id: Option<ProviderId>,
    pub environment: Option<Environment>,
    pub is_active: Option<bool>,
    pub user_id: Option<UserId>,
}

/// A newly issued provider key. The secret is shown only once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderKeySecretResponse {
    #[serde(flatten)]
    pub key: ProviderKey,
    #[schema(example = "sk_AbCdEf1234567890AbCdEf1234567890")]
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderKeyUsageResponse {
    pub key_id: crate::domain::ProviderKeyId,
    pub is_valid: bool,
    #[serde(flatten)]
    pub usage: ProviderKeyUsage,
}

/// Outcome message for idempotent actions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionMessage {
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhooks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct WebhookQuery {
    pub provider_id: Option<ProviderId>,
    pub event_type: Option<String>,
    pub status: Option<WebhookStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Counts of webhook events per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebhookStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl WebhookStats {
    /// Completed share of finished events, in percent.
    pub fn success_rate(&self) -> f64 {
        percentage(self.completed, self.completed + self.failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: WebhookStats,
    pub success_rate: f64,
}

/// Body shape a provider posts to the intake endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InboundWebhook {
    #[schema(example = "payment.success")]
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    #[serde(default)]
    pub data: serde_json::Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit logs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AuditQuery {
    pub actor_id: Option<UserId>,
    pub action: Option<AuditAction>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// System configs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSystemConfigRequest {
    #[schema(example = "core-banking")]
    pub system_name: String,
    pub system_type: SystemType,
    pub base_url: String,
    #[serde(default)]
    pub auth_type: Option<AuthType>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default)]
    pub retry_count: Option<i64>,
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSystemConfigRequest {
    pub system_type: Option<SystemType>,
    pub base_url: Option<String>,
    pub auth_type: Option<AuthType>,
    pub timeout_seconds: Option<i64>,
    pub retry_count: Option<i64>,
    pub settings: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SystemConfigQuery {
    pub system_type: Option<SystemType>,
    pub is_active: Option<bool>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthReport {
    pub fn from_components(
        components: BTreeMap<String, ComponentHealth>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let status = if components.values().all(ComponentHealth::is_healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self {
            status,
            timestamp,
            components,
        }
    }
}

/// `part / whole` in percent, rounded to two decimals; zero when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 10_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit_clamps() {
        assert_eq!(effective_limit(None), 100);
        assert_eq!(effective_limit(Some(0)), 1);
        assert_eq!(effective_limit(Some(10_000)), 500);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn test_health_report_aggregates() {
        let mut components = BTreeMap::new();
        components.insert(
            "database".to_string(),
            ComponentHealth {
                status: HealthStatus::Healthy,
                latency_ms: 1,
                error: None,
                details: None,
            },
        );
        let report = HealthReport::from_components(components.clone(), Utc::now());
        assert_eq!(report.status, HealthStatus::Healthy);

        components.insert(
            "cache".to_string(),
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                latency_ms: 0,
                error: Some("down".into()),
                details: None,
            },
        );
        let report = HealthReport::from_components(components, Utc::now());
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}
