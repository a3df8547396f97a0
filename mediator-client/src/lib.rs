//! # Mediator Client SDK
//!
//! A typed Rust client for the Mediator API (`/api/v1`).

use mediator_types::{
    AccountQuery, AccountStatement, ActionMessage, ApiKey, ApiKeyId, ApiKeySecretResponse,
    AuditLog, AuditQuery, BankAccount, BankAccountId, BootstrapRequest, BootstrapResponse,
    CheckStatusResponse, CompleteTransactionRequest, CreateAccountRequest, CreateApiKeyRequest,
    CreateProviderKeyRequest, CreateProviderRequest, CreateTransactionRequest, CreateUserRequest,
    FailTransactionRequest, HealthReport, MovementRequest, MovementResponse, Provider, ProviderId,
    ProviderKey, ProviderKeyId, ProviderKeyQuery, ProviderKeySecretResponse,
    ProviderKeyUsageResponse, ProviderCreatedResponse, ProviderQuery, ProviderSecretResponse,
    ProviderStatistics, ProviderWebhook, ProviderWebhookId, Transaction, TransactionId,
    TransactionQuery, UpdateStatusRequest, User, UserId, UserQuery, WebhookQuery, WebhookSummary,
};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Serialize, de::DeserializeOwned};

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

const API: &str = "/api/v1";

/// Mediator API client.
pub struct MediatorClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl MediatorClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Overall health report. Returned for both healthy (200) and
    /// unhealthy (503) answers.
    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() || status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(api_error(status.as_u16(), body))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Users and API keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the first administrator. Only works on an empty system.
    pub async fn bootstrap(
        &self,
        username: &str,
        email: &str,
    ) -> Result<BootstrapResponse, ClientError> {
        let req = BootstrapRequest {
            username: username.to_string(),
            email: email.to_string(),
        };
        self.post("/bootstrap", &req).await
    }

    pub async fn me(&self) -> Result<User, ClientError> {
        self.get("/users/me").await
    }

    pub async fn create_user(&self, req: &CreateUserRequest) -> Result<User, ClientError> {
        self.post("/users", req).await
    }

    pub async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>, ClientError> {
        self.get_query("/users", query).await
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, ClientError> {
        self.get(&format!("/users/{}", id)).await
    }

    pub async fn deactivate_user(&self, id: UserId) -> Result<User, ClientError> {
        self.delete(&format!("/users/{}", id)).await
    }

    pub async fn create_api_key(
        &self,
        req: &CreateApiKeyRequest,
    ) -> Result<ApiKeySecretResponse, ClientError> {
        self.post("/api-keys", req).await
    }

    pub async fn list_api_keys(&self) -> Result<Vec<ApiKey>, ClientError> {
        self.get("/api-keys").await
    }

    /// Issues a new secret for the key. The old one stops working.
    pub async fn regenerate_api_key(
        &self,
        id: ApiKeyId,
    ) -> Result<ApiKeySecretResponse, ClientError> {
        self.post_empty(&format!("/api-keys/{}/regenerate", id))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_transaction(
        &self,
        req: &CreateTransactionRequest,
    ) -> Result<Transaction, ClientError> {
        self.post("/transactions", req).await
    }

    pub async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, ClientError> {
        self.get_query("/transactions", query).await
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, ClientError> {
        self.get(&format!("/transactions/{}", id)).await
    }

    pub async fn complete_transaction(
        &self,
        id: TransactionId,
        req: &CompleteTransactionRequest,
    ) -> Result<Transaction, ClientError> {
        self.post(&format!("/transactions/{}/complete", id), req)
            .await
    }

    pub async fn fail_transaction(
        &self,
        id: TransactionId,
        req: &FailTransactionRequest,
    ) -> Result<Transaction, ClientError> {
        self.post(&format!("/transactions/{}/fail", id), req).await
    }

    /// Forwards a pending transaction to its target provider.
    pub async fn submit_transaction(&self, id: TransactionId) -> Result<Transaction, ClientError> {
        self.post_empty(&format!("/transactions/{}/submit", id))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_account(
        &self,
        req: &CreateAccountRequest,
    ) -> Result<BankAccount, ClientError> {
        self.post("/accounts", req).await
    }

    pub async fn list_accounts(&self, query: &AccountQuery) -> Result<Vec<BankAccount>, ClientError> {
        self.get_query("/accounts", query).await
    }

    pub async fn get_account(&self, id: BankAccountId) -> Result<BankAccount, ClientError> {
        self.get(&format!("/accounts/{}", id)).await
    }

    pub async fn deposit(
        &self,
        id: BankAccountId,
        req: &MovementRequest,
    ) -> Result<MovementResponse, ClientError> {
        self.post(&format!("/accounts/{}/deposit", id), req).await
    }

    pub async fn withdraw(
        &self,
        id: BankAccountId,
        req: &MovementRequest,
    ) -> Result<MovementResponse, ClientError> {
        self.post(&format!("/accounts/{}/withdraw", id), req).await
    }

    pub async fn statement(&self, id: BankAccountId) -> Result<AccountStatement, ClientError> {
        self.get(&format!("/accounts/{}/statement", id)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Providers and provider keys
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_provider(
        &self,
        req: &CreateProviderRequest,
    ) -> Result<ProviderCreatedResponse, ClientError> {
        self.post("/providers", req).await
    }

    pub async fn list_providers(&self, query: &ProviderQuery) -> Result<Vec<Provider>, ClientError> {
        self.get_query("/providers", query).await
    }

    pub async fn get_provider(&self, id: ProviderId) -> Result<Provider, ClientError> {
        self.get(&format!("/providers/{}", id)).await
    }

    pub async fn delete_provider(&self, id: ProviderId) -> Result<ActionMessage, ClientError> {
        self.delete(&format!("/providers/{}", id)).await
    }

    pub async fn check_provider_status(
        &self,
        id: ProviderId,
    ) -> Result<CheckStatusResponse, ClientError> {
        self.post_empty(&format!("/providers/{}/check_status", id))
            .await
    }

    pub async fn update_provider_status(
        &self,
        id: ProviderId,
        req: &UpdateStatusRequest,
    ) -> Result<Provider, ClientError> {
        self.post(&format!("/providers/{}/update_status", id), req)
            .await
    }

    pub async fn provider_statistics(
        &self,
        id: ProviderId,
    ) -> Result<ProviderStatistics, ClientError> {
        self.get(&format!("/providers/{}/statistics", id)).await
    }

    pub async fn rotate_webhook_secret(
        &self,
        id: ProviderId,
    ) -> Result<ProviderSecretResponse, ClientError> {
        self.post_empty(&format!("/providers/{}/rotate_secret", id))
            .await
    }

    pub async fn create_provider_key(
        &self,
        req: &CreateProviderKeyRequest,
    ) -> Result<ProviderKeySecretResponse, ClientError> {
        self.post("/provider-keys", req).await
    }

    pub async fn list_provider_keys(
        &self,
        query: &ProviderKeyQuery,
    ) -> Result<Vec<ProviderKey>, ClientError> {
        self.get_query("/provider-keys", query).await
    }

    pub async fn provider_key_usage(
        &self,
        id: ProviderKeyId,
    ) -> Result<ProviderKeyUsageResponse, ClientError> {
        self.get(&format!("/provider-keys/{}/usage", id)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Provider webhooks and audit
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_webhooks(
        &self,
        query: &WebhookQuery,
    ) -> Result<Vec<ProviderWebhook>, ClientError> {
        self.get_query("/provider-webhooks", query).await
    }

    pub async fn get_webhook(&self, id: ProviderWebhookId) -> Result<ProviderWebhook, ClientError> {
        self.get(&format!("/provider-webhooks/{}", id)).await
    }

    pub async fn retry_webhook(
        &self,
        id: ProviderWebhookId,
    ) -> Result<ProviderWebhook, ClientError> {
        self.post_empty(&format!("/provider-webhooks/{}/retry", id))
            .await
    }

    pub async fn cancel_webhook(
        &self,
        id: ProviderWebhookId,
    ) -> Result<ProviderWebhook, ClientError> {
        self.post_empty(&format!("/provider-webhooks/{}/cancel", id))
            .await
    }

    pub async fn webhook_summary(&self) -> Result<WebhookSummary, ClientError> {
        self.get("/provider-webhooks/summary").await
    }

    pub async fn list_audit_logs(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, ClientError> {
        self.get_query("/audit-logs", query).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plumbing
    // ─────────────────────────────────────────────────────────────────────────

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{}{}", self.base_url, API, path));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.request(Method::GET, path).send().await?;
        self.handle_response(resp).await
    }

    async fn get_query<T: DeserializeOwned, Q: Serialize>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T, ClientError> {
        let resp = self.request(Method::GET, path).query(query).send().await?;
        self.handle_response(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let resp = self.request(Method::POST, path).json(body).send().await?;
        self.handle_response(resp).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.request(Method::POST, path).send().await?;
        self.handle_response(resp).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.request(Method::DELETE, path).send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(api_error(status.as_u16(), body))
        }
    }
}

fn api_error(status: u16, body: String) -> ClientError {
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body);
    ClientError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_with_trailing_slash() {
        let client = MediatorClient::new("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = MediatorClient::new("http://localhost:3000").with_api_key("mk_test");
        assert_eq!(client.api_key, Some("mk_test".to_string()));
    }

    #[test]
    fn test_api_error_prefers_error_field() {
        let err = api_error(403, r#"{"error":"Administrator role required","code":403}"#.into());
        assert_eq!(err.status(), Some(403));
        assert_eq!(
            err.to_string(),
            "API error: 403 - Administrator role required"
        );

        let err = api_error(502, "Bad Gateway".into());
        assert_eq!(err.to_string(), "API error: 502 - Bad Gateway");
    }
}
