//! Provider registry, status checks and provider keys.

use mediator_repo::security::{generate_secret, hash_api_key};
use mediator_types::{
    AppError, AuditAction, AuthType, CheckStatusResponse, CreateProviderKeyRequest,
    CreateProviderRequest, Provider, ProviderCreatedResponse, ProviderCredentials,
    ProviderEndpoint, ProviderGateway, ProviderId, ProviderKey, ProviderKeyId, ProviderKeyQuery,
    ProviderKeySecretResponse, ProviderKeyUsageResponse, ProviderQuery, ProviderSecretResponse,
    ProviderSettings, ProviderStatistics, ProviderStatus, Repository, UpdateProviderRequest,
    UpdateStatusRequest, percentage,
};
use serde_json::json;

use super::{Caller, MediatorService, not_found};

pub const WEBHOOK_SECRET_PREFIX: &str = "whsec_";
pub const PUBLIC_KEY_PREFIX: &str = "pk_";
pub const SECRET_KEY_PREFIX: &str = "sk_";

const DEFAULT_STATUS_PATH: &str = "/health";
const DEFAULT_SUBMIT_PATH: &str = "/transactions";

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    // ─────────────────────────────────────────────────────────────────────────
    // Providers
    // ─────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, caller, req), fields(code = %req.code))]
    pub async fn create_provider(
        &self,
        caller: &Caller,
        req: CreateProviderRequest,
    ) -> Result<ProviderCreatedResponse, AppError> {
        caller.require_admin()?;
        let settings = ProviderSettings {
            name: req.name,
            provider_type: req.provider_type,
            supported_currencies: req.supported_currencies,
            supported_countries: req.supported_countries,
            base_url: req.base_url,
            status_path: req
                .status_path
                .unwrap_or_else(|| DEFAULT_STATUS_PATH.to_string()),
            submit_path: req
                .submit_path
                .unwrap_or_else(|| DEFAULT_SUBMIT_PATH.to_string()),
            auth_type: req.auth_type.unwrap_or(AuthType::None),
            rate_limit: req.rate_limit.unwrap_or(Provider::DEFAULT_RATE_LIMIT),
            is_active: req.is_active.unwrap_or(true),
        };

        let credentials = req.credentials.unwrap_or_default();
        credentials.auth_material(settings.auth_type)?;
        let sealed = self.seal_credentials(&credentials)?;

        let webhook_secret = generate_secret(WEBHOOK_SECRET_PREFIX);
        let provider = Provider::new(req.code, settings, sealed, webhook_secret.clone(), self.now())?;
        self.repo.insert_provider(&provider).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "provider",
            provider.id,
            json!({"code": provider.code, "provider_type": provider.provider_type}),
        )
        .await;
        tracing::info!(provider_id = %provider.id, "Provider registered");

        Ok(ProviderCreatedResponse {
            provider,
            webhook_secret,
        })
    }

    pub async fn list_providers(&self, query: ProviderQuery) -> Result<Vec<Provider>, AppError> {
        self.repo.list_providers(&query).await.map_err(Into::into)
    }

    pub async fn get_provider(&self, id: ProviderId) -> Result<Provider, AppError> {
        self.repo
            .get_provider(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| not_found("Provider", id)))
    }

    #[tracing::instrument(skip(self, caller, req), fields(provider_id = %id))]
    pub async fn update_provider(
        &self,
        caller: &Caller,
        id: ProviderId,
        req: UpdateProviderRequest,
    ) -> Result<Provider, AppError> {
        caller.require_admin()?;
        let mut provider = self.get_provider(id).await?;
        let mut settings = provider.settings();
        if let Some(name) = req.name {
            settings.name = name;
        }
        if let Some(provider_type) = req.provider_type {
            settings.provider_type = provider_type;
        }
        if let Some(currencies) = req.supported_currencies {
            settings.supported_currencies = currencies;
        }
        if let Some(countries) = req.supported_countries {
            settings.supported_countries = countries;
        }
        if let Some(base_url) = req.base_url {
            settings.base_url = base_url;
        }
        if let Some(status_path) = req.status_path {
            settings.status_path = status_path;
        }
        if let Some(submit_path) = req.submit_path {
            settings.submit_path = submit_path;
        }
        if let Some(auth_type) = req.auth_type {
            settings.auth_type = auth_type;
        }
        if let Some(rate_limit) = req.rate_limit {
            settings.rate_limit = rate_limit;
        }
        if let Some(is_active) = req.is_active {
            settings.is_active = is_active;
        }

        let credentials = match req.credentials {
            Some(credentials) => {
                provider.credentials = self.seal_credentials(&credentials)?;
                credentials
            }
            None => self.credentials(&provider)?,
        };
        credentials.auth_material(settings.auth_type)?;

        provider.apply_settings(settings, self.now())?;
        self.repo.update_provider(&provider).await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "provider",
            provider.id,
            json!({"code": provider.code}),
        )
        .await;
        Ok(provider)
    }

    /// Removes the provider together with its keys and webhook events.
    #[tracing::instrument(skip(self, caller), fields(provider_id = %id))]
    pub async fn delete_provider(&self, caller: &Caller, id: ProviderId) -> Result<(), AppError> {
        caller.require_admin()?;
        let provider = self.get_provider(id).await?;
        if !self.repo.delete_provider(id).await? {
            return Err(not_found("Provider", id));
        }
        self.audit(
            Some(caller),
            AuditAction::Delete,
            "provider",
            id,
            json!({"code": provider.code}),
        )
        .await;
        Ok(())
    }

    /// Probes the provider's status endpoint on behalf of an administrator.
    #[tracing::instrument(skip(self, caller), fields(provider_id = %id))]
    pub async fn check_status(
        &self,
        caller: &Caller,
        id: ProviderId,
    ) -> Result<CheckStatusResponse, AppError> {
        caller.require_admin()?;
        let provider = self.get_provider(id).await?;
        self.probe_provider(provider, Some(caller), "check_status").await
    }

    /// Probes every active, non-deprecated provider. Individual failures are
    /// logged and skipped.
    #[tracing::instrument(skip(self))]
    pub async fn check_all_providers(&self) -> Result<Vec<CheckStatusResponse>, AppError> {
        let query = ProviderQuery {
            is_active: Some(true),
            ..Default::default()
        };
        let providers = self.repo.list_providers(&query).await?;

        let mut results = Vec::with_capacity(providers.len());
        for provider in providers
            .into_iter()
            .filter(|p| p.status != ProviderStatus::Deprecated)
        {
            let code = provider.code.clone();
            match self.probe_provider(provider, None, "monitor").await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(provider = %code, "Provider check failed: {}", e),
            }
        }
        Ok(results)
    }

    /// 2xx is `online`; any other status, timeout or transport error is
    /// `offline`. The outcome is stored with the check time.
    async fn probe_provider(
        &self,
        mut provider: Provider,
        caller: Option<&Caller>,
        source: &str,
    ) -> Result<CheckStatusResponse, AppError> {
        let now = self.now();
        let previous = provider.status;
        let (healthy, http_status, latency_ms, error) =
            match self.endpoint(&provider, provider.status_url()) {
                Ok(endpoint) => {
                    let outcome = self.gateway.probe(&endpoint).await;
                    (
                        outcome.healthy,
                        outcome.http_status,
                        outcome.latency.as_millis() as u64,
                        outcome.error,
                    )
                }
                Err(e) => (false, None, 0, Some(e.to_string())),
            };

        provider.record_check(healthy, error.clone(), now);
        self.repo.record_provider_status(&provider).await?;
        tracing::debug!(
            provider = %provider.code,
            status = %provider.status,
            latency_ms,
            "Provider checked"
        );
        self.notify_status_change(caller, &provider, previous, source)
            .await;

        Ok(CheckStatusResponse {
            provider_id: provider.id,
            status: provider.status,
            is_healthy: healthy,
            http_status,
            latency_ms,
            error,
            last_check: now,
        })
    }

    #[tracing::instrument(skip(self, caller, req), fields(provider_id = %id, status = %req.status))]
    pub async fn update_provider_status(
        &self,
        caller: &Caller,
        id: ProviderId,
        req: UpdateStatusRequest,
    ) -> Result<Provider, AppError> {
        caller.require_admin()?;
        let mut provider = self.get_provider(id).await?;
        let previous = provider.status;
        provider.set_status(req.status, req.message.clone(), self.now());
        self.repo.record_provider_status(&provider).await?;
        self.notify_status_change(Some(caller), &provider, previous, "manual")
            .await;
        Ok(provider)
    }

    /// Announces a status transition. Going offline is logged as a warning
    /// so alerting can pick it up; every transition is audited.
    pub(crate) async fn notify_status_change(
        &self,
        caller: Option<&Caller>,
        provider: &Provider,
        previous: ProviderStatus,
        source: &str,
    ) {
        if provider.status == previous {
            return;
        }
        if provider.status == ProviderStatus::Offline {
            tracing::warn!(
                provider = %provider.code,
                from = %previous,
                reason = provider.status_message.as_deref().unwrap_or(""),
                source,
                "Provider {} is now offline",
                provider.name
            );
        } else {
            tracing::info!(
                provider = %provider.code,
                from = %previous,
                to = %provider.status,
                source,
                "Provider status changed"
            );
        }
        self.audit(
            caller,
            AuditAction::StatusChange,
            "provider",
            provider.id,
            json!({
                "from": previous,
                "to": provider.status,
                "message": provider.status_message,
                "source": source,
            }),
        )
        .await;
    }

    /// Deactivates provider keys past their expiry date.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_expired_provider_keys(&self) -> Result<u64, AppError> {
        let deactivated = self.repo.deactivate_expired_provider_keys(self.now()).await?;
        if deactivated > 0 {
            tracing::info!(deactivated, "Deactivated expired provider keys");
        }
        Ok(deactivated)
    }

    pub async fn provider_statistics(&self, id: ProviderId) -> Result<ProviderStatistics, AppError> {
        let provider = self.get_provider(id).await?;
        let transactions = self.repo.transaction_stats(&provider.code).await?;
        let webhooks = self.repo.webhook_stats(Some(id), None).await?;
        let active_keys = self.repo.count_active_provider_keys(id).await?;
        let finished = transactions.completed + transactions.failed;

        Ok(ProviderStatistics {
            provider_id: id,
            status: provider.status,
            total_transactions: transactions.total,
            completed_transactions: transactions.completed,
            failed_transactions: transactions.failed,
            pending_transactions: transactions.pending,
            success_rate: percentage(transactions.completed, finished),
            error_rate: percentage(transactions.failed, finished),
            active_keys,
            total_webhooks: webhooks.total,
            webhook_success_rate: webhooks.success_rate(),
            last_check_at: provider.last_check_at,
        })
    }

    /// Issues a new webhook signing secret; the old one stops verifying.
    #[tracing::instrument(skip(self, caller), fields(provider_id = %id))]
    pub async fn rotate_webhook_secret(
        &self,
        caller: &Caller,
        id: ProviderId,
    ) -> Result<ProviderSecretResponse, AppError> {
        caller.require_admin()?;
        let mut provider = self.get_provider(id).await?;
        provider.webhook_secret = generate_secret(WEBHOOK_SECRET_PREFIX);
        provider.updated_at = self.now();
        self.repo.update_provider(&provider).await?;
        self.audit(Some(caller), AuditAction::Regenerate, "provider", id, json!({"secret": "webhook"}))
            .await;

        Ok(ProviderSecretResponse {
            provider_id: provider.id,
            code: provider.code,
            webhook_secret: provider.webhook_secret,
        })
    }

    fn credentials(&self, provider: &Provider) -> Result<ProviderCredentials, AppError> {
        match &provider.credentials {
            Some(sealed) => self.cipher.open_json(sealed).map_err(|e| {
                AppError::Internal(format!(
                    "Cannot read credentials of provider {}: {}",
                    provider.code, e
                ))
            }),
            None => Ok(ProviderCredentials::default()),
        }
    }

    fn seal_credentials(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Option<mediator_types::SealedSecret>, AppError> {
        if *credentials == ProviderCredentials::default() {
            return Ok(None);
        }
        self.cipher
            .seal_json(credentials)
            .map(Some)
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Resolves where and how to call `provider` at `url`.
    pub(crate) fn endpoint(
        &self,
        provider: &Provider,
        url: String,
    ) -> Result<ProviderEndpoint, AppError> {
        let auth = self
            .credentials(provider)?
            .auth_material(provider.auth_type)?;
        Ok(ProviderEndpoint {
            code: provider.code.clone(),
            url,
            auth,
            rate_limit: u32::try_from(provider.rate_limit).unwrap_or(u32::MAX),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Provider keys
    // ─────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, caller, req), fields(provider_id = %req.provider_id))]
    pub async fn create_provider_key(
        &self,
        caller: &Caller,
        req: CreateProviderKeyRequest,
    ) -> Result<ProviderKeySecretResponse, AppError> {
        let owner = caller.owner_for(req.user_id)?;
        let provider = self.get_provider(req.provider_id).await?;
        if !provider.is_active {
            return Err(AppError::BadRequest(format!(
                "Provider {} is not active",
                provider.code
            )));
        }

        let secret_key = generate_secret(SECRET_KEY_PREFIX);
        let key = ProviderKey::new(
            provider.id,
            owner,
            req.environment,
            generate_secret(PUBLIC_KEY_PREFIX),
            hash_api_key(&secret_key),
            req.daily_limit.unwrap_or(ProviderKey::DEFAULT_DAILY_LIMIT),
            req.monthly_limit
                .unwrap_or(ProviderKey::DEFAULT_MONTHLY_LIMIT),
            req.expires_at,
            self.now(),
        )?;
        self.repo.insert_provider_key(&key).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "provider_key",
            key.id,
            json!({"provider": provider.code, "user_id": owner, "environment": key.environment}),
        )
        .await;

        Ok(ProviderKeySecretResponse { key, secret_key })
    }

    pub async fn list_provider_keys(
        &self,
        caller: &Caller,
        mut query: ProviderKeyQuery,
    ) -> Result<Vec<ProviderKey>, AppError> {
        query.user_id = caller.scope(query.user_id);
        self.repo
            .list_provider_keys(&query)
            .await
            .map_err(Into::into)
    }

    pub async fn get_provider_key(
        &self,
        caller: &Caller,
        id: ProviderKeyId,
    ) -> Result<ProviderKey, AppError> {
        self.repo
            .get_provider_key(id)
            .await?
            .filter(|k| caller.can_see(k.user_id))
            .ok_or_else(|| not_found("Provider key", id))
    }

    pub async fn delete_provider_key(
        &self,
        caller: &Caller,
        id: ProviderKeyId,
    ) -> Result<(), AppError> {
        let key = self.get_provider_key(caller, id).await?;
        if !self.repo.delete_provider_key(key.id).await? {
            return Err(not_found("Provider key", id));
        }
        self.audit(Some(caller), AuditAction::Delete, "provider_key", id, json!({}))
            .await;
        Ok(())
    }

    pub async fn deactivate_provider_key(
        &self,
        caller: &Caller,
        id: ProviderKeyId,
    ) -> Result<ProviderKey, AppError> {
        let mut key = self.get_provider_key(caller, id).await?;
        key.deactivate(self.now());
        self.repo.update_provider_key(&key).await?;
        self.audit(Some(caller), AuditAction::Deactivate, "provider_key", id, json!({}))
            .await;
        Ok(key)
    }

    pub async fn provider_key_usage(
        &self,
        caller: &Caller,
        id: ProviderKeyId,
    ) -> Result<ProviderKeyUsageResponse, AppError> {
        let key = self.get_provider_key(caller, id).await?;
        let now = self.now();
        Ok(ProviderKeyUsageResponse {
            key_id: key.id,
            is_valid: key.is_valid(now),
            usage: key.usage(now),
        })
    }

    pub async fn reset_provider_key_usage(
        &self,
        caller: &Caller,
        id: ProviderKeyId,
    ) -> Result<ProviderKeyUsageResponse, AppError> {
        caller.require_admin()?;
        let mut key = self.get_provider_key(caller, id).await?;
        let now = self.now();
        key.reset_usage(now);
        self.repo.update_provider_key(&key).await?;
        self.audit(Some(caller), AuditAction::Update, "provider_key", id, json!({"usage": "reset"}))
            .await;
        Ok(ProviderKeyUsageResponse {
            key_id: key.id,
            is_valid: key.is_valid(now),
            usage: key.usage(now),
        })
    }
}
