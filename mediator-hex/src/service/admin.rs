//! Administrator-only resources: upstream system configs and the audit trail.

use mediator_types::{
    AppError, AuditAction, AuditLog, AuditLogId, AuditQuery, AuthType, CreateSystemConfigRequest,
    ProviderGateway, Repository, SystemConfig, SystemConfigId, SystemConfigQuery,
    UpdateSystemConfigRequest,
};
use serde_json::json;

use super::{Caller, MediatorService, not_found};

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    // ─────────────────────────────────────────────────────────────────────────
    // System configs
    // ─────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, caller, req), fields(system_name = %req.system_name))]
    pub async fn create_system_config(
        &self,
        caller: &Caller,
        req: CreateSystemConfigRequest,
    ) -> Result<SystemConfig, AppError> {
        caller.require_admin()?;
        let config = SystemConfig::new(
            req.system_name,
            req.system_type,
            req.base_url,
            req.auth_type.unwrap_or(AuthType::None),
            req.timeout_seconds
                .unwrap_or(SystemConfig::DEFAULT_TIMEOUT_SECONDS),
            req.retry_count.unwrap_or(SystemConfig::DEFAULT_RETRY_COUNT),
            req.settings.unwrap_or_else(|| json!({})),
            self.now(),
        )?;
        self.repo.insert_system_config(&config).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "system_config",
            config.id,
            json!({"system_name": config.system_name}),
        )
        .await;
        Ok(config)
    }

    pub async fn list_system_configs(
        &self,
        caller: &Caller,
        query: SystemConfigQuery,
    ) -> Result<Vec<SystemConfig>, AppError> {
        caller.require_admin()?;
        self.repo
            .list_system_configs(&query)
            .await
            .map_err(Into::into)
    }

    pub async fn get_system_config(
        &self,
        caller: &Caller,
        id: SystemConfigId,
    ) -> Result<SystemConfig, AppError> {
        caller.require_admin()?;
        self.repo
            .get_system_config(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| not_found("System config", id)))
    }

    #[tracing::instrument(skip(self, caller, req), fields(config_id = %id))]
    pub async fn update_system_config(
        &self,
        caller: &Caller,
        id: SystemConfigId,
        req: UpdateSystemConfigRequest,
    ) -> Result<SystemConfig, AppError> {
        let mut config = self.get_system_config(caller, id).await?;
        if let Some(system_type) = req.system_type {
            config.system_type = system_type;
        }
        if let Some(base_url) = req.base_url.as_deref() {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(auth_type) = req.auth_type {
            config.auth_type = auth_type;
        }
        if let Some(timeout_seconds) = req.timeout_seconds {
            config.timeout_seconds = timeout_seconds;
        }
        if let Some(retry_count) = req.retry_count {
            config.retry_count = retry_count;
        }
        if let Some(settings) = req.settings.clone() {
            config.settings = settings;
        }
        if let Some(is_active) = req.is_active {
            config.is_active = is_active;
        }
        config.validate()?;
        config.updated_at = self.now();

        self.repo.update_system_config(&config).await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "system_config",
            config.id,
            json!({"system_name": config.system_name}),
        )
        .await;
        Ok(config)
    }

    pub async fn delete_system_config(
        &self,
        caller: &Caller,
        id: SystemConfigId,
    ) -> Result<(), AppError> {
        caller.require_admin()?;
        if !self.repo.delete_system_config(id).await? {
            return Err(not_found("System config", id));
        }
        self.audit(Some(caller), AuditAction::Delete, "system_config", id, json!({}))
            .await;
        Ok(())
    }

    pub async fn toggle_system_config(
        &self,
        caller: &Caller,
        id: SystemConfigId,
    ) -> Result<SystemConfig, AppError> {
        let mut config = self.get_system_config(caller, id).await?;
        config.toggle_active(self.now());
        self.repo.update_system_config(&config).await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "system_config",
            id,
            json!({"is_active": config.is_active}),
        )
        .await;
        Ok(config)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit logs
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_audit_logs(
        &self,
        caller: &Caller,
        query: AuditQuery,
    ) -> Result<Vec<AuditLog>, AppError> {
        caller.require_admin()?;
        self.repo.list_audit_logs(&query).await.map_err(Into::into)
    }

    pub async fn get_audit_log(&self, caller: &Caller, id: AuditLogId) -> Result<AuditLog, AppError> {
        caller.require_admin()?;
        self.repo
            .get_audit_log(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| not_found("Audit log", id)))
    }
}
