//! System configurations and audit logs (administrators only).

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use mediator_types::{
    ActionMessage, AuditLogId, AuditQuery, CreateSystemConfigRequest, ProviderGateway, Repository,
    SystemConfigId, SystemConfigQuery, UpdateSystemConfigRequest,
};

use super::{ApiError, AppState, parse_id};
use crate::Caller;
use crate::inbound::extract::{ApiJson, ApiQuery};

// ─────────────────────────────────────────────────────────────────────────────
// System configs
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all, fields(caller = %caller.id(), system = %req.system_name))]
pub async fn create_system_config<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateSystemConfigRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.service.create_system_config(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_system_configs<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<SystemConfigQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let configs = state.service.list_system_configs(&caller, query).await?;
    Ok(Json(configs))
}

#[tracing::instrument(skip(state, caller), fields(config_id = %id))]
pub async fn get_system_config<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let config_id: SystemConfigId = parse_id(&id, "system config")?;
    let config = state.service.get_system_config(&caller, config_id).await?;
    Ok(Json(config))
}

#[tracing::instrument(skip(state, caller, req), fields(config_id = %id))]
pub async fn update_system_config<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateSystemConfigRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config_id: SystemConfigId = parse_id(&id, "system config")?;
    let config = state
        .service
        .update_system_config(&caller, config_id, req)
        .await?;
    Ok(Json(config))
}

#[tracing::instrument(skip(state, caller), fields(config_id = %id))]
pub async fn delete_system_config<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let config_id: SystemConfigId = parse_id(&id, "system config")?;
    state
        .service
        .delete_system_config(&caller, config_id)
        .await?;
    Ok(Json(ActionMessage {
        message: "System config deleted".into(),
    }))
}

#[tracing::instrument(skip(state, caller), fields(config_id = %id))]
pub async fn toggle_system_config<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let config_id: SystemConfigId = parse_id(&id, "system config")?;
    let config = state
        .service
        .toggle_system_config(&caller, config_id)
        .await?;
    Ok(Json(config))
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit logs
// ─────────────────────────────────────────────────────────────────────────────

/// List audit entries, newest first (default 100, at most 500).
#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_audit_logs<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let logs = state.service.list_audit_logs(&caller, query).await?;
    Ok(Json(logs))
}

#[tracing::instrument(skip(state, caller), fields(audit_log_id = %id))]
pub async fn get_audit_log<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let log_id: AuditLogId = parse_id(&id, "audit log")?;
    let log = state.service.get_audit_log(&caller, log_id).await?;
    Ok(Json(log))
}
