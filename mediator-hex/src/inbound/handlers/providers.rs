//! Providers and provider keys.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use mediator_types::{
    ActionMessage, CreateProviderKeyRequest, CreateProviderRequest, ProviderGateway, ProviderId,
    ProviderKeyId, ProviderKeyQuery, ProviderQuery, Repository, UpdateProviderRequest,
    UpdateStatusRequest,
};

use super::{ApiError, AppState, parse_id};
use crate::Caller;
use crate::inbound::extract::{ApiJson, ApiQuery};

// ─────────────────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────────────────

/// Register a provider. The webhook signing secret is returned once.
#[tracing::instrument(skip_all, fields(caller = %caller.id(), code = %req.code))]
pub async fn create_provider<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateProviderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.create_provider(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List providers, filtered by type, status and active flag.
#[tracing::instrument(skip(state))]
pub async fn list_providers<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    ApiQuery(query): ApiQuery<ProviderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let providers = state.service.list_providers(query).await?;
    Ok(Json(providers))
}

#[tracing::instrument(skip(state), fields(provider_id = %id))]
pub async fn get_provider<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_id: ProviderId = parse_id(&id, "provider")?;
    let provider = state.service.get_provider(provider_id).await?;
    Ok(Json(provider))
}

#[tracing::instrument(skip(state, caller, req), fields(provider_id = %id))]
pub async fn update_provider<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateProviderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_id: ProviderId = parse_id(&id, "provider")?;
    let provider = state
        .service
        .update_provider(&caller, provider_id, req)
        .await?;
    Ok(Json(provider))
}

#[tracing::instrument(skip(state, caller), fields(provider_id = %id))]
pub async fn delete_provider<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_id: ProviderId = parse_id(&id, "provider")?;
    state.service.delete_provider(&caller, provider_id).await?;
    Ok(Json(ActionMessage {
        message: "Provider deleted".into(),
    }))
}

/// Probe the provider's status endpoint now and persist the outcome.
#[tracing::instrument(skip(state, caller), fields(provider_id = %id))]
pub async fn check_status<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_id: ProviderId = parse_id(&id, "provider")?;
    let result = state.service.check_status(&caller, provider_id).await?;
    Ok(Json(result))
}

#[tracing::instrument(skip(state, caller, req), fields(provider_id = %id, status = %req.status))]
pub async fn update_status<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_id: ProviderId = parse_id(&id, "provider")?;
    let provider = state
        .service
        .update_provider_status(&caller, provider_id, req)
        .await?;
    Ok(Json(provider))
}

#[tracing::instrument(skip(state), fields(provider_id = %id))]
pub async fn statistics<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_id: ProviderId = parse_id(&id, "provider")?;
    let stats = state.service.provider_statistics(provider_id).await?;
    Ok(Json(stats))
}

/// Replace the webhook signing secret. The new secret is returned once.
#[tracing::instrument(skip(state, caller), fields(provider_id = %id))]
pub async fn rotate_secret<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider_id: ProviderId = parse_id(&id, "provider")?;
    let secret = state
        .service
        .rotate_webhook_secret(&caller, provider_id)
        .await?;
    Ok(Json(secret))
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider keys
// ─────────────────────────────────────────────────────────────────────────────

/// Issue a provider key. The secret half is returned once.
#[tracing::instrument(skip_all, fields(caller = %caller.id(), provider_id = %req.provider_id))]
pub async fn create_provider_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateProviderKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = state.service.create_provider_key(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_provider_keys<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ProviderKeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state.service.list_provider_keys(&caller, query).await?;
    Ok(Json(keys))
}

#[tracing::instrument(skip(state, caller), fields(provider_key_id = %id))]
pub async fn get_provider_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ProviderKeyId = parse_id(&id, "provider key")?;
    let key = state.service.get_provider_key(&caller, key_id).await?;
    Ok(Json(key))
}

#[tracing::instrument(skip(state, caller), fields(provider_key_id = %id))]
pub async fn delete_provider_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ProviderKeyId = parse_id(&id, "provider key")?;
    state.service.delete_provider_key(&caller, key_id).await?;
    Ok(Json(ActionMessage {
        message: "Provider key deleted".into(),
    }))
}

#[tracing::instrument(skip(state, caller), fields(provider_key_id = %id))]
pub async fn deactivate_provider_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ProviderKeyId = parse_id(&id, "provider key")?;
    let key = state
        .service
        .deactivate_provider_key(&caller, key_id)
        .await?;
    Ok(Json(key))
}

/// Daily and monthly usage against the key's limits.
#[tracing::instrument(skip(state, caller), fields(provider_key_id = %id))]
pub async fn provider_key_usage<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ProviderKeyId = parse_id(&id, "provider key")?;
    let usage = state.service.provider_key_usage(&caller, key_id).await?;
    Ok(Json(usage))
}

#[tracing::instrument(skip(state, caller), fields(provider_key_id = %id))]
pub async fn reset_provider_key_usage<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ProviderKeyId = parse_id(&id, "provider key")?;
    let usage = state
        .service
        .reset_provider_key_usage(&caller, key_id)
        .await?;
    Ok(Json(usage))
}
