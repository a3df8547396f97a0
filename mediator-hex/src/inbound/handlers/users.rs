//! Bootstrap, users and API keys.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use mediator_types::{
    ApiKeyId, BootstrapRequest, CreateApiKeyRequest, CreateUserRequest, ProviderGateway,
    Repository, UpdateUserRequest, UserId, UserQuery,
};

use super::{ApiError, AppState, parse_id};
use crate::Caller;
use crate::inbound::extract::{ApiJson, ApiQuery, ClientIp};

/// Bootstrap the system by creating the first administrator and API key.
///
/// Only works while no users exist. The raw key is returned once.
#[tracing::instrument(skip_all, fields(username = %req.username))]
pub async fn bootstrap<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    ClientIp(ip): ClientIp,
    ApiJson(req): ApiJson<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.service.bootstrap(req, ip).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn create_user<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.service.create_user(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_users<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.service.list_users(&caller, query).await?;
    Ok(Json(users))
}

/// The authenticated user.
#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn me<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.service.me(&caller).await?;
    Ok(Json(user))
}

#[tracing::instrument(skip(state, caller), fields(user_id = %id))]
pub async fn get_user<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id: UserId = parse_id(&id, "user")?;
    let user = state.service.get_user(&caller, user_id).await?;
    Ok(Json(user))
}

#[tracing::instrument(skip(state, caller, req), fields(user_id = %id))]
pub async fn update_user<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id: UserId = parse_id(&id, "user")?;
    let user = state.service.update_user(&caller, user_id, req).await?;
    Ok(Json(user))
}

/// Users are never hard-deleted; DELETE deactivates.
#[tracing::instrument(skip(state, caller), fields(user_id = %id))]
pub async fn delete_user<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id: UserId = parse_id(&id, "user")?;
    let user = state.service.deactivate_user(&caller, user_id).await?;
    Ok(Json(user))
}

// ─────────────────────────────────────────────────────────────────────────────
// API keys
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeyQuery {
    pub user_id: Option<UserId>,
}

#[tracing::instrument(skip_all, fields(caller = %caller.id(), name = %req.name))]
pub async fn create_api_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let key = state.service.create_api_key(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_api_keys<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<ApiKeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let keys = state.service.list_api_keys(&caller, query.user_id).await?;
    Ok(Json(keys))
}

#[tracing::instrument(skip(state, caller), fields(api_key_id = %id))]
pub async fn get_api_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ApiKeyId = parse_id(&id, "API key")?;
    let key = state.service.get_api_key(&caller, key_id).await?;
    Ok(Json(key))
}

/// Revoke an API key. The row is kept, inactive.
#[tracing::instrument(skip(state, caller), fields(api_key_id = %id))]
pub async fn delete_api_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ApiKeyId = parse_id(&id, "API key")?;
    let key = state.service.deactivate_api_key(&caller, key_id).await?;
    Ok(Json(key))
}

/// Issue a new secret for an existing key. The old secret stops working.
#[tracing::instrument(skip(state, caller), fields(api_key_id = %id))]
pub async fn regenerate_api_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ApiKeyId = parse_id(&id, "API key")?;
    let key = state.service.regenerate_api_key(&caller, key_id).await?;
    Ok(Json(key))
}

#[tracing::instrument(skip(state, caller), fields(api_key_id = %id))]
pub async fn toggle_api_key<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key_id: ApiKeyId = parse_id(&id, "API key")?;
    let key = state.service.toggle_api_key(&caller, key_id).await?;
    Ok(Json(key))
}
