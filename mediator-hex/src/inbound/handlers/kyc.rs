//! KYC profiles.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use mediator_types::{
    KycProfileId, KycQuery, KycRequest, ProviderGateway, RejectKycRequest, Repository,
};

use super::{ApiError, AppState, parse_id};
use crate::Caller;
use crate::inbound::extract::{ApiJson, ApiQuery};

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn create_kyc<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<KycRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state.service.create_kyc(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_kyc<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<KycQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let profiles = state.service.list_kyc(&caller, query).await?;
    Ok(Json(profiles))
}

#[tracing::instrument(skip(state, caller), fields(kyc_id = %id))]
pub async fn get_kyc<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kyc_id: KycProfileId = parse_id(&id, "KYC profile")?;
    let profile = state.service.get_kyc(&caller, kyc_id).await?;
    Ok(Json(profile))
}

/// Amend a profile that is still pending review.
#[tracing::instrument(skip(state, caller, req), fields(kyc_id = %id))]
pub async fn update_kyc<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<KycRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kyc_id: KycProfileId = parse_id(&id, "KYC profile")?;
    let profile = state.service.update_kyc(&caller, kyc_id, req).await?;
    Ok(Json(profile))
}

#[tracing::instrument(skip(state, caller), fields(kyc_id = %id))]
pub async fn verify_kyc<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let kyc_id: KycProfileId = parse_id(&id, "KYC profile")?;
    let profile = state.service.verify_kyc(&caller, kyc_id).await?;
    Ok(Json(profile))
}

#[tracing::instrument(skip(state, caller, req), fields(kyc_id = %id))]
pub async fn reject_kyc<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RejectKycRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let kyc_id: KycProfileId = parse_id(&id, "KYC profile")?;
    let profile = state.service.reject_kyc(&caller, kyc_id, req.reason).await?;
    Ok(Json(profile))
}
