//! Transactions.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use mediator_types::{
    CompleteTransactionRequest, CreateTransactionRequest, FailTransactionRequest, ProviderGateway,
    Repository, TransactionId, TransactionQuery,
};

use super::{ApiError, AppState, parse_id};
use crate::Caller;
use crate::inbound::extract::{ApiJson, ApiQuery};

#[tracing::instrument(skip_all, fields(caller = %caller.id(), target = %req.target_system))]
pub async fn create_transaction<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.service.create_transaction(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// List transactions, filtered by status, source, target and type.
#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_transactions<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<TransactionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let transactions = state.service.list_transactions(&caller, query).await?;
    Ok(Json(transactions))
}

#[tracing::instrument(skip(state, caller), fields(transaction_id = %id))]
pub async fn get_transaction<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tx_id: TransactionId = parse_id(&id, "transaction")?;
    let tx = state.service.get_transaction(&caller, tx_id).await?;
    Ok(Json(tx))
}

#[tracing::instrument(skip(state, caller, req), fields(transaction_id = %id))]
pub async fn complete_transaction<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    req: Option<Json<CompleteTransactionRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let tx_id: TransactionId = parse_id(&id, "transaction")?;
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let tx = state.service.complete_transaction(&caller, tx_id, req).await?;
    Ok(Json(tx))
}

#[tracing::instrument(skip(state, caller, req), fields(transaction_id = %id))]
pub async fn fail_transaction<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<FailTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tx_id: TransactionId = parse_id(&id, "transaction")?;
    let tx = state.service.fail_transaction(&caller, tx_id, req).await?;
    Ok(Json(tx))
}

/// Forward a pending transaction to the provider named by its target system.
#[tracing::instrument(skip(state, caller), fields(transaction_id = %id))]
pub async fn submit_transaction<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tx_id: TransactionId = parse_id(&id, "transaction")?;
    let tx = state.service.submit_transaction(&caller, tx_id).await?;
    Ok(Json(tx))
}
