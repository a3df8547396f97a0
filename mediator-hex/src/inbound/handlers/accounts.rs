//! Bank accounts and payment methods.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use mediator_types::{
    AccountQuery, ActionMessage, BankAccountId, CreateAccountRequest, CreatePaymentMethodRequest,
    MovementRequest, PaymentMethodId, PaymentMethodQuery, ProviderGateway, Repository,
    StatementQuery, UpdateAccountRequest, UpdatePaymentMethodRequest,
};

use super::{ApiError, AppState, parse_id};
use crate::Caller;
use crate::inbound::extract::{ApiJson, ApiQuery};

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn create_account<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state.service.create_account(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_accounts<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<AccountQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.service.list_accounts(&caller, query).await?;
    Ok(Json(accounts))
}

#[tracing::instrument(skip(state, caller), fields(account_id = %id))]
pub async fn get_account<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id: BankAccountId = parse_id(&id, "account")?;
    let account = state.service.get_account(&caller, account_id).await?;
    Ok(Json(account))
}

#[tracing::instrument(skip(state, caller, req), fields(account_id = %id))]
pub async fn update_account<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id: BankAccountId = parse_id(&id, "account")?;
    let account = state.service.update_account(&caller, account_id, req).await?;
    Ok(Json(account))
}

/// Accounts keep their ledger; DELETE deactivates.
#[tracing::instrument(skip(state, caller), fields(account_id = %id))]
pub async fn delete_account<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id: BankAccountId = parse_id(&id, "account")?;
    let account = state.service.deactivate_account(&caller, account_id).await?;
    Ok(Json(account))
}

/// Deposit money into an account.
#[tracing::instrument(skip(state, caller, req), fields(account_id = %id, amount = req.amount))]
pub async fn deposit<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<MovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id: BankAccountId = parse_id(&id, "account")?;
    let movement = state.service.deposit(&caller, account_id, req).await?;
    Ok(Json(movement))
}

/// Withdraw money from an account.
#[tracing::instrument(skip(state, caller, req), fields(account_id = %id, amount = req.amount))]
pub async fn withdraw<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<MovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id: BankAccountId = parse_id(&id, "account")?;
    let movement = state.service.withdraw(&caller, account_id, req).await?;
    Ok(Json(movement))
}

/// Account with its most recent ledger entries.
#[tracing::instrument(skip(state, caller, query), fields(account_id = %id))]
pub async fn statement<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<StatementQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let account_id: BankAccountId = parse_id(&id, "account")?;
    let statement = state
        .service
        .statement(&caller, account_id, query.limit)
        .await?;
    Ok(Json(statement))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payment methods
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip_all, fields(caller = %caller.id(), provider = %req.provider))]
pub async fn create_payment_method<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiJson(req): ApiJson<CreatePaymentMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let method = state.service.create_payment_method(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(method)))
}

#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_payment_methods<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<PaymentMethodQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let methods = state.service.list_payment_methods(&caller, query).await?;
    Ok(Json(methods))
}

#[tracing::instrument(skip(state, caller), fields(payment_method_id = %id))]
pub async fn get_payment_method<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let method_id: PaymentMethodId = parse_id(&id, "payment method")?;
    let method = state.service.get_payment_method(&caller, method_id).await?;
    Ok(Json(method))
}

#[tracing::instrument(skip(state, caller, req), fields(payment_method_id = %id))]
pub async fn update_payment_method<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdatePaymentMethodRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let method_id: PaymentMethodId = parse_id(&id, "payment method")?;
    let method = state
        .service
        .update_payment_method(&caller, method_id, req)
        .await?;
    Ok(Json(method))
}

#[tracing::instrument(skip(state, caller), fields(payment_method_id = %id))]
pub async fn delete_payment_method<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let method_id: PaymentMethodId = parse_id(&id, "payment method")?;
    state
        .service
        .delete_payment_method(&caller, method_id)
        .await?;
    Ok(Json(ActionMessage {
        message: "Payment method deleted".into(),
    }))
}

#[tracing::instrument(skip(state, caller), fields(payment_method_id = %id))]
pub async fn deactivate_payment_method<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let method_id: PaymentMethodId = parse_id(&id, "payment method")?;
    let method = state
        .service
        .deactivate_payment_method(&caller, method_id)
        .await?;
    Ok(Json(method))
}

/// Make this the owner's default method; any previous default is cleared.
#[tracing::instrument(skip(state, caller), fields(payment_method_id = %id))]
pub async fn set_default_payment_method<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let method_id: PaymentMethodId = parse_id(&id, "payment method")?;
    let method = state
        .service
        .set_default_payment_method(&caller, method_id)
        .await?;
    Ok(Json(method))
}
