//! Provider webhook intake and administration.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::{Map, Value};

use mediator_types::{ProviderGateway, ProviderWebhookId, Repository, WebhookQuery};

use super::{ApiError, AppState, parse_id};
use crate::inbound::extract::{ApiQuery, ClientIp};
use crate::service::RECORDED_HEADERS;
use crate::{Caller, WebhookDelivery};

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

fn recorded_headers(headers: &HeaderMap) -> Value {
    let recorded: Map<String, Value> = RECORDED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((name.to_string(), Value::String(value.to_string())))
        })
        .collect();
    Value::Object(recorded)
}

/// Receive a provider callback.
///
/// Authenticated by signature rather than API key. Answers 202 for a new
/// event and 200 when the `event_id` was already received.
#[tracing::instrument(skip(state, headers, body), fields(provider = %code, bytes = body.len()))]
pub async fn receive<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    Path(code): Path<String>,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = WebhookDelivery {
        signature: headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        headers: recorded_headers(&headers),
        ip_address: ip,
        body: body.to_vec(),
    };

    let (event, created) = state.service.receive_webhook(&code, delivery).await?;
    let status = if created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(event)))
}

/// List received events, filtered by provider, type, status and date range.
#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn list_webhooks<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    ApiQuery(query): ApiQuery<WebhookQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let events = state.service.list_webhooks(&caller, query).await?;
    Ok(Json(events))
}

#[tracing::instrument(skip(state, caller), fields(webhook_id = %id))]
pub async fn get_webhook<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let webhook_id: ProviderWebhookId = parse_id(&id, "webhook")?;
    let event = state.service.get_webhook(&caller, webhook_id).await?;
    Ok(Json(event))
}

/// Requeue a failed event. Only `failed` events can be retried.
#[tracing::instrument(skip(state, caller), fields(webhook_id = %id))]
pub async fn retry_webhook<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let webhook_id: ProviderWebhookId = parse_id(&id, "webhook")?;
    let event = state.service.retry_webhook(&caller, webhook_id).await?;
    Ok(Json(event))
}

/// Stop a pending or processing event from completing.
#[tracing::instrument(skip(state, caller), fields(webhook_id = %id))]
pub async fn cancel_webhook<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let webhook_id: ProviderWebhookId = parse_id(&id, "webhook")?;
    let event = state.service.cancel_webhook(&caller, webhook_id).await?;
    Ok(Json(event))
}

/// Counts and success rate over the last 24 hours.
#[tracing::instrument(skip_all, fields(caller = %caller.id()))]
pub async fn summary<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
    caller: Caller,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.service.webhook_summary(&caller).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_headers_keeps_allow_list_only() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("authorization", "Bearer secret".parse().unwrap());

        let recorded = recorded_headers(&headers);
        assert_eq!(recorded["content-type"], "application/json");
        assert!(recorded.get("authorization").is_none());
    }
}
