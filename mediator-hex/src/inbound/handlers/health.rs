//! Health endpoints: 200 when healthy, 503 otherwise.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use mediator_types::{ComponentHealth, HealthReport, HealthStatus, ProviderGateway, Repository};

use super::AppState;

fn respond<T: Serialize>(status: HealthStatus, body: T) -> Response {
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(body)).into_response()
}

fn component(health: ComponentHealth) -> Response {
    respond(health.status, health)
}

/// Overall health: database, cache and task queue.
pub async fn health<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
) -> Response {
    let report: HealthReport = state.service.health().await;
    if report.status == HealthStatus::Unhealthy {
        tracing::warn!(components = ?report.components, "Health check failed");
    }
    respond(report.status, report)
}

pub async fn database<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
) -> Response {
    component(state.service.database_health().await)
}

pub async fn cache<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
) -> Response {
    component(state.service.cache_health().await)
}

pub async fn queue<R: Repository, G: ProviderGateway>(
    State(state): State<Arc<AppState<R, G>>>,
) -> Response {
    component(state.service.queue_health().await)
}
