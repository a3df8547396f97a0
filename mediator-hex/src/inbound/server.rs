//! HTTP Server configuration and startup.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use mediator_types::{ProviderGateway, Repository};

use super::auth::{auth_middleware, require_auth};
use super::handlers::{
    self, AppState, accounts, admin, health, kyc, providers, transactions, users, webhooks,
};
use super::rate_limit::{RateLimiterState, rate_limit_middleware};
use crate::MediatorService;
use crate::openapi::ApiDoc;

/// Prefix of the versioned REST API.
pub const API_PREFIX: &str = "/api/v1";

/// HTTP Server for the Mediator API.
pub struct HttpServer<R: Repository, G: ProviderGateway> {
    state: Arc<AppState<R, G>>,
    rate_limiter: Arc<RateLimiterState>,
}

impl<R: Repository, G: ProviderGateway> HttpServer<R, G> {
    /// Creates a new HTTP server over a shared service.
    pub fn new(service: Arc<MediatorService<R, G>>, rate_limiter: RateLimiterState) -> Self {
        Self {
            state: Arc::new(AppState { service }),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    fn api_routes() -> Router<Arc<AppState<R, G>>> {
        Router::new()
            .route("/bootstrap", post(users::bootstrap::<R, G>))
            // Users
            .route(
                "/users",
                get(users::list_users::<R, G>).post(users::create_user::<R, G>),
            )
            .route("/users/me", get(users::me::<R, G>))
            .route(
                "/users/{id}",
                get(users::get_user::<R, G>)
                    .put(users::update_user::<R, G>)
                    .patch(users::update_user::<R, G>)
                    .delete(users::delete_user::<R, G>),
            )
            // API keys
            .route(
                "/api-keys",
                get(users::list_api_keys::<R, G>).post(users::create_api_key::<R, G>),
            )
            .route(
                "/api-keys/{id}",
                get(users::get_api_key::<R, G>).delete(users::delete_api_key::<R, G>),
            )
            .route(
                "/api-keys/{id}/regenerate",
                post(users::regenerate_api_key::<R, G>),
            )
            .route(
                "/api-keys/{id}/toggle_active",
                post(users::toggle_api_key::<R, G>),
            )
            // Transactions
            .route(
                "/transactions",
                get(transactions::list_transactions::<R, G>)
                    .post(transactions::create_transaction::<R, G>),
            )
            .route(
                "/transactions/{id}",
                get(transactions::get_transaction::<R, G>),
            )
            .route(
                "/transactions/{id}/complete",
                post(transactions::complete_transaction::<R, G>),
            )
            .route(
                "/transactions/{id}/fail",
                post(transactions::fail_transaction::<R, G>),
            )
            .route(
                "/transactions/{id}/submit",
                post(transactions::submit_transaction::<R, G>),
            )
            // Accounts
            .route(
                "/accounts",
                get(accounts::list_accounts::<R, G>).post(accounts::create_account::<R, G>),
            )
            .route(
                "/accounts/{id}",
                get(accounts::get_account::<R, G>)
                    .put(accounts::update_account::<R, G>)
                    .patch(accounts::update_account::<R, G>)
                    .delete(accounts::delete_account::<R, G>),
            )
            .route("/accounts/{id}/deposit", post(accounts::deposit::<R, G>))
            .route("/accounts/{id}/withdraw", post(accounts::withdraw::<R, G>))
            .route("/accounts/{id}/statement", get(accounts::statement::<R, G>))
            // Payment methods
            .route(
                "/payment-methods",
                get(accounts::list_payment_methods::<R, G>)
                    .post(accounts::create_payment_method::<R, G>),
            )
            .route(
                "/payment-methods/{id}",
                get(accounts::get_payment_method::<R, G>)
                    .put(accounts::update_payment_method::<R, G>)
                    .patch(accounts::update_payment_method::<R, G>)
                    .delete(accounts::delete_payment_method::<R, G>),
            )
            .route(
                "/payment-methods/{id}/deactivate",
                post(accounts::deactivate_payment_method::<R, G>),
            )
            .route(
                "/payment-methods/{id}/set_default",
                post(accounts::set_default_payment_method::<R, G>),
            )
            // KYC
            .route(
                "/kyc",
                get(kyc::list_kyc::<R, G>).post(kyc::create_kyc::<R, G>),
            )
            .route(
                "/kyc/{id}",
                get(kyc::get_kyc::<R, G>)
                    .put(kyc::update_kyc::<R, G>)
                    .patch(kyc::update_kyc::<R, G>),
            )
            .route("/kyc/{id}/verify", post(kyc::verify_kyc::<R, G>))
            .route("/kyc/{id}/reject", post(kyc::reject_kyc::<R, G>))
            // Providers
            .route(
                "/providers",
                get(providers::list_providers::<R, G>).post(providers::create_provider::<R, G>),
            )
            .route(
                "/providers/{id}",
                get(providers::get_provider::<R, G>)
                    .put(providers::update_provider::<R, G>)
                    .patch(providers::update_provider::<R, G>)
                    .delete(providers::delete_provider::<R, G>),
            )
            .route(
                "/providers/{id}/check_status",
                post(providers::check_status::<R, G>),
            )
            .route(
                "/providers/{id}/update_status",
                post(providers::update_status::<R, G>),
            )
            .route(
                "/providers/{id}/statistics",
                get(providers::statistics::<R, G>),
            )
            .route(
                "/providers/{id}/rotate_secret",
                post(providers::rotate_secret::<R, G>),
            )
            // Provider keys
            .route(
                "/provider-keys",
                get(providers::list_provider_keys::<R, G>)
                    .post(providers::create_provider_key::<R, G>),
            )
            .route(
                "/provider-keys/{id}",
                get(providers::get_provider_key::<R, G>)
                    .delete(providers::delete_provider_key::<R, G>),
            )
            .route(
                "/provider-keys/{id}/deactivate",
                post(providers::deactivate_provider_key::<R, G>),
            )
            .route(
                "/provider-keys/{id}/usage",
                get(providers::provider_key_usage::<R, G>),
            )
            .route(
                "/provider-keys/{id}/reset_usage",
                post(providers::reset_provider_key_usage::<R, G>),
            )
            // Provider webhooks
            .route("/webhooks/{provider_code}", post(webhooks::receive::<R, G>))
            .route(
                "/provider-webhooks",
                get(webhooks::list_webhooks::<R, G>),
            )
            .route(
                "/provider-webhooks/summary",
                get(webhooks::summary::<R, G>),
            )
            .route(
                "/provider-webhooks/{id}",
                get(webhooks::get_webhook::<R, G>),
            )
            .route(
                "/provider-webhooks/{id}/retry",
                post(webhooks::retry_webhook::<R, G>),
            )
            .route(
                "/provider-webhooks/{id}/cancel",
                post(webhooks::cancel_webhook::<R, G>),
            )
            // System configs
            .route(
                "/system-configs",
                get(admin::list_system_configs::<R, G>).post(admin::create_system_config::<R, G>),
            )
            .route(
                "/system-configs/{id}",
                get(admin::get_system_config::<R, G>)
                    .put(admin::update_system_config::<R, G>)
                    .patch(admin::update_system_config::<R, G>)
                    .delete(admin::delete_system_config::<R, G>),
            )
            .route(
                "/system-configs/{id}/toggle_active",
                post(admin::toggle_system_config::<R, G>),
            )
            // Audit logs
            .route("/audit-logs", get(admin::list_audit_logs::<R, G>))
            .route("/audit-logs/{id}", get(admin::get_audit_log::<R, G>))
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health::health::<R, G>))
            .route("/health/database", get(health::database::<R, G>))
            .route("/health/cache", get(health::cache::<R, G>))
            .route("/health/queue", get(health::queue::<R, G>))
            .nest(API_PREFIX, Self::api_routes())
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .fallback(handlers::not_found)
            // Last layer runs first: auth resolves the caller, the limiter
            // counts it, then unauthenticated requests are turned away.
            .layer(middleware::from_fn(require_auth))
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth_middleware::<R, G>,
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
