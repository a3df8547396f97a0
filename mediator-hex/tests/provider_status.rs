//! Status checks and transaction submission against a live stub provider.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    routing::{get, post},
};
use http_body_util::BodyExt;
use mediator_hex::{
    FailurePolicy, HttpProviderGateway, HttpServer, MediatorService, RateLimiterState,
    ServiceSettings, webhook_queue,
};
use mediator_repo::{CredentialCipher, InMemoryRepo, MemoryCounterStore};
use mediator_types::ProviderStatus;
use serde_json::{Value, json};
use tower::ServiceExt;

const PROVIDER_API_KEY: &str = "prov-test-key";
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(1);
const SLOW_RESPONSE: Duration = Duration::from_secs(3);

/// Starts a fake provider on an ephemeral port.
async fn spawn_provider() -> SocketAddr {
    async fn submit(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some(PROVIDER_API_KEY) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
        }
        let idempotency = headers
            .get("idempotency-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        (
            StatusCode::OK,
            Json(json!({"received": body["reference"], "idempotency_key": idempotency})),
        )
    }

    let app = Router::new()
        .route("/health", get(|| async { Json(json!({"ok": true})) }))
        .route(
            "/down",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(SLOW_RESPONSE).await;
                Json(json!({"ok": true}))
            }),
        )
        .route("/transactions", post(submit));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct TestApp {
    app: Router,
    service: Arc<MediatorService<InMemoryRepo, HttpProviderGateway>>,
    api_key: String,
}

async fn setup() -> TestApp {
    let (queue, _receiver) = webhook_queue(16);
    let service = Arc::new(MediatorService::new(
        InMemoryRepo::new(),
        HttpProviderGateway::new(GATEWAY_TIMEOUT).unwrap(),
        Arc::new(MemoryCounterStore::new()),
        CredentialCipher::ephemeral(),
        queue,
        ServiceSettings::default(),
    ));
    let limiter = RateLimiterState::new(
        Arc::new(MemoryCounterStore::new()),
        1_000,
        Duration::from_secs(60),
        FailurePolicy::Closed,
    );
    let app = HttpServer::new(service.clone(), limiter).router();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/bootstrap",
        None,
        Some(json!({"username": "admin", "email": "ops@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    TestApp {
        app,
        service,
        api_key: body["api_key"].as_str().unwrap().to_string(),
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

impl TestApp {
    /// Registers a provider and returns its id.
    async fn provider(&self, code: &str, base_url: &str, status_path: &str) -> String {
        let (status, body) = send(
            &self.app,
            Method::POST,
            "/api/v1/providers",
            Some(&self.api_key),
            Some(json!({
                "name": code,
                "code": code,
                "provider_type": "payment",
                "supported_currencies": ["NPR"],
                "base_url": base_url,
                "status_path": status_path,
                "auth_type": "api_key",
                "credentials": {"api_key": PROVIDER_API_KEY}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_str().unwrap().to_string()
    }

    async fn check(&self, provider_id: &str) -> Value {
        let (status, body) = send(
            &self.app,
            Method::POST,
            &format!("/api/v1/providers/{}/check_status", provider_id),
            Some(&self.api_key),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        body
    }
}

#[tokio::test]
async fn test_check_status_reports_online_and_offline() {
    let addr = spawn_provider().await;
    let t = setup().await;
    let base_url = format!("http://{}", addr);

    let healthy = t.provider("healthy", &base_url, "/health").await;
    let result = t.check(&healthy).await;
    assert_eq!(result["status"], "online");
    assert_eq!(result["is_healthy"], true);
    assert_eq!(result["http_status"], 200);

    let failing = t.provider("failing", &base_url, "/down").await;
    let result = t.check(&failing).await;
    assert_eq!(result["status"], "offline");
    assert_eq!(result["http_status"], 500);

    let unreachable = t.provider("unreachable", "http://127.0.0.1:1", "/health").await;
    let result = t.check(&unreachable).await;
    assert_eq!(result["status"], "offline");
    assert!(result["http_status"].is_null());
    assert!(result["error"].is_string());

    let (_, stored) = send(
        &t.app,
        Method::GET,
        &format!("/api/v1/providers/{}", healthy),
        Some(&t.api_key),
        None,
    )
    .await;
    assert_eq!(stored["status"], "online");
    assert!(stored["last_check_at"].is_string());
}

#[tokio::test]
async fn test_check_status_timeout_marks_offline() {
    let addr = spawn_provider().await;
    let t = setup().await;
    let base_url = format!("http://{}", addr);

    let slow = t.provider("slow", &base_url, "/slow").await;

    let result = t.check(&slow).await;
    assert_eq!(result["status"], "offline");
    assert_eq!(result["is_healthy"], false);
    assert!(result["http_status"].is_null());
    let error = result["error"].as_str().unwrap();
    assert!(error.contains("timed out"), "{}", error);
    assert!(result["latency_ms"].as_u64().unwrap() < SLOW_RESPONSE.as_millis() as u64);

    let (_, stored) = send(
        &t.app,
        Method::GET,
        &format!("/api/v1/providers/{}", slow),
        Some(&t.api_key),
        None,
    )
    .await;
    assert_eq!(stored["status"], "offline");
    assert!(stored["status_message"].is_string());
    assert!(stored["last_check_at"].is_string());
}

#[tokio::test]
async fn test_check_all_skips_deprecated_providers() {
    let addr = spawn_provider().await;
    let t = setup().await;
    let base_url = format!("http://{}", addr);

    t.provider("healthy", &base_url, "/health").await;
    let retired = t.provider("retired", &base_url, "/health").await;
    let (status, _) = send(
        &t.app,
        Method::POST,
        &format!("/api/v1/providers/{}/update_status", retired),
        Some(&t.api_key),
        Some(json!({"status": "deprecated"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let results = t.service.check_all_providers().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, ProviderStatus::Online);
}

#[tokio::test]
async fn test_submit_forwards_to_provider() {
    let addr = spawn_provider().await;
    let t = setup().await;
    let provider_id = t
        .provider("esewa", &format!("http://{}", addr), "/health")
        .await;

    let (status, key) = send(
        &t.app,
        Method::POST,
        "/api/v1/provider-keys",
        Some(&t.api_key),
        Some(json!({"provider_id": provider_id, "environment": "sandbox"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", key);
    assert!(key["secret_key"].as_str().unwrap().starts_with("sk_"));
    let key_id = key["id"].as_str().unwrap().to_string();

    let (_, tx) = send(
        &t.app,
        Method::POST,
        "/api/v1/transactions",
        Some(&t.api_key),
        Some(json!({
            "reference": "ORD-1",
            "source_system": "core-banking",
            "target_system": "esewa",
            "transaction_type": "payment",
            "amount": 150000,
            "currency": "NPR"
        })),
    )
    .await;
    let tx_id = tx["id"].as_str().unwrap();

    let (status, submitted) = send(
        &t.app,
        Method::POST,
        &format!("/api/v1/transactions/{}/submit", tx_id),
        Some(&t.api_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", submitted);
    assert_eq!(submitted["status"], "completed");
    assert_eq!(submitted["response_payload"]["received"], "ORD-1");
    assert_eq!(submitted["response_payload"]["idempotency_key"], "ORD-1");

    let (status, usage) = send(
        &t.app,
        Method::GET,
        &format!("/api/v1/provider-keys/{}/usage", key_id),
        Some(&t.api_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["daily_usage"], 1);
}
