//! Drives a live server over TCP through the client SDK.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mediator_client::{ClientError, MediatorClient};
use mediator_hex::{
    FailurePolicy, HttpProviderGateway, HttpServer, MediatorService, RateLimiterState,
    ServiceSettings, webhook_queue,
};
use mediator_repo::{CredentialCipher, InMemoryRepo, MemoryCounterStore};
use mediator_types::{
    AccountType, CreateAccountRequest, CurrencyCode, HealthStatus, MovementRequest,
};

async fn spawn_server() -> String {
    let counters = Arc::new(MemoryCounterStore::new());
    let (queue, _receiver) = webhook_queue(16);
    let service = Arc::new(MediatorService::new(
        InMemoryRepo::new(),
        HttpProviderGateway::new(Duration::from_secs(2)).unwrap(),
        counters.clone(),
        CredentialCipher::ephemeral(),
        queue,
        ServiceSettings::default(),
    ));
    let limiter = RateLimiterState::new(
        counters,
        1_000,
        Duration::from_secs(60),
        FailurePolicy::Closed,
    );
    let router = HttpServer::new(service, limiter).router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    format!("http://{}", addr)
}

fn npr() -> CurrencyCode {
    "NPR".parse().unwrap()
}

#[tokio::test]
async fn test_bootstrap_and_account_flow() {
    let base_url = spawn_server().await;
    let anonymous = MediatorClient::new(&base_url);

    // No worker is running, so the report comes back as a 503 body.
    let health = anonymous.health().await.unwrap();
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert_eq!(health.components["database"].status, HealthStatus::Healthy);
    assert_eq!(health.components["queue"].status, HealthStatus::Unhealthy);

    let created = anonymous
        .bootstrap("admin", "ops@example.com")
        .await
        .unwrap();
    assert!(created.api_key.starts_with("mk_"));

    let err = anonymous
        .bootstrap("again", "again@example.com")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    let client = MediatorClient::new(&base_url).with_api_key(&created.api_key);
    let me = client.me().await.unwrap();
    assert_eq!(me.username, "admin");

    let account = client
        .create_account(&CreateAccountRequest {
            account_number: "0012345678".into(),
            bank_name: "Nabil Bank".into(),
            holder_name: "Alice Sharma".into(),
            account_type: AccountType::Savings,
            currency: npr(),
            user_id: None,
        })
        .await
        .unwrap();
    assert_eq!(account.balance, 0);

    let deposit = client
        .deposit(
            account.id,
            &MovementRequest {
                amount: 5_000,
                currency: npr(),
                reference: Some("DEP-1".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(deposit.balance, 5_000);
    assert_eq!(deposit.transaction.reference, "DEP-1");

    let err = client
        .withdraw(
            account.id,
            &MovementRequest {
                amount: 9_000,
                currency: npr(),
                reference: None,
            },
        )
        .await
        .unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("Insufficient funds"), "{}", message);
        }
        other => panic!("expected API error, got {:?}", other),
    }

    let statement = client.statement(account.id).await.unwrap();
    assert_eq!(statement.account.balance, 5_000);
    assert_eq!(statement.transactions.len(), 1);
}

#[tokio::test]
async fn test_missing_key_is_unauthorized() {
    let base_url = spawn_server().await;
    let client = MediatorClient::new(&base_url);

    let err = client.me().await.unwrap_err();
    assert_eq!(err.status(), Some(401));

    let err = MediatorClient::new(&base_url)
        .with_api_key("mk_not-a-real-key")
        .me()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}
