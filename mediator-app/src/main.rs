//! # Mediator Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Create the mediator service
//! - Pick the rate-limit counter store (Redis or in-process)
//! - Start the webhook worker, provider monitor and counter cleanup
//! - Start the HTTP server

mod config;

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use mediator_hex::{
    DEFAULT_QUEUE_CAPACITY, HttpProviderGateway, HttpServer, MediatorService, ProviderMonitor,
    RateLimiterState, ServiceSettings, WebhookWorker, webhook_queue,
};
use mediator_repo::{CredentialCipher, InMemoryRepo, MemoryCounterStore, RedisCounterStore};
use mediator_types::{CounterStore, Repository};

use config::{Config, LogFormat};

const DEFAULT_LOG_FILTER: &str = "info,mediator_app=debug,mediator_hex=debug,mediator_repo=debug";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Starting mediator server on port {}", config.port);
    tracing::info!(backend = %config.backend(), "Using database");

    let cipher = config.credential_cipher()?;
    if config.uses_memory_backend() {
        tracing::warn!("In-memory storage selected; all data is lost on restart");
        serve(InMemoryRepo::new(), cipher, &config).await
    } else {
        serve_sql(cipher, &config).await
    }
}

#[cfg(any(feature = "postgres", feature = "sqlite"))]
async fn serve_sql(cipher: CredentialCipher, config: &Config) -> anyhow::Result<()> {
    // Connects and applies migrations
    let repo = mediator_repo::build_sql_repo(&config.database_url).await?;
    serve(repo, cipher, config).await
}

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
async fn serve_sql(_cipher: CredentialCipher, config: &Config) -> anyhow::Result<()> {
    anyhow::bail!(
        "DATABASE_URL scheme '{}' needs the postgres or sqlite feature; use {} otherwise",
        config.backend(),
        mediator_repo::MEMORY_URL
    )
}

/// Builds the service over `repo`, starts the background tasks and serves
/// HTTP until shutdown.
async fn serve<R: Repository>(
    repo: R,
    cipher: CredentialCipher,
    config: &Config,
) -> anyhow::Result<()> {
    let gateway = HttpProviderGateway::new(config.provider_timeout)?;
    let counters = counter_store(config)?;
    let (queue, receiver) = webhook_queue(DEFAULT_QUEUE_CAPACITY);
    let settings = ServiceSettings {
        provider_environment: config.provider_environment,
        webhook_poll_interval: config.webhook_poll_interval,
        webhook_lease: config.webhook_lease,
    };

    let service = Arc::new(MediatorService::new(
        repo,
        gateway,
        counters.clone(),
        cipher,
        queue,
        settings,
    ));

    tokio::spawn(WebhookWorker::new(service.clone(), receiver, config.webhook_poll_interval).run());
    if config.provider_check_interval.is_zero() {
        tracing::info!("Provider monitor disabled");
    } else {
        tokio::spawn(ProviderMonitor::new(service.clone(), config.provider_check_interval).run());
    }

    let rate_limiter = RateLimiterState::new(
        counters,
        config.rate_limit_requests,
        config.rate_limit_window,
        config.rate_limit_failure_policy,
    );
    tracing::info!(
        limit = config.rate_limit_requests,
        window_secs = config.rate_limit_window.as_secs(),
        policy = %config.rate_limit_failure_policy,
        "Rate limiting enabled"
    );

    let server = HttpServer::new(service, rate_limiter);
    let addr = format!("0.0.0.0:{}", config.port);
    server.run(&addr).await
}

/// Redis when `REDIS_URL` is set, so every instance shares the same windows;
/// otherwise in-process counters with a purge task.
fn counter_store(config: &Config) -> anyhow::Result<Arc<dyn CounterStore>> {
    match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis for rate-limit counters");
            Ok(Arc::new(RedisCounterStore::new(
                url,
                RedisCounterStore::DEFAULT_TIMEOUT,
            )?))
        }
        None => {
            tracing::info!("Using in-process rate-limit counters");
            let store = Arc::new(MemoryCounterStore::new());
            tokio::spawn(purge_counters(store.clone(), config.rate_limit_window));
            Ok(store)
        }
    }
}

/// Drops expired rate-limit windows once per window.
async fn purge_counters(store: Arc<MemoryCounterStore>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let removed = store.purge_expired();
        if removed > 0 {
            tracing::debug!(removed, "Purged expired rate-limit windows");
        }
    }
}
