//! Provider gateway over reqwest with per-provider outbound throttling.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::RequestBuilder;

use mediator_types::{
    AuthMaterial, ForwardResponse, GatewayError, ProbeOutcome, ProviderEndpoint, ProviderGateway,
};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiter for one provider, rebuilt when its configured rate changes.
struct ProviderLimiter {
    per_minute: u32,
    limiter: DirectLimiter,
}

pub struct HttpProviderGateway {
    client: reqwest::Client,
    timeout: Duration,
    limiters: DashMap<String, Arc<ProviderLimiter>>,
}

impl HttpProviderGateway {
    /// Creates a gateway whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mediator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            client,
            timeout,
            limiters: DashMap::new(),
        })
    }

    /// Takes one outbound permit for the provider.
    fn acquire(&self, endpoint: &ProviderEndpoint) -> Result<(), GatewayError> {
        let per_minute = NonZeroU32::new(endpoint.rate_limit).ok_or_else(|| {
            GatewayError::InvalidConfig(format!(
                "Provider {} has no outbound rate limit",
                endpoint.code
            ))
        })?;

        let limiter = {
            let mut entry = self
                .limiters
                .entry(endpoint.code.clone())
                .or_insert_with(|| Arc::new(ProviderLimiter::new(per_minute)));
            if entry.per_minute != per_minute.get() {
                *entry = Arc::new(ProviderLimiter::new(per_minute));
            }
            entry.clone()
        };

        limiter
            .limiter
            .check()
            .map_err(|_| GatewayError::Throttled {
                provider: endpoint.code.clone(),
            })
    }

    fn classify(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout.as_millis() as u64)
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl ProviderLimiter {
    fn new(per_minute: NonZeroU32) -> Self {
        Self {
            per_minute: per_minute.get(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }
}

fn authorize(request: RequestBuilder, auth: &AuthMaterial) -> RequestBuilder {
    match auth {
        AuthMaterial::None => request,
        AuthMaterial::ApiKey(key) => request.header("X-API-Key", key),
        AuthMaterial::Bearer(token) => request.bearer_auth(token),
        AuthMaterial::Basic { username, password } => request.basic_auth(username, Some(password)),
    }
}

#[async_trait]
impl ProviderGateway for HttpProviderGateway {
    #[tracing::instrument(skip(self, endpoint), fields(provider = %endpoint.code, url = %endpoint.url))]
    async fn probe(&self, endpoint: &ProviderEndpoint) -> ProbeOutcome {
        let started = Instant::now();
        let result = authorize(self.client.get(&endpoint.url), &endpoint.auth)
            .send()
            .await;
        let latency = started.elapsed();

        match result {
            Ok(response) if response.status().is_success() => ProbeOutcome {
                healthy: true,
                http_status: Some(response.status().as_u16()),
                latency,
                error: None,
            },
            Ok(response) => ProbeOutcome {
                healthy: false,
                http_status: Some(response.status().as_u16()),
                latency,
                error: Some(format!("HTTP {}", response.status())),
            },
            Err(e) => ProbeOutcome {
                healthy: false,
                http_status: None,
                latency,
                error: Some(self.classify(e).to_string()),
            },
        }
    }

    #[tracing::instrument(skip(self, endpoint, payload), fields(provider = %endpoint.code))]
    async fn forward(
        &self,
        endpoint: &ProviderEndpoint,
        payload: &serde_json::Value,
        idempotency_key: &str,
    ) -> Result<ForwardResponse, GatewayError> {
        self.acquire(endpoint)?;

        let response = authorize(self.client.post(&endpoint.url), &endpoint.auth)
            .header("Idempotency-Key", idempotency_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let http_status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.classify(e))?;
        let body = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };

        tracing::debug!(http_status, "Provider responded");
        Ok(ForwardResponse { http_status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(rate_limit: u32) -> ProviderEndpoint {
        ProviderEndpoint {
            code: "esewa".into(),
            url: "http://127.0.0.1:9/pay".into(),
            auth: AuthMaterial::None,
            rate_limit,
        }
    }

    #[test]
    fn test_acquire_throttles_after_quota() {
        let gateway = HttpProviderGateway::new(Duration::from_secs(1)).unwrap();
        let endpoint = endpoint(2);
        assert!(gateway.acquire(&endpoint).is_ok());
        assert!(gateway.acquire(&endpoint).is_ok());
        assert!(matches!(
            gateway.acquire(&endpoint),
            Err(GatewayError::Throttled { provider }) if provider == "esewa"
        ));
    }

    #[test]
    fn test_rate_change_rebuilds_limiter() {
        let gateway = HttpProviderGateway::new(Duration::from_secs(1)).unwrap();
        assert!(gateway.acquire(&endpoint(1)).is_ok());
        assert!(gateway.acquire(&endpoint(1)).is_err());
        assert!(gateway.acquire(&endpoint(5)).is_ok());
    }

    #[test]
    fn test_zero_rate_is_invalid() {
        let gateway = HttpProviderGateway::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            gateway.acquire(&endpoint(0)),
            Err(GatewayError::InvalidConfig(_))
        ));
    }
}
