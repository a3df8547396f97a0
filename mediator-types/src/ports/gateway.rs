//! Outbound port to external provider APIs.

use std::time::Duration;

use crate::domain::AuthMaterial;
use crate::error::GatewayError;

/// Where and how to reach one provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    /// Provider code, used to key outbound throttling.
    pub code: String,
    pub url: String,
    pub auth: AuthMaterial,
    /// Requests per minute the provider accepts.
    pub rate_limit: u32,
}

/// Observation of a status probe. Never an error: failures are unhealthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub healthy: bool,
    pub http_status: Option<u16>,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Provider response to a forwarded request.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResponse {
    pub http_status: u16,
    pub body: serde_json::Value,
}

impl ForwardResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.http_status)
    }
}

#[async_trait::async_trait]
pub trait ProviderGateway: Send + Sync + 'static {
    /// GETs the status endpoint: 2xx is healthy; any other status, timeout or
    /// transport error is unhealthy.
    async fn probe(&self, endpoint: &ProviderEndpoint) -> ProbeOutcome;

    /// POSTs a JSON payload. Non-2xx statuses are returned, not raised.
    async fn forward(
        &self,
        endpoint: &ProviderEndpoint,
        payload: &serde_json::Value,
        idempotency_key: &str,
    ) -> Result<ForwardResponse, GatewayError>;
}
