//! # Mediator Hex
//!
//! Application service layer, adapters and background tasks for the
//! mediator service.
//!
//! ## Architecture
//!
//! - `service/` - Application service (orchestrates domain operations)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `outbound/` - Provider gateway (reqwest)
//! - `worker` / `monitor` - Webhook processing and provider status probes
//!
//! The service is generic over `R: Repository` and `G: ProviderGateway`,
//! allowing different adapters to be injected.

pub mod inbound;
pub mod monitor;
pub mod openapi;
pub mod outbound;
pub mod service;
pub mod worker;

#[cfg(test)]
mod service_tests;

pub use inbound::{FailurePolicy, HttpServer, RateLimiterState};
pub use monitor::ProviderMonitor;
pub use outbound::HttpProviderGateway;
pub use service::{Caller, MediatorService, ServiceSettings, WebhookDelivery};
pub use worker::{
    DEFAULT_QUEUE_CAPACITY, WebhookQueue, WebhookReceiver, WebhookWorker, webhook_queue,
};
