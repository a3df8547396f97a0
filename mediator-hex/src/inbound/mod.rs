//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer.

mod auth;
mod extract;
pub mod handlers;
pub mod rate_limit;
mod server;

pub use extract::{ApiJson, ApiQuery, ClientIp};
pub use handlers::{ApiError, AppState};
pub use rate_limit::{FailurePolicy, RateLimiterState};
pub use server::HttpServer;
