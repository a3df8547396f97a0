//! HTTP Outbound Adapter
//!
//! reqwest-based implementation of the provider gateway port.

mod provider_client;

pub use provider_client::HttpProviderGateway;
