//! # Mediator Types
//!
//! Domain types and port traits for the financial mediator service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Entities and their state machines (transactions, providers, webhooks, ...)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::*;
pub use dto::*;
pub use error::{AppError, CounterStoreError, DomainError, GatewayError, RepoError};
pub use ports::*;
