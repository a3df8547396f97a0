//! Mediator Application Service
//!
//! Orchestrates domain operations through the repository and gateway ports.
//! Contains NO transport logic: handlers and background tasks call in here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mediator_repo::CredentialCipher;
use mediator_types::{
    AppError, AuditAction, AuditLog, CounterStore, Environment, ProviderGateway, Repository, User,
    UserId,
};

use crate::worker::WebhookQueue;

mod accounts;
mod admin;
mod health;
mod kyc;
mod providers;
mod transactions;
mod users;
mod webhooks;

pub use webhooks::{RECORDED_HEADERS, WebhookDelivery};

/// Tunables that are not part of any single request.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Environment whose provider keys authorize transaction submission.
    pub provider_environment: Environment,
    /// Interval at which the webhook worker ticks; the queue is reported
    /// unhealthy when no tick happened within three intervals.
    pub webhook_poll_interval: Duration,
    /// How long a claimed webhook may stay `processing` before the sweep
    /// hands it to another worker.
    pub webhook_lease: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            provider_environment: Environment::Sandbox,
            webhook_poll_interval: Duration::from_millis(1000),
            webhook_lease: Duration::from_secs(300),
        }
    }
}

/// The authenticated user behind a request, with the client address used
/// for audit records.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: User,
    pub ip_address: Option<String>,
}

impl Caller {
    pub fn new(user: User, ip_address: Option<String>) -> Self {
        Self { user, ip_address }
    }

    pub fn id(&self) -> UserId {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    pub(crate) fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Administrator role required".into()))
        }
    }

    /// Owner for a new record: the caller, or anyone when an admin asks.
    pub(crate) fn owner_for(&self, requested: Option<UserId>) -> Result<UserId, AppError> {
        match requested {
            Some(id) if id != self.id() => {
                self.require_admin()?;
                Ok(id)
            }
            _ => Ok(self.id()),
        }
    }

    /// Restricts list filters to the caller's own records unless admin.
    pub(crate) fn scope(&self, requested: Option<UserId>) -> Option<UserId> {
        if self.is_admin() {
            requested
        } else {
            Some(self.id())
        }
    }

    /// Other users' records are reported as missing rather than forbidden.
    pub(crate) fn can_see(&self, owner: UserId) -> bool {
        self.is_admin() || owner == self.id()
    }
}

/// Application service for the mediator.
///
/// Generic over the storage adapter `R` and the outbound provider gateway
/// `G`; both are injected at compile time.
pub struct MediatorService<R: Repository, G: ProviderGateway> {
    repo: R,
    gateway: G,
    counters: Arc<dyn CounterStore>,
    cipher: CredentialCipher,
    queue: WebhookQueue,
    settings: ServiceSettings,
}

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    pub fn new(
        repo: R,
        gateway: G,
        counters: Arc<dyn CounterStore>,
        cipher: CredentialCipher,
        queue: WebhookQueue,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            repo,
            gateway,
            counters,
            cipher,
            queue,
            settings,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Appends an audit entry. The change it describes is already stored, so
    /// a failed append is logged rather than surfaced to the caller.
    async fn audit(
        &self,
        caller: Option<&Caller>,
        action: AuditAction,
        resource_type: &str,
        resource_id: impl ToString,
        details: serde_json::Value,
    ) {
        let entry = AuditLog::record(
            action,
            resource_type,
            resource_id,
            caller.map(Caller::id),
            caller.and_then(|c| c.ip_address.clone()),
            details,
            self.now(),
        );
        if let Err(e) = self.repo.append_audit_log(&entry).await {
            tracing::error!(
                action = %entry.action,
                resource_type = %entry.resource_type,
                resource_id = %entry.resource_id,
                "Failed to append audit log: {}",
                e
            );
        }
    }
}

fn not_found(what: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(format!("{} {}", what, id))
}
