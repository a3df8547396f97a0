//! Error types for the mediator service.

use crate::domain::CurrencyCode;

/// Domain-level errors (business rule violations).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount must be positive")]
    NonPositiveAmount,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        got: CurrencyCode,
    },

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Provider key is inactive")]
    KeyInactive,

    #[error("Provider key has expired")]
    KeyExpired,

    #[error("Provider key {period} limit of {limit} requests reached")]
    QuotaExceeded { period: &'static str, limit: i64 },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl DomainError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        DomainError::ValidationError(msg.into())
    }

    pub(crate) fn transition(
        entity: &'static str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        DomainError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Outbound provider call failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Provider request timed out after {0} ms")]
    Timeout(u64),

    #[error("Provider request failed: {0}")]
    Transport(String),

    #[error("Provider {provider} rate limit reached")]
    Throttled { provider: String },

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),
}

/// Shared counter store failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CounterStoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Too many requests: {0}")]
    RateLimited(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientFunds {
                available,
                requested,
            } => AppError::InsufficientFunds {
                available,
                requested,
            },
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            e @ DomainError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            e @ (DomainError::KeyInactive | DomainError::KeyExpired) => {
                AppError::Forbidden(e.to_string())
            }
            e @ DomainError::QuotaExceeded { .. } => AppError::RateLimited(e.to_string()),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            e @ GatewayError::Throttled { .. } => AppError::RateLimited(e.to_string()),
            GatewayError::InvalidConfig(msg) => AppError::BadRequest(msg),
            e => AppError::ServiceUnavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_http_categories() {
        let err: AppError = DomainError::transition("webhook", "completed", "pending").into();
        assert!(matches!(err, AppError::Conflict(_)));

        let err: AppError = DomainError::KeyExpired.into();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err: AppError = DomainError::QuotaExceeded {
            period: "daily",
            limit: 10,
        }
        .into();
        assert!(matches!(err, AppError::RateLimited(_)));

        let err: AppError = RepoError::Domain(DomainError::validation("bad")).into();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "bad"));
    }

    #[test]
    fn test_repo_errors_map_to_http_categories() {
        assert!(matches!(
            AppError::from(RepoError::NotFound),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(RepoError::Conflict("dup".into())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(RepoError::Database("down".into())),
            AppError::Internal(_)
        ));
    }
}
