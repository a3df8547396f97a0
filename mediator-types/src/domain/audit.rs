use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

entity_id!(
    /// Unique identifier for an AuditLog entry.
    AuditLogId
);

text_enum!(
    AuditAction {
        Create => "create",
        Update => "update",
        Delete => "delete",
        StatusChange => "status_change",
        Deactivate => "deactivate",
        Regenerate => "regenerate",
        Retry => "retry",
        Cancel => "cancel",
        Login => "login",
    }
);

/// Immutable record of an administrative or security-relevant action.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AuditLog {
    pub id: AuditLogId,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub actor_id: Option<UserId>,
    pub ip_address: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn record(
        action: AuditAction,
        resource_type: &str,
        resource_id: impl ToString,
        actor_id: Option<UserId>,
        ip_address: Option<String>,
        details: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditLogId::new(),
            action,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            actor_id,
            ip_address,
            details,
            created_at: now,
        }
    }
}
