use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::{AuthType, validate_base_url};
use super::require_text;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a SystemConfig.
    SystemConfigId
);

text_enum!(
    SystemType {
        FinancialProvider => "financial_provider",
        BankingSystem => "banking_system",
    }
);

/// Connection settings for an upstream banking or financial system.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SystemConfig {
    pub id: SystemConfigId,
    pub system_name: String,
    pub system_type: SystemType,
    pub base_url: String,
    pub auth_type: AuthType,
    pub timeout_seconds: i64,
    pub retry_count: i64,
    pub settings: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SystemConfig {
    pub const DEFAULT_TIMEOUT_SECONDS: i64 = 30;
    pub const DEFAULT_RETRY_COUNT: i64 = 3;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        system_name: String,
        system_type: SystemType,
        base_url: String,
        auth_type: AuthType,
        timeout_seconds: i64,
        retry_count: i64,
        settings: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let config = Self {
            id: SystemConfigId::new(),
            system_name,
            system_type,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_type,
            timeout_seconds,
            retry_count,
            settings,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        require_text("system_name", &self.system_name, 100)?;
        validate_base_url(&self.base_url)?;
        if !(1..=300).contains(&self.timeout_seconds) {
            return Err(DomainError::validation(
                "timeout_seconds must be between 1 and 300",
            ));
        }
        if !(0..=10).contains(&self.retry_count) {
            return Err(DomainError::validation(
                "retry_count must be between 0 and 10",
            ));
        }
        if !self.settings.is_object() {
            return Err(DomainError::validation("settings must be a JSON object"));
        }
        Ok(())
    }

    pub fn toggle_active(&mut self, now: DateTime<Utc>) {
        self.is_active = !self.is_active;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_validated() {
        let now = Utc::now();
        let ok = SystemConfig::new(
            "core".into(),
            SystemType::BankingSystem,
            "https://core.bank.test/".into(),
            AuthType::Basic,
            30,
            3,
            serde_json::json!({}),
            now,
        )
        .unwrap();
        assert_eq!(ok.base_url, "https://core.bank.test");

        let err = SystemConfig::new(
            "core".into(),
            SystemType::BankingSystem,
            "https://core.bank.test".into(),
            AuthType::Basic,
            0,
            3,
            serde_json::json!({}),
            now,
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_toggle_active() {
        let now = Utc::now();
        let mut c = SystemConfig::new(
            "core".into(),
            SystemType::FinancialProvider,
            "http://localhost:9000".into(),
            AuthType::None,
            5,
            0,
            serde_json::json!({"region": "np"}),
            now,
        )
        .unwrap();
        c.toggle_active(now);
        assert!(!c.is_active);
        c.toggle_active(now);
        assert!(c.is_active);
    }
}
