use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::provider::SealedSecret;
use super::require_text;
use super::user::UserId;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a PaymentMethod.
    PaymentMethodId
);

text_enum!(
    PaymentMethodType {
        Card => "card",
        Bank => "bank",
        Wallet => "wallet",
    }
);

/// A stored means of payment. Sensitive details stay sealed.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub user_id: UserId,
    pub name: String,
    pub method_type: PaymentMethodType,
    /// Code of the provider that tokenized this method.
    pub provider: String,
    pub provider_method_id: String,
    pub last_four: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub is_active: bool,
    pub is_default: bool,
    #[serde(skip)]
    pub details: Option<SealedSecret>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentMethod {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        name: String,
        method_type: PaymentMethodType,
        provider: String,
        provider_method_id: String,
        last_four: Option<String>,
        expiry_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        require_text("name", &name, 100)?;
        require_text("provider", &provider, 50)?;
        require_text("provider_method_id", &provider_method_id, 100)?;
        if let Some(four) = &last_four {
            validate_last_four(four)?;
        }
        if method_type == PaymentMethodType::Card && expiry_date.is_none() {
            return Err(DomainError::validation("Cards require an expiry_date"));
        }

        Ok(Self {
            id: PaymentMethodId::new(),
            user_id,
            name,
            method_type,
            provider,
            provider_method_id,
            last_four,
            expiry_date,
            is_active: true,
            is_default: false,
            details: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|exp| exp < today)
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.is_default = false;
        self.updated_at = now;
    }
}

pub fn validate_last_four(value: &str) -> Result<(), DomainError> {
    if value.len() == 4 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DomainError::validation("last_four must be exactly 4 digits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_requires_expiry() {
        let result = PaymentMethod::new(
            UserId::new(),
            "Visa".into(),
            PaymentMethodType::Card,
            "stripe".into(),
            "pm_1".into(),
            Some("4242".into()),
            None,
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_deactivate_clears_default() {
        let mut pm = PaymentMethod::new(
            UserId::new(),
            "Wallet".into(),
            PaymentMethodType::Wallet,
            "khalti".into(),
            "w_9".into(),
            None,
            None,
            Utc::now(),
        )
        .unwrap();
        pm.is_default = true;
        pm.deactivate(Utc::now());
        assert!(!pm.is_active);
        assert!(!pm.is_default);
    }

    #[test]
    fn test_last_four_validation() {
        assert!(validate_last_four("12a4").is_err());
        assert!(validate_last_four("12345").is_err());
        assert!(validate_last_four("0042").is_ok());
    }
}
