//! Bank account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::{CurrencyCode, Money};
use super::require_text;
use super::user::UserId;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a BankAccount.
    BankAccountId
);

text_enum!(
    AccountType {
        Savings => "savings",
        Current => "current",
        Wallet => "wallet",
    }
);

/// A user's account at a bank or wallet, with a tracked balance.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BankAccount {
    pub id: BankAccountId,
    pub user_id: UserId,
    pub account_number: String,
    pub bank_name: String,
    pub holder_name: String,
    pub account_type: AccountType,
    /// Balance in the smallest currency unit; never negative.
    pub balance: i64,
    pub currency: CurrencyCode,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    /// Opens an account with zero balance.
    pub fn new(
        user_id: UserId,
        account_number: String,
        bank_name: String,
        holder_name: String,
        account_type: AccountType,
        currency: CurrencyCode,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        require_text("account_number", &account_number, 34)?;
        require_text("bank_name", &bank_name, 100)?;
        require_text("holder_name", &holder_name, 100)?;
        if !account_number.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(
                "account_number may only contain letters and digits",
            ));
        }

        Ok(Self {
            id: BankAccountId::new(),
            user_id,
            account_number,
            bank_name,
            holder_name,
            account_type,
            balance: 0,
            currency,
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn available(&self) -> Money {
        Money::new(self.balance.max(0), self.currency.clone())
            .unwrap_or_else(|_| Money::zero(self.currency.clone()))
    }

    /// Adds funds.
    pub fn credit(&mut self, amount: &Money, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.balance = self.available().checked_add(amount)?.amount();
        self.updated_at = now;
        Ok(())
    }

    /// Removes funds, refusing to overdraw.
    pub fn debit(&mut self, amount: &Money, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_active()?;
        self.balance = self.available().checked_sub(amount)?.amount();
        self.updated_at = now;
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.is_active {
            return Err(DomainError::validation(format!(
                "Account {} is inactive",
                self.account_number
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> BankAccount {
        BankAccount::new(
            UserId::new(),
            "0012345678".into(),
            "Nabil Bank".into(),
            "Alice".into(),
            AccountType::Savings,
            CurrencyCode::parse("NPR").unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    fn npr(amount: i64) -> Money {
        Money::new(amount, CurrencyCode::parse("NPR").unwrap()).unwrap()
    }

    #[test]
    fn test_credit_and_debit() {
        let mut acc = account();
        acc.credit(&npr(1000), Utc::now()).unwrap();
        acc.debit(&npr(400), Utc::now()).unwrap();
        assert_eq!(acc.balance, 600);
    }

    #[test]
    fn test_overdraw_rejected() {
        let mut acc = account();
        acc.credit(&npr(100), Utc::now()).unwrap();
        assert!(matches!(
            acc.debit(&npr(101), Utc::now()),
            Err(DomainError::InsufficientFunds { .. })
        ));
        assert_eq!(acc.balance, 100);
    }

    #[test]
    fn test_inactive_account_rejects_movements() {
        let mut acc = account();
        acc.is_active = false;
        assert!(acc.credit(&npr(1), Utc::now()).is_err());
    }

    #[test]
    fn test_currency_mismatch_rejected() {
        let mut acc = account();
        let usd = Money::new(5, CurrencyCode::parse("USD").unwrap()).unwrap();
        assert!(matches!(
            acc.credit(&usd, Utc::now()),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }
}
