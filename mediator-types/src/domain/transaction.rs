//! Transaction domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::money::{CurrencyCode, Money};
use super::require_text;
use super::user::UserId;
use crate::error::DomainError;

entity_id!(
    /// Unique identifier for a Transaction.
    TransactionId
);

text_enum!(
    /// Processing status. `Completed` and `Failed` are terminal.
    TransactionStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
    }
);

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// A request mediated between a source and a target system.
///
/// Once terminal, a transaction never changes again.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Transaction {
    pub id: TransactionId,
    /// Caller-supplied unique reference.
    pub reference: String,
    pub source_system: String,
    pub target_system: String,
    pub transaction_type: String,
    pub status: TransactionStatus,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    pub currency: CurrencyCode,
    pub user_id: Option<UserId>,
    pub request_payload: Option<Value>,
    pub response_payload: Option<Value>,
    pub error_message: Option<String>,
    /// When a submission to the provider was claimed. Set at most once per
    /// attempt, so two submits of the same transaction cannot both forward it.
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to open a new pending transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub source_system: String,
    pub target_system: String,
    pub transaction_type: String,
    pub amount: Money,
    pub user_id: Option<UserId>,
    pub request_payload: Option<Value>,
}

impl Transaction {
    /// Opens a pending transaction.
    pub fn new(draft: NewTransaction, now: DateTime<Utc>) -> Result<Self, DomainError> {
        require_text("reference", &draft.reference, 100)?;
        require_text("source_system", &draft.source_system, 100)?;
        require_text("target_system", &draft.target_system, 100)?;
        require_text("transaction_type", &draft.transaction_type, 50)?;
        if draft.amount.amount() <= 0 {
            return Err(DomainError::NonPositiveAmount);
        }

        Ok(Self {
            id: TransactionId::new(),
            reference: draft.reference,
            source_system: draft.source_system,
            target_system: draft.target_system,
            transaction_type: draft.transaction_type,
            status: TransactionStatus::Pending,
            amount: draft.amount.amount(),
            currency: draft.amount.currency().clone(),
            user_id: draft.user_id,
            request_payload: draft.request_payload,
            response_payload: None,
            error_message: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns the amount as a Money value.
    pub fn money(&self) -> Result<Money, DomainError> {
        Money::new(self.amount, self.currency.clone())
    }

    /// Marks the transaction as completed.
    pub fn complete(
        &mut self,
        response: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_pending(TransactionStatus::Completed)?;
        self.status = TransactionStatus::Completed;
        self.response_payload = response;
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }

    /// Marks the transaction as failed and stores the reason.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        response: Option<Value>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.ensure_pending(TransactionStatus::Failed)?;
        self.status = TransactionStatus::Failed;
        self.error_message = Some(error.into());
        self.response_payload = response;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_pending(&self, to: TransactionStatus) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::transition("transaction", self.status, to));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> NewTransaction {
        NewTransaction {
            reference: "ref-1".into(),
            source_system: "core-banking".into(),
            target_system: "esewa".into(),
            transaction_type: "payment".into(),
            amount: Money::positive(2500, CurrencyCode::parse("NPR").unwrap()).unwrap(),
            user_id: None,
            request_payload: Some(serde_json::json!({"note": "rent"})),
        }
    }

    #[test]
    fn test_new_transaction_is_pending() {
        let tx = Transaction::new(draft(), Utc::now()).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.amount, 2500);
        assert_eq!(tx.currency.as_str(), "NPR");
    }

    #[test]
    fn test_blank_reference_rejected() {
        let mut d = draft();
        d.reference = "  ".into();
        assert!(matches!(
            Transaction::new(d, Utc::now()),
            Err(DomainError::ValidationError(_))
        ));
    }

    #[test]
    fn test_terminal_transaction_is_immutable() {
        let now = Utc::now();
        let mut tx = Transaction::new(draft(), now).unwrap();
        tx.complete(Some(serde_json::json!({"ok": true})), now).unwrap();

        assert!(matches!(
            tx.fail("late failure", None, now),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert!(tx.complete(None, now).is_err());
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_fail_records_error() {
        let now = Utc::now();
        let mut tx = Transaction::new(draft(), now).unwrap();
        tx.fail("HTTP 502", None, now).unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.error_message.as_deref(), Some("HTTP 502"));
    }
}
