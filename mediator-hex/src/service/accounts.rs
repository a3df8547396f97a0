//! Bank accounts, their ledger movements, and stored payment methods.

use mediator_types::{
    AccountMovement, AccountQuery, AccountStatement, AppError, AuditAction, BankAccount,
    BankAccountId, CreateAccountRequest, CreatePaymentMethodRequest, Money, MovementRequest,
    MovementResponse, NewTransaction, PaymentMethod, PaymentMethodId, PaymentMethodQuery,
    ProviderGateway, Repository, Transaction, UpdateAccountRequest, UpdatePaymentMethodRequest,
    effective_limit,
};
use serde_json::json;
use uuid::Uuid;

use super::{Caller, MediatorService, not_found};

/// Counterparty recorded on deposits and withdrawals.
pub const INTERNAL_SYSTEM: &str = "internal";

#[derive(Debug, Clone, Copy)]
enum Direction {
    Deposit,
    Withdrawal,
}

impl Direction {
    fn transaction_type(self) -> &'static str {
        match self {
            Direction::Deposit => "deposit",
            Direction::Withdrawal => "withdrawal",
        }
    }

    fn reference_prefix(self) -> &'static str {
        match self {
            Direction::Deposit => "DEP",
            Direction::Withdrawal => "WDR",
        }
    }
}

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    // ─────────────────────────────────────────────────────────────────────────
    // Accounts
    // ─────────────────────────────────────────────────────────────────────────

    #[tracing::instrument(skip(self, caller, req), fields(account_number = %req.account_number))]
    pub async fn create_account(
        &self,
        caller: &Caller,
        req: CreateAccountRequest,
    ) -> Result<BankAccount, AppError> {
        let owner = caller.owner_for(req.user_id)?;
        let account = BankAccount::new(
            owner,
            req.account_number,
            req.bank_name,
            req.holder_name,
            req.account_type,
            req.currency,
            self.now(),
        )?;
        self.repo.insert_account(&account).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "bank_account",
            account.id,
            json!({"account_number": account.account_number, "user_id": owner}),
        )
        .await;
        Ok(account)
    }

    pub async fn list_accounts(
        &self,
        caller: &Caller,
        mut query: AccountQuery,
    ) -> Result<Vec<BankAccount>, AppError> {
        query.user_id = caller.scope(query.user_id);
        self.repo.list_accounts(&query).await.map_err(Into::into)
    }

    pub async fn get_account(
        &self,
        caller: &Caller,
        id: BankAccountId,
    ) -> Result<BankAccount, AppError> {
        self.repo
            .get_account(id)
            .await?
            .filter(|a| caller.can_see(a.user_id))
            .ok_or_else(|| not_found("Account", id))
    }

    /// Verification is reserved to administrators.
    #[tracing::instrument(skip(self, caller, req), fields(account_id = %id))]
    pub async fn update_account(
        &self,
        caller: &Caller,
        id: BankAccountId,
        req: UpdateAccountRequest,
    ) -> Result<BankAccount, AppError> {
        if req.is_verified.is_some() {
            caller.require_admin()?;
        }
        let mut account = self.get_account(caller, id).await?;

        if let Some(bank_name) = req.bank_name.clone() {
            account.bank_name = required("bank_name", bank_name)?;
        }
        if let Some(holder_name) = req.holder_name.clone() {
            account.holder_name = required("holder_name", holder_name)?;
        }
        if let Some(is_active) = req.is_active {
            account.is_active = is_active;
        }
        if let Some(is_verified) = req.is_verified {
            account.is_verified = is_verified;
        }
        account.updated_at = self.now();

        self.repo.update_account(&account).await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "bank_account",
            account.id,
            serde_json::to_value(&req).unwrap_or_default(),
        )
        .await;
        Ok(account)
    }

    #[tracing::instrument(skip(self, caller), fields(account_id = %id))]
    pub async fn deactivate_account(
        &self,
        caller: &Caller,
        id: BankAccountId,
    ) -> Result<BankAccount, AppError> {
        let mut account = self.get_account(caller, id).await?;
        account.is_active = false;
        account.updated_at = self.now();
        self.repo.update_account(&account).await?;
        self.audit(
            Some(caller),
            AuditAction::Deactivate,
            "bank_account",
            account.id,
            json!({}),
        )
        .await;
        Ok(account)
    }

    #[tracing::instrument(skip(self, caller, req), fields(account_id = %id, amount = req.amount))]
    pub async fn deposit(
        &self,
        caller: &Caller,
        id: BankAccountId,
        req: MovementRequest,
    ) -> Result<MovementResponse, AppError> {
        self.post_movement(caller, id, req, Direction::Deposit).await
    }

    #[tracing::instrument(skip(self, caller, req), fields(account_id = %id, amount = req.amount))]
    pub async fn withdraw(
        &self,
        caller: &Caller,
        id: BankAccountId,
        req: MovementRequest,
    ) -> Result<MovementResponse, AppError> {
        self.post_movement(caller, id, req, Direction::Withdrawal)
            .await
    }

    /// The account with its most recent ledger entries.
    pub async fn statement(
        &self,
        caller: &Caller,
        id: BankAccountId,
        limit: Option<i64>,
    ) -> Result<AccountStatement, AppError> {
        let account = self.get_account(caller, id).await?;
        let transactions = self
            .repo
            .list_account_transactions(&account.account_number, effective_limit(limit))
            .await?;
        Ok(AccountStatement {
            account,
            transactions,
        })
    }

    async fn post_movement(
        &self,
        caller: &Caller,
        id: BankAccountId,
        req: MovementRequest,
        direction: Direction,
    ) -> Result<MovementResponse, AppError> {
        let mut account = self.get_account(caller, id).await?;
        let amount = Money::positive(req.amount, req.currency)?;
        let expected_balance = account.balance;
        let now = self.now();

        match direction {
            Direction::Deposit => account.credit(&amount, now)?,
            Direction::Withdrawal => account.debit(&amount, now)?,
        }

        let (source_system, target_system) = match direction {
            Direction::Deposit => (INTERNAL_SYSTEM.to_string(), account.account_number.clone()),
            Direction::Withdrawal => (account.account_number.clone(), INTERNAL_SYSTEM.to_string()),
        };
        let reference = req.reference.unwrap_or_else(|| {
            format!("{}-{}", direction.reference_prefix(), Uuid::new_v4().simple())
        });
        let mut transaction = Transaction::new(
            NewTransaction {
                reference,
                source_system,
                target_system,
                transaction_type: direction.transaction_type().to_string(),
                amount,
                user_id: Some(account.user_id),
                request_payload: None,
            },
            now,
        )?;
        transaction.complete(None, now)?;

        let movement = AccountMovement {
            account,
            transaction,
        };
        self.repo.post_movement(&movement, expected_balance).await?;
        tracing::info!(
            transaction_id = %movement.transaction.id,
            balance = movement.account.balance,
            "Account movement posted"
        );

        Ok(MovementResponse {
            balance: movement.account.balance,
            transaction: movement.transaction,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payment methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Stores a payment method; `details` are sealed before they are stored.
    #[tracing::instrument(skip(self, caller, req), fields(provider = %req.provider))]
    pub async fn create_payment_method(
        &self,
        caller: &Caller,
        req: CreatePaymentMethodRequest,
    ) -> Result<PaymentMethod, AppError> {
        let mut method = PaymentMethod::new(
            caller.id(),
            req.name,
            req.method_type,
            req.provider,
            req.provider_method_id,
            req.last_four,
            req.expiry_date,
            self.now(),
        )?;
        if let Some(details) = req.details {
            method.details = Some(
                self.cipher
                    .seal_json(&details)
                    .map_err(|e| AppError::Internal(e.to_string()))?,
            );
        }
        self.repo.insert_payment_method(&method).await?;
        self.audit(
            Some(caller),
            AuditAction::Create,
            "payment_method",
            method.id,
            json!({"method_type": method.method_type, "provider": method.provider}),
        )
        .await;
        Ok(method)
    }

    pub async fn list_payment_methods(
        &self,
        caller: &Caller,
        mut query: PaymentMethodQuery,
    ) -> Result<Vec<PaymentMethod>, AppError> {
        query.user_id = caller.scope(query.user_id);
        self.repo
            .list_payment_methods(&query)
            .await
            .map_err(Into::into)
    }

    pub async fn get_payment_method(
        &self,
        caller: &Caller,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, AppError> {
        self.repo
            .get_payment_method(id)
            .await?
            .filter(|m| caller.can_see(m.user_id))
            .ok_or_else(|| not_found("Payment method", id))
    }

    pub async fn update_payment_method(
        &self,
        caller: &Caller,
        id: PaymentMethodId,
        req: UpdatePaymentMethodRequest,
    ) -> Result<PaymentMethod, AppError> {
        let mut method = self.get_payment_method(caller, id).await?;
        if let Some(name) = req.name.clone() {
            method.name = required("name", name)?;
        }
        if let Some(expiry_date) = req.expiry_date {
            method.expiry_date = Some(expiry_date);
        }
        method.updated_at = self.now();
        self.repo.update_payment_method(&method).await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "payment_method",
            method.id,
            serde_json::to_value(&req).unwrap_or_default(),
        )
        .await;
        Ok(method)
    }

    pub async fn delete_payment_method(
        &self,
        caller: &Caller,
        id: PaymentMethodId,
    ) -> Result<(), AppError> {
        let method = self.get_payment_method(caller, id).await?;
        if !self.repo.delete_payment_method(method.id).await? {
            return Err(not_found("Payment method", id));
        }
        self.audit(
            Some(caller),
            AuditAction::Delete,
            "payment_method",
            method.id,
            json!({}),
        )
        .await;
        Ok(())
    }

    pub async fn deactivate_payment_method(
        &self,
        caller: &Caller,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, AppError> {
        let mut method = self.get_payment_method(caller, id).await?;
        method.deactivate(self.now());
        self.repo.update_payment_method(&method).await?;
        self.audit(
            Some(caller),
            AuditAction::Deactivate,
            "payment_method",
            method.id,
            json!({}),
        )
        .await;
        Ok(method)
    }

    /// Makes the method its owner's only default.
    pub async fn set_default_payment_method(
        &self,
        caller: &Caller,
        id: PaymentMethodId,
    ) -> Result<PaymentMethod, AppError> {
        let method = self.get_payment_method(caller, id).await?;
        if !method.is_active {
            return Err(AppError::BadRequest(
                "Inactive payment methods cannot be the default".into(),
            ));
        }
        if method.is_expired(self.now().date_naive()) {
            return Err(AppError::BadRequest(
                "Expired payment methods cannot be the default".into(),
            ));
        }
        self.repo
            .set_default_payment_method(method.user_id, method.id)
            .await?;
        self.audit(
            Some(caller),
            AuditAction::Update,
            "payment_method",
            method.id,
            json!({"is_default": true}),
        )
        .await;
        self.get_payment_method(caller, id).await
    }
}

fn required(field: &str, value: String) -> Result<String, AppError> {
    let value = value.trim().to_string();
    if value.is_empty() || value.len() > 100 {
        return Err(AppError::BadRequest(format!(
            "{} must be between 1 and 100 characters",
            field
        )));
    }
    Ok(value)
}
