//! Transactions and their submission to providers.

use mediator_types::{
    AppError, AuditAction, CompleteTransactionRequest, CreateTransactionRequest,
    FailTransactionRequest, GatewayError, Money, NewTransaction, Provider, ProviderGateway,
    Repository, Transaction, TransactionId, TransactionQuery, TransactionStatus,
};
use serde_json::json;

use super::{Caller, MediatorService, not_found};

/// Compare-and-set rounds before a busy provider key gives up.
const QUOTA_ATTEMPTS: usize = 5;

impl<R: Repository, G: ProviderGateway> MediatorService<R, G> {
    #[tracing::instrument(skip(self, caller, req), fields(reference = %req.reference))]
    pub async fn create_transaction(
        &self,
        caller: &Caller,
        req: CreateTransactionRequest,
    ) -> Result<Transaction, AppError> {
        let draft = NewTransaction {
            reference: req.reference,
            source_system: req.source_system,
            target_system: req.target_system,
            transaction_type: req.transaction_type,
            amount: Money::positive(req.amount, req.currency)?,
            user_id: Some(caller.id()),
            request_payload: req.request_payload,
        };
        let tx = Transaction::new(draft, self.now())?;
        self.repo.insert_transaction(&tx).await?;
        tracing::info!(transaction_id = %tx.id, "Transaction created");
        Ok(tx)
    }

    pub async fn list_transactions(
        &self,
        caller: &Caller,
        mut query: TransactionQuery,
    ) -> Result<Vec<Transaction>, AppError> {
        query.user_id = caller.scope(query.user_id);
        self.repo.list_transactions(&query).await.map_err(Into::into)
    }

    pub async fn get_transaction(
        &self,
        caller: &Caller,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .filter(|tx| caller.is_admin() || tx.user_id == Some(caller.id()))
            .ok_or_else(|| not_found("Transaction", id))
    }

    #[tracing::instrument(skip(self, caller, req), fields(transaction_id = %id))]
    pub async fn complete_transaction(
        &self,
        caller: &Caller,
        id: TransactionId,
        req: CompleteTransactionRequest,
    ) -> Result<Transaction, AppError> {
        caller.require_admin()?;
        let mut tx = self.get_transaction(caller, id).await?;
        tx.complete(req.response_payload, self.now())?;
        self.repo.finalize_transaction(&tx).await?;
        self.audit_status(caller, &tx).await;
        Ok(tx)
    }

    #[tracing::instrument(skip(self, caller, req), fields(transaction_id = %id))]
    pub async fn fail_transaction(
        &self,
        caller: &Caller,
        id: TransactionId,
        req: FailTransactionRequest,
    ) -> Result<Transaction, AppError> {
        caller.require_admin()?;
        if req.error_message.trim().is_empty() {
            return Err(AppError::BadRequest("error_message cannot be empty".into()));
        }
        let mut tx = self.get_transaction(caller, id).await?;
        tx.fail(req.error_message, req.response_payload, self.now())?;
        self.repo.finalize_transaction(&tx).await?;
        self.audit_status(caller, &tx).await;
        Ok(tx)
    }

    /// Forwards a pending transaction to the provider named by its
    /// `target_system` and records the outcome.
    ///
    /// The transaction is claimed before anything is sent, so a concurrent or
    /// repeated submit gets `Conflict` instead of a second forward. Throttling
    /// by the outbound limiter releases the claim and leaves the transaction
    /// pending; any other provider failure fails it.
    #[tracing::instrument(skip(self, caller), fields(transaction_id = %id))]
    pub async fn submit_transaction(
        &self,
        caller: &Caller,
        id: TransactionId,
    ) -> Result<Transaction, AppError> {
        let mut tx = self.get_transaction(caller, id).await?;
        if tx.status != TransactionStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Transaction {} is already {}",
                tx.id, tx.status
            )));
        }

        let provider = self
            .repo
            .find_provider_by_code(&tx.target_system)
            .await?
            .ok_or_else(|| not_found("Provider", &tx.target_system))?;
        if !provider.is_active {
            return Err(AppError::BadRequest(format!(
                "Provider {} is not active",
                provider.code
            )));
        }
        if !provider.supports_currency(&tx.currency) {
            return Err(AppError::BadRequest(format!(
                "Provider {} does not support {}",
                provider.code, tx.currency
            )));
        }
        let endpoint = self.endpoint(&provider, provider.submit_url())?;

        if !self.repo.claim_transaction_submission(tx.id, self.now()).await? {
            return Err(AppError::Conflict(format!(
                "Transaction {} is already being submitted",
                tx.id
            )));
        }
        if let Err(e) = self.consume_provider_quota(caller, &provider).await {
            self.release_submission(tx.id).await;
            return Err(e);
        }

        let payload = json!({
            "reference": tx.reference,
            "transaction_type": tx.transaction_type,
            "amount": tx.amount,
            "currency": tx.currency,
            "source_system": tx.source_system,
            "payload": tx.request_payload,
        });

        let forwarded = self.gateway.forward(&endpoint, &payload, &tx.reference).await;
        let now = self.now();
        match forwarded {
            Ok(response) if response.is_success() => {
                tx.complete(Some(response.body), now)?;
            }
            Ok(response) => {
                let message = format!("Provider responded with HTTP {}", response.http_status);
                tx.fail(message, Some(response.body), now)?;
            }
            Err(e @ GatewayError::Throttled { .. }) => {
                self.release_submission(tx.id).await;
                return Err(e.into());
            }
            Err(e) => {
                tx.fail(e.to_string(), None, now)?;
            }
        }

        self.repo.finalize_transaction(&tx).await?;
        tracing::info!(
            provider = %provider.code,
            status = %tx.status,
            "Transaction submitted"
        );
        Ok(tx)
    }

    /// Counts one use of the caller's provider key. The counters are written
    /// with a compare-and-set, so concurrent submits never lose a use and a
    /// key deactivated meanwhile is refused.
    async fn consume_provider_quota(
        &self,
        caller: &Caller,
        provider: &Provider,
    ) -> Result<(), AppError> {
        let environment = self.settings.provider_environment;
        for _ in 0..QUOTA_ATTEMPTS {
            let seen = self
                .repo
                .find_provider_key(provider.id, caller.id(), environment)
                .await?
                .ok_or_else(|| {
                    AppError::Forbidden(format!(
                        "No {} provider key for {}",
                        environment, provider.code
                    ))
                })?;
            let mut key = seen.clone();
            key.record_usage(self.now())?;
            if self.repo.record_provider_key_usage(&seen, &key).await? {
                return Ok(());
            }
            tracing::debug!(key_id = %key.id, "Provider key usage changed concurrently, retrying");
        }
        Err(AppError::Conflict(
            "Provider key usage is changing too quickly, try again".into(),
        ))
    }

    async fn release_submission(&self, id: TransactionId) {
        if let Err(e) = self.repo.release_transaction_submission(id).await {
            tracing::error!(transaction_id = %id, "Failed to release submission claim: {}", e);
        }
    }

    async fn audit_status(&self, caller: &Caller, tx: &Transaction) {
        self.audit(
            Some(caller),
            AuditAction::StatusChange,
            "transaction",
            tx.id,
            json!({"status": tx.status, "error_message": tx.error_message}),
        )
        .await;
    }
}
