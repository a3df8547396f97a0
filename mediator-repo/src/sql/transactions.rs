use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use mediator_types::{
    RepoError, Transaction, TransactionId, TransactionQuery, TransactionRepository,
    TransactionStats, effective_limit,
};

use super::types::{DbTransaction, DbTransactionStats, TRANSACTION_COLUMNS};
use super::{Db, SqlRepo, db_err, write_err};

/// Shared by the ledger insert in `post_movement`.
pub(super) const INSERT_TRANSACTION: &str = "INSERT INTO transactions \
    (id, reference, source_system, target_system, transaction_type, status, amount, currency, \
    user_id, request_payload, response_payload, error_message, created_at, updated_at) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)";

pub(super) fn duplicate_reference(tx: &Transaction) -> String {
    format!("Transaction reference {} already exists", tx.reference)
}

#[async_trait]
impl TransactionRepository for SqlRepo {
    async fn insert_transaction(&self, tx: &Transaction) -> Result<(), RepoError> {
        sqlx::query(INSERT_TRANSACTION)
            .bind(tx.id.into_uuid())
            .bind(&tx.reference)
            .bind(&tx.source_system)
            .bind(&tx.target_system)
            .bind(&tx.transaction_type)
            .bind(tx.status.as_str())
            .bind(tx.amount)
            .bind(tx.currency.as_str())
            .bind(tx.user_id.map(|u| u.into_uuid()))
            .bind(&tx.request_payload)
            .bind(&tx.response_payload)
            .bind(&tx.error_message)
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| write_err(e, &duplicate_reference(tx)))?;
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        sqlx::query_as::<_, DbTransaction>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbTransaction::into_domain)
            .transpose()
    }

    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference = $1");
        sqlx::query_as::<_, DbTransaction>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbTransaction::into_domain)
            .transpose()
    }

    async fn list_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1=1"
        ));
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(source) = &query.source_system {
            qb.push(" AND source_system = ").push_bind(source.clone());
        }
        if let Some(target) = &query.target_system {
            qb.push(" AND target_system = ").push_bind(target.clone());
        }
        if let Some(kind) = &query.transaction_type {
            qb.push(" AND transaction_type = ").push_bind(kind.clone());
        }
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.into_uuid());
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(effective_limit(query.limit));

        qb.build_query_as::<DbTransaction>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbTransaction::into_domain)
            .collect()
    }

    async fn finalize_transaction(&self, tx: &Transaction) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE transactions SET status = $2, response_payload = $3, error_message = $4, \
             updated_at = $5 WHERE id = $1 AND status = 'pending'",
        )
        .bind(tx.id.into_uuid())
        .bind(tx.status.as_str())
        .bind(&tx.response_payload)
        .bind(&tx.error_message)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.get_transaction(tx.id).await? {
            Some(current) => Err(RepoError::Conflict(format!(
                "Transaction {} is already {}",
                tx.id, current.status
            ))),
            None => Err(RepoError::NotFound),
        }
    }

    async fn claim_transaction_submission(
        &self,
        id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE transactions SET submitted_at = $2, updated_at = $2 \
             WHERE id = $1 AND status = 'pending' AND submitted_at IS NULL",
        )
        .bind(id.into_uuid())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_transaction_submission(&self, id: TransactionId) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE transactions SET submitted_at = NULL WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn transaction_stats(&self, target: &str) -> Result<TransactionStats, RepoError> {
        let row = sqlx::query_as::<_, DbTransactionStats>(
            "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
             COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
             COUNT(*) FILTER (WHERE status = 'failed') AS failed \
             FROM transactions WHERE target_system = $1",
        )
        .bind(target)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.into())
    }
}
