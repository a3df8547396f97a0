use async_trait::async_trait;
use sqlx::QueryBuilder;

use mediator_types::{
    AccountMovement, AccountQuery, AccountRepository, BankAccount, BankAccountId, RepoError,
    Transaction,
};

use super::transactions::{INSERT_TRANSACTION, duplicate_reference};
use super::types::{ACCOUNT_COLUMNS, DbAccount, DbTransaction, TRANSACTION_COLUMNS};
use super::{Db, SqlRepo, db_err, require_row, tx_err, write_err};

#[async_trait]
impl AccountRepository for SqlRepo {
    async fn insert_account(&self, account: &BankAccount) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO bank_accounts \
             (id, user_id, account_number, bank_name, holder_name, account_type, balance, \
             currency, is_active, is_verified, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(account.id.into_uuid())
        .bind(account.user_id.into_uuid())
        .bind(&account.account_number)
        .bind(&account.bank_name)
        .bind(&account.holder_name)
        .bind(account.account_type.as_str())
        .bind(account.balance)
        .bind(account.currency.as_str())
        .bind(account.is_active)
        .bind(account.is_verified)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_err(
                e,
                &format!("Account number {} already exists", account.account_number),
            )
        })?;
        Ok(())
    }

    async fn get_account(&self, id: BankAccountId) -> Result<Option<BankAccount>, RepoError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE id = $1");
        sqlx::query_as::<_, DbAccount>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbAccount::into_domain)
            .transpose()
    }

    async fn list_accounts(&self, query: &AccountQuery) -> Result<Vec<BankAccount>, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(format!(
            "SELECT {ACCOUNT_COLUMNS} FROM bank_accounts WHERE 1=1"
        ));
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.into_uuid());
        }
        if let Some(active) = query.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<DbAccount>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbAccount::into_domain)
            .collect()
    }

    async fn update_account(&self, account: &BankAccount) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE bank_accounts SET bank_name = $2, holder_name = $3, is_active = $4, \
             is_verified = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(account.id.into_uuid())
        .bind(&account.bank_name)
        .bind(&account.holder_name)
        .bind(account.is_active)
        .bind(account.is_verified)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        require_row(result.rows_affected())
    }

    async fn post_movement(
        &self,
        movement: &AccountMovement,
        expected_balance: i64,
    ) -> Result<(), RepoError> {
        let account = &movement.account;
        let tx = &movement.transaction;

        let mut dbtx = self.pool.begin().await.map_err(tx_err)?;

        // Compare-and-set on the balance the movement was computed from.
        let updated = sqlx::query(
            "UPDATE bank_accounts SET balance = $2, updated_at = $3 WHERE id = $1 AND balance = $4",
        )
        .bind(account.id.into_uuid())
        .bind(account.balance)
        .bind(account.updated_at)
        .bind(expected_balance)
        .execute(&mut *dbtx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT balance FROM bank_accounts WHERE id = $1")
                    .bind(account.id.into_uuid())
                    .fetch_optional(&mut *dbtx)
                    .await
                    .map_err(db_err)?;
            return Err(match exists {
                Some(_) => RepoError::Conflict("Account balance changed concurrently".into()),
                None => RepoError::NotFound,
            });
        }

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
            .execute(&mut *dbtx)
            .await
            .map_err(|e| write_err(e, &duplicate_reference(tx)))?;

        dbtx.commit().await.map_err(tx_err)?;
        Ok(())
    }

    async fn list_account_transactions(
        &self,
        account_number: &str,
        limit: i64,
    ) -> Result<Vec<Transaction>, RepoError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions \
             WHERE source_system = $1 OR target_system = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, DbTransaction>(&sql)
            .bind(account_number)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbTransaction::into_domain)
            .collect()
    }
}
