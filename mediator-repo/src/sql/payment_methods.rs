use async_trait::async_trait;
use sqlx::QueryBuilder;

use mediator_types::{
    PaymentMethod, PaymentMethodId, PaymentMethodQuery, PaymentMethodRepository, RepoError,
    UserId,
};

use super::types::{DbPaymentMethod, PAYMENT_METHOD_COLUMNS};
use super::{Db, SqlRepo, db_err, require_row, tx_err};

#[async_trait]
impl PaymentMethodRepository for SqlRepo {
    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO payment_methods \
             (id, user_id, name, method_type, provider, provider_method_id, last_four, \
             expiry_date, is_active, is_default, details, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(method.id.into_uuid())
        .bind(method.user_id.into_uuid())
        .bind(&method.name)
        .bind(method.method_type.as_str())
        .bind(&method.provider)
        .bind(&method.provider_method_id)
        .bind(&method.last_four)
        .bind(method.expiry_date)
        .bind(method.is_active)
        .bind(method.is_default)
        .bind(method.details.as_ref().map(|d| d.0.clone()))
        .bind(method.created_at)
        .bind(method.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_payment_method(
        &self,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>, RepoError> {
        let sql = format!("SELECT {PAYMENT_METHOD_COLUMNS} FROM payment_methods WHERE id = $1");
        sqlx::query_as::<_, DbPaymentMethod>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbPaymentMethod::into_domain)
            .transpose()
    }

    async fn list_payment_methods(
        &self,
        query: &PaymentMethodQuery,
    ) -> Result<Vec<PaymentMethod>, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(format!(
            "SELECT {PAYMENT_METHOD_COLUMNS} FROM payment_methods WHERE 1=1"
        ));
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.into_uuid());
        }
        if let Some(kind) = query.method_type {
            qb.push(" AND method_type = ").push_bind(kind.as_str());
        }
        if let Some(active) = query.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<DbPaymentMethod>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbPaymentMethod::into_domain)
            .collect()
    }

    async fn update_payment_method(&self, method: &PaymentMethod) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE payment_methods SET name = $2, last_four = $3, expiry_date = $4, \
             is_active = $5, is_default = $6, details = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(method.id.into_uuid())
        .bind(&method.name)
        .bind(&method.last_four)
        .bind(method.expiry_date)
        .bind(method.is_active)
        .bind(method.is_default)
        .bind(method.details.as_ref().map(|d| d.0.clone()))
        .bind(method.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        require_row(result.rows_affected())
    }

    async fn delete_payment_method(&self, id: PaymentMethodId) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM payment_methods WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_default_payment_method(
        &self,
        user_id: UserId,
        id: PaymentMethodId,
    ) -> Result<(), RepoError> {
        let mut dbtx = self.pool.begin().await.map_err(tx_err)?;

        let owned: Option<bool> = sqlx::query_scalar(
            "SELECT is_active FROM payment_methods WHERE id = $1 AND user_id = $2",
        )
        .bind(id.into_uuid())
        .bind(user_id.into_uuid())
        .fetch_optional(&mut *dbtx)
        .await
        .map_err(db_err)?;
        if owned.is_none() {
            return Err(RepoError::NotFound);
        }

        sqlx::query("UPDATE payment_methods SET is_default = (id = $2) WHERE user_id = $1")
            .bind(user_id.into_uuid())
            .bind(id.into_uuid())
            .execute(&mut *dbtx)
            .await
            .map_err(db_err)?;

        dbtx.commit().await.map_err(tx_err)?;
        Ok(())
    }
}
