use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use mediator_types::{
    Environment, ProviderId, ProviderKey, ProviderKeyId, ProviderKeyQuery, ProviderKeyRepository,
    RepoError, UserId,
};

use super::types::{DbProviderKey, PROVIDER_KEY_COLUMNS};
use super::{Db, SqlRepo, db_err, require_row, write_err};

#[async_trait]
impl ProviderKeyRepository for SqlRepo {
    async fn insert_provider_key(&self, key: &ProviderKey) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO provider_keys \
             (id, provider_id, user_id, environment, public_key, secret_hash, is_active, \
             daily_limit, monthly_limit, daily_usage, monthly_usage, usage_day, expires_at, \
             last_used_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(key.id.into_uuid())
        .bind(key.provider_id.into_uuid())
        .bind(key.user_id.into_uuid())
        .bind(key.environment.as_str())
        .bind(&key.public_key)
        .bind(&key.secret_hash)
        .bind(key.is_active)
        .bind(key.daily_limit)
        .bind(key.monthly_limit)
        .bind(key.daily_usage)
        .bind(key.monthly_usage)
        .bind(key.usage_day)
        .bind(key.expires_at)
        .bind(key.last_used_at)
        .bind(key.created_at)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_err(
                e,
                &format!(
                    "A {} key for this provider and user already exists",
                    key.environment
                ),
            )
        })?;
        Ok(())
    }

    async fn get_provider_key(&self, id: ProviderKeyId) -> Result<Option<ProviderKey>, RepoError> {
        let sql = format!("SELECT {PROVIDER_KEY_COLUMNS} FROM provider_keys WHERE id = $1");
        sqlx::query_as::<_, DbProviderKey>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbProviderKey::into_domain)
            .transpose()
    }

    async fn find_provider_key(
        &self,
        provider_id: ProviderId,
        user_id: UserId,
        environment: Environment,
    ) -> Result<Option<ProviderKey>, RepoError> {
        let sql = format!(
            "SELECT {PROVIDER_KEY_COLUMNS} FROM provider_keys \
             WHERE provider_id = $1 AND user_id = $2 AND environment = $3"
        );
        sqlx::query_as::<_, DbProviderKey>(&sql)
            .bind(provider_id.into_uuid())
            .bind(user_id.into_uuid())
            .bind(environment.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbProviderKey::into_domain)
            .transpose()
    }

    async fn list_provider_keys(
        &self,
        query: &ProviderKeyQuery,
    ) -> Result<Vec<ProviderKey>, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(format!(
            "SELECT {PROVIDER_KEY_COLUMNS} FROM provider_keys WHERE 1=1"
        ));
        if let Some(provider_id) = query.provider_id {
            qb.push(" AND provider_id = ").push_bind(provider_id.into_uuid());
        }
        if let Some(environment) = query.environment {
            qb.push(" AND environment = ").push_bind(environment.as_str());
        }
        if let Some(active) = query.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        if let Some(user_id) = query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.into_uuid());
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<DbProviderKey>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbProviderKey::into_domain)
            .collect()
    }

    async fn update_provider_key(&self, key: &ProviderKey) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE provider_keys SET public_key = $2, secret_hash = $3, is_active = $4, \
             daily_limit = $5, monthly_limit = $6, daily_usage = $7, monthly_usage = $8, \
             usage_day = $9, expires_at = $10, last_used_at = $11, updated_at = $12 \
             WHERE id = $1",
        )
        .bind(key.id.into_uuid())
        .bind(&key.public_key)
        .bind(&key.secret_hash)
        .bind(key.is_active)
        .bind(key.daily_limit)
        .bind(key.monthly_limit)
        .bind(key.daily_usage)
        .bind(key.monthly_usage)
        .bind(key.usage_day)
        .bind(key.expires_at)
        .bind(key.last_used_at)
        .bind(key.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "Public key already exists"))?;
        require_row(result.rows_affected())
    }

    async fn record_provider_key_usage(
        &self,
        seen: &ProviderKey,
        key: &ProviderKey,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE provider_keys SET daily_usage = $2, monthly_usage = $3, usage_day = $4, \
             last_used_at = $5, updated_at = $6 \
             WHERE id = $1 AND is_active = $7 \
             AND daily_usage = $8 AND monthly_usage = $9 AND usage_day = $10",
        )
        .bind(key.id.into_uuid())
        .bind(key.daily_usage)
        .bind(key.monthly_usage)
        .bind(key.usage_day)
        .bind(key.last_used_at)
        .bind(key.updated_at)
        .bind(true)
        .bind(seen.daily_usage)
        .bind(seen.monthly_usage)
        .bind(seen.usage_day)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_expired_provider_keys(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE provider_keys SET is_active = $1, updated_at = $2 \
             WHERE is_active = $3 AND expires_at IS NOT NULL AND expires_at < $2",
        )
        .bind(false)
        .bind(now)
        .bind(true)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn delete_provider_key(&self, id: ProviderKeyId) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM provider_keys WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_active_provider_keys(&self, provider_id: ProviderId) -> Result<i64, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM provider_keys WHERE provider_id = $1 AND is_active = $2",
        )
        .bind(provider_id.into_uuid())
        .bind(true)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)
    }
}
