use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mediator_types::{ApiKey, ApiKeyId, ApiKeyRepository, RepoError, UserId};

use super::types::{API_KEY_COLUMNS, DbApiKey};
use super::{SqlRepo, db_err, require_row, write_err};

#[async_trait]
impl ApiKeyRepository for SqlRepo {
    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO api_keys \
             (id, user_id, name, key_prefix, key_hash, is_active, created_at, expires_at, last_used_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(key.id.into_uuid())
        .bind(key.user_id.into_uuid())
        .bind(&key.name)
        .bind(&key.key_prefix)
        .bind(&key.key_hash)
        .bind(key.is_active)
        .bind(key.created_at)
        .bind(key.expires_at)
        .bind(key.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "API key already exists"))?;
        Ok(())
    }

    async fn get_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1");
        let row = sqlx::query_as::<_, DbApiKey>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(DbApiKey::into_domain))
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE key_hash = $1");
        let row = sqlx::query_as::<_, DbApiKey>(&sql)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.map(DbApiKey::into_domain))
    }

    async fn list_api_keys(&self, user_id: Option<UserId>) -> Result<Vec<ApiKey>, RepoError> {
        let rows = match user_id {
            Some(user_id) => {
                let sql = format!(
                    "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC"
                );
                sqlx::query_as::<_, DbApiKey>(&sql)
                    .bind(user_id.into_uuid())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys ORDER BY created_at DESC");
                sqlx::query_as::<_, DbApiKey>(&sql)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(db_err)?;
        Ok(rows.into_iter().map(DbApiKey::into_domain).collect())
    }

    async fn update_api_key(&self, key: &ApiKey) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE api_keys SET name = $2, key_prefix = $3, key_hash = $4, is_active = $5, \
             expires_at = $6, last_used_at = $7 WHERE id = $1",
        )
        .bind(key.id.into_uuid())
        .bind(&key.name)
        .bind(&key.key_prefix)
        .bind(&key.key_hash)
        .bind(key.is_active)
        .bind(key.expires_at)
        .bind(key.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, "API key already exists"))?;
        require_row(result.rows_affected())
    }

    async fn touch_api_key(&self, id: ApiKeyId, used_at: DateTime<Utc>) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id.into_uuid())
            .bind(used_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        require_row(result.rows_affected())
    }
}
