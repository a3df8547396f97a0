use async_trait::async_trait;
use sqlx::QueryBuilder;
use sqlx::types::Json;

use mediator_types::{Provider, ProviderId, ProviderQuery, ProviderRepository, RepoError};

use super::types::{DbProvider, PROVIDER_COLUMNS};
use super::{Db, SqlRepo, db_err, require_row, tx_err, write_err};

#[async_trait]
impl ProviderRepository for SqlRepo {
    async fn insert_provider(&self, provider: &Provider) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO providers \
             (id, name, code, provider_type, supported_currencies, supported_countries, \
             base_url, status_path, submit_path, auth_type, rate_limit, is_active, status, \
             status_message, credentials, webhook_secret, last_check_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(provider.id.into_uuid())
        .bind(&provider.name)
        .bind(&provider.code)
        .bind(provider.provider_type.as_str())
        .bind(Json(&provider.supported_currencies))
        .bind(Json(&provider.supported_countries))
        .bind(&provider.base_url)
        .bind(&provider.status_path)
        .bind(&provider.submit_path)
        .bind(provider.auth_type.as_str())
        .bind(provider.rate_limit)
        .bind(provider.is_active)
        .bind(provider.status.as_str())
        .bind(&provider.status_message)
        .bind(provider.credentials.as_ref().map(|c| c.0.clone()))
        .bind(&provider.webhook_secret)
        .bind(provider.last_check_at)
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, &format!("Provider code {} already exists", provider.code)))?;
        Ok(())
    }

    async fn get_provider(&self, id: ProviderId) -> Result<Option<Provider>, RepoError> {
        let sql = format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = $1");
        sqlx::query_as::<_, DbProvider>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbProvider::into_domain)
            .transpose()
    }

    async fn find_provider_by_code(&self, code: &str) -> Result<Option<Provider>, RepoError> {
        let sql = format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE code = $1");
        sqlx::query_as::<_, DbProvider>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbProvider::into_domain)
            .transpose()
    }

    async fn list_providers(&self, query: &ProviderQuery) -> Result<Vec<Provider>, RepoError> {
        let mut qb =
            QueryBuilder::<Db>::new(format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE 1=1"));
        if let Some(kind) = query.provider_type {
            qb.push(" AND provider_type = ").push_bind(kind.as_str());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(active) = query.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<DbProvider>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbProvider::into_domain)
            .collect()
    }

    async fn update_provider(&self, provider: &Provider) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE providers SET name = $2, provider_type = $3, supported_currencies = $4, \
             supported_countries = $5, base_url = $6, status_path = $7, submit_path = $8, \
             auth_type = $9, rate_limit = $10, is_active = $11, status = $12, \
             status_message = $13, credentials = $14, webhook_secret = $15, \
             last_check_at = $16, updated_at = $17 WHERE id = $1",
        )
        .bind(provider.id.into_uuid())
        .bind(&provider.name)
        .bind(provider.provider_type.as_str())
        .bind(Json(&provider.supported_currencies))
        .bind(Json(&provider.supported_countries))
        .bind(&provider.base_url)
        .bind(&provider.status_path)
        .bind(&provider.submit_path)
        .bind(provider.auth_type.as_str())
        .bind(provider.rate_limit)
        .bind(provider.is_active)
        .bind(provider.status.as_str())
        .bind(&provider.status_message)
        .bind(provider.credentials.as_ref().map(|c| c.0.clone()))
        .bind(&provider.webhook_secret)
        .bind(provider.last_check_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        require_row(result.rows_affected())
    }

    async fn record_provider_status(&self, provider: &Provider) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE providers SET status = $2, status_message = $3, last_check_at = $4, \
             updated_at = $5 WHERE id = $1",
        )
        .bind(provider.id.into_uuid())
        .bind(provider.status.as_str())
        .bind(&provider.status_message)
        .bind(provider.last_check_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        require_row(result.rows_affected())
    }

    async fn delete_provider(&self, id: ProviderId) -> Result<bool, RepoError> {
        let mut dbtx = self.pool.begin().await.map_err(tx_err)?;

        for table in ["provider_webhooks", "provider_keys"] {
            let sql = format!("DELETE FROM {table} WHERE provider_id = $1");
            sqlx::query(&sql)
                .bind(id.into_uuid())
                .execute(&mut *dbtx)
                .await
                .map_err(db_err)?;
        }
        let result = sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&mut *dbtx)
            .await
            .map_err(db_err)?;

        dbtx.commit().await.map_err(tx_err)?;
        Ok(result.rows_affected() > 0)
    }
}
