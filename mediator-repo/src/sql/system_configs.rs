use async_trait::async_trait;
use sqlx::QueryBuilder;

use mediator_types::{
    RepoError, SystemConfig, SystemConfigId, SystemConfigQuery, SystemConfigRepository,
};

use super::types::{DbSystemConfig, SYSTEM_CONFIG_COLUMNS};
use super::{Db, SqlRepo, db_err, require_row, write_err};

#[async_trait]
impl SystemConfigRepository for SqlRepo {
    async fn insert_system_config(&self, config: &SystemConfig) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO system_configs \
             (id, system_name, system_type, base_url, auth_type, timeout_seconds, retry_count, \
             settings, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(config.id.into_uuid())
        .bind(&config.system_name)
        .bind(config.system_type.as_str())
        .bind(&config.base_url)
        .bind(config.auth_type.as_str())
        .bind(config.timeout_seconds)
        .bind(config.retry_count)
        .bind(&config.settings)
        .bind(config.is_active)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_err(
                e,
                &format!("System {} is already configured", config.system_name),
            )
        })?;
        Ok(())
    }

    async fn get_system_config(
        &self,
        id: SystemConfigId,
    ) -> Result<Option<SystemConfig>, RepoError> {
        let sql = format!("SELECT {SYSTEM_CONFIG_COLUMNS} FROM system_configs WHERE id = $1");
        sqlx::query_as::<_, DbSystemConfig>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbSystemConfig::into_domain)
            .transpose()
    }

    async fn list_system_configs(
        &self,
        query: &SystemConfigQuery,
    ) -> Result<Vec<SystemConfig>, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(format!(
            "SELECT {SYSTEM_CONFIG_COLUMNS} FROM system_configs WHERE 1=1"
        ));
        if let Some(kind) = query.system_type {
            qb.push(" AND system_type = ").push_bind(kind.as_str());
        }
        if let Some(active) = query.is_active {
            qb.push(" AND is_active = ").push_bind(active);
        }
        qb.push(" ORDER BY created_at DESC");

        qb.build_query_as::<DbSystemConfig>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbSystemConfig::into_domain)
            .collect()
    }

    async fn update_system_config(&self, config: &SystemConfig) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE system_configs SET system_type = $2, base_url = $3, auth_type = $4, \
             timeout_seconds = $5, retry_count = $6, settings = $7, is_active = $8, \
             updated_at = $9 WHERE id = $1",
        )
        .bind(config.id.into_uuid())
        .bind(config.system_type.as_str())
        .bind(&config.base_url)
        .bind(config.auth_type.as_str())
        .bind(config.timeout_seconds)
        .bind(config.retry_count)
        .bind(&config.settings)
        .bind(config.is_active)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        require_row(result.rows_affected())
    }

    async fn delete_system_config(&self, id: SystemConfigId) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM system_configs WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}
