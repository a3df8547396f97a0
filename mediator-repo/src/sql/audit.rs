use async_trait::async_trait;
use sqlx::QueryBuilder;

use mediator_types::{
    AuditLog, AuditLogId, AuditLogRepository, AuditQuery, RepoError, effective_limit,
};

use super::types::{AUDIT_COLUMNS, DbAuditLog};
use super::{Db, SqlRepo, db_err};

#[async_trait]
impl AuditLogRepository for SqlRepo {
    async fn append_audit_log(&self, entry: &AuditLog) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO audit_logs \
             (id, action, resource_type, resource_id, actor_id, ip_address, details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.into_uuid())
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(entry.actor_id.map(|a| a.into_uuid()))
        .bind(&entry.ip_address)
        .bind(&entry.details)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_audit_log(&self, id: AuditLogId) -> Result<Option<AuditLog>, RepoError> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE id = $1");
        sqlx::query_as::<_, DbAuditLog>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbAuditLog::into_domain)
            .transpose()
    }

    async fn list_audit_logs(&self, query: &AuditQuery) -> Result<Vec<AuditLog>, RepoError> {
        let mut qb =
            QueryBuilder::<Db>::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE 1=1"));
        if let Some(actor) = query.actor_id {
            qb.push(" AND actor_id = ").push_bind(actor.into_uuid());
        }
        if let Some(action) = query.action {
            qb.push(" AND action = ").push_bind(action.as_str());
        }
        if let Some(resource_type) = &query.resource_type {
            qb.push(" AND resource_type = ").push_bind(resource_type.clone());
        }
        if let Some(resource_id) = &query.resource_id {
            qb.push(" AND resource_id = ").push_bind(resource_id.clone());
        }
        if let Some(start) = query.start_date {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = query.end_date {
            qb.push(" AND created_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(effective_limit(query.limit));

        qb.build_query_as::<DbAuditLog>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbAuditLog::into_domain)
            .collect()
    }
}
