//! Webhook event storage.
//!
//! Every state change is a single conditional `UPDATE` guarded on the current
//! status, so two callers can never both win the same transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use mediator_types::{
    ProviderId, ProviderWebhook, ProviderWebhookId, RepoError, WebhookQuery, WebhookRepository,
    WebhookStats, effective_limit,
};

use super::types::{DbWebhook, DbWebhookStats, WEBHOOK_COLUMNS};
use super::{Db, SqlRepo, db_err};

impl SqlRepo {
    async fn find_event(
        &self,
        provider_id: ProviderId,
        event_id: uuid::Uuid,
    ) -> Result<Option<ProviderWebhook>, RepoError> {
        let sql = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM provider_webhooks WHERE provider_id = $1 AND event_id = $2"
        );
        sqlx::query_as::<_, DbWebhook>(&sql)
            .bind(provider_id.into_uuid())
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbWebhook::into_domain)
            .transpose()
    }

    /// Runs a guarded transition; on a miss, distinguishes unknown ids from
    /// events in the wrong state.
    async fn transition(
        &self,
        id: ProviderWebhookId,
        set: &str,
        from: &str,
        now: DateTime<Utc>,
        action: &str,
    ) -> Result<ProviderWebhook, RepoError> {
        let sql = format!(
            "UPDATE provider_webhooks SET {set}, updated_at = $2 \
             WHERE id = $1 AND status IN ({from}) RETURNING {WEBHOOK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DbWebhook>(&sql)
            .bind(id.into_uuid())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => row.into_domain(),
            None => match self.get_webhook(id).await? {
                Some(current) => Err(RepoError::Conflict(format!(
                    "Webhook cannot be {} from status {}",
                    action, current.status
                ))),
                None => Err(RepoError::NotFound),
            },
        }
    }
}

#[async_trait]
impl WebhookRepository for SqlRepo {
    async fn insert_webhook(
        &self,
        event: &ProviderWebhook,
    ) -> Result<(ProviderWebhook, bool), RepoError> {
        let result = sqlx::query(
            "INSERT INTO provider_webhooks \
             (id, event_id, provider_id, event_type, payload, status, error_message, \
             retry_count, signature, ip_address, headers, created_at, updated_at, processed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (provider_id, event_id) DO NOTHING",
        )
        .bind(event.id.into_uuid())
        .bind(event.event_id)
        .bind(event.provider_id.into_uuid())
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.status.as_str())
        .bind(&event.error_message)
        .bind(event.retry_count)
        .bind(&event.signature)
        .bind(&event.ip_address)
        .bind(&event.headers)
        .bind(event.created_at)
        .bind(event.updated_at)
        .bind(event.processed_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            return Ok((event.clone(), true));
        }
        let existing = self
            .find_event(event.provider_id, event.event_id)
            .await?
            .ok_or_else(|| RepoError::Database("duplicate event vanished".into()))?;
        Ok((existing, false))
    }

    async fn get_webhook(
        &self,
        id: ProviderWebhookId,
    ) -> Result<Option<ProviderWebhook>, RepoError> {
        let sql = format!("SELECT {WEBHOOK_COLUMNS} FROM provider_webhooks WHERE id = $1");
        sqlx::query_as::<_, DbWebhook>(&sql)
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbWebhook::into_domain)
            .transpose()
    }

    async fn list_webhooks(&self, query: &WebhookQuery) -> Result<Vec<ProviderWebhook>, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(format!(
            "SELECT {WEBHOOK_COLUMNS} FROM provider_webhooks WHERE 1=1"
        ));
        if let Some(provider_id) = query.provider_id {
            qb.push(" AND provider_id = ").push_bind(provider_id.into_uuid());
        }
        if let Some(event_type) = &query.event_type {
            qb.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(start) = query.start_date {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = query.end_date {
            qb.push(" AND created_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(effective_limit(query.limit));

        qb.build_query_as::<DbWebhook>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbWebhook::into_domain)
            .collect()
    }

    async fn pending_webhooks(
        &self,
        limit: i64,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<ProviderWebhook>, RepoError> {
        let sql = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM provider_webhooks \
             WHERE status = 'pending' OR (status = 'processing' AND updated_at < $2) \
             ORDER BY created_at ASC LIMIT $1"
        );
        sqlx::query_as::<_, DbWebhook>(&sql)
            .bind(limit)
            .bind(stale_before)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(DbWebhook::into_domain)
            .collect()
    }

    async fn claim_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<ProviderWebhook>, RepoError> {
        let sql = format!(
            "UPDATE provider_webhooks SET status = 'processing', updated_at = $2 \
             WHERE id = $1 AND (status = 'pending' \
             OR (status = 'processing' AND updated_at < $3)) RETURNING {WEBHOOK_COLUMNS}"
        );
        sqlx::query_as::<_, DbWebhook>(&sql)
            .bind(id.into_uuid())
            .bind(now)
            .bind(stale_before)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(DbWebhook::into_domain)
            .transpose()
    }

    async fn finish_webhook(&self, event: &ProviderWebhook) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE provider_webhooks SET status = $2, error_message = $3, processed_at = $4, \
             updated_at = $5 WHERE id = $1 AND status = 'processing'",
        )
        .bind(event.id.into_uuid())
        .bind(event.status.as_str())
        .bind(&event.error_message)
        .bind(event.processed_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn retry_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
    ) -> Result<ProviderWebhook, RepoError> {
        self.transition(
            id,
            "status = 'pending', retry_count = retry_count + 1, error_message = NULL, \
             processed_at = NULL",
            "'failed'",
            now,
            "retried",
        )
        .await
    }

    async fn cancel_webhook(
        &self,
        id: ProviderWebhookId,
        now: DateTime<Utc>,
    ) -> Result<ProviderWebhook, RepoError> {
        self.transition(
            id,
            "status = 'cancelled'",
            "'pending'",
            now,
            "cancelled",
        )
        .await
    }

    async fn webhook_stats(
        &self,
        provider_id: Option<ProviderId>,
        since: Option<DateTime<Utc>>,
    ) -> Result<WebhookStats, RepoError> {
        let mut qb = QueryBuilder::<Db>::new(
            "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE status = 'pending') AS pending, \
             COUNT(*) FILTER (WHERE status = 'processing') AS processing, \
             COUNT(*) FILTER (WHERE status = 'completed') AS completed, \
             COUNT(*) FILTER (WHERE status = 'failed') AS failed, \
             COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled \
             FROM provider_webhooks WHERE 1=1",
        );
        if let Some(provider_id) = provider_id {
            qb.push(" AND provider_id = ").push_bind(provider_id.into_uuid());
        }
        if let Some(since) = since {
            qb.push(" AND created_at >= ").push_bind(since);
        }

        let row = qb
            .build_query_as::<DbWebhookStats>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.into())
    }
}
