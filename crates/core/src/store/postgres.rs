use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{ContentRepository, ListFilter, RepositoryError};
use crate::content::{ContentRecord, ContentType};

/// Records live in one `content_records` table keyed by
/// `(content_type, id)`. The full record is kept as JSONB; `status` and the
/// timestamps are duplicated into columns for filtering and ordering.
#[derive(Debug, Clone)]
pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode(row: &sqlx::postgres::PgRow) -> Result<ContentRecord, RepositoryError> {
    let Json(record) = row.try_get::<Json<ContentRecord>, _>("body")?;
    Ok(record)
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    async fn list(
        &self,
        content_type: ContentType,
        filter: ListFilter,
    ) -> Result<Vec<ContentRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT body FROM content_records \
             WHERE content_type = $1 AND ($2 = FALSE OR status = 'published') \
             ORDER BY created_at DESC",
        )
        .bind(content_type.storage_key())
        .bind(filter.published_only)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(%content_type, published_only = filter.published_only, count = rows.len(), "listed records");
        rows.iter().map(decode).collect()
    }

    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<ContentRecord>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM content_records WHERE content_type = $1 AND id = $2")
            .bind(content_type.storage_key())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode).transpose()
    }

    async fn insert(&self, content_type: ContentType, record: ContentRecord) -> Result<ContentRecord, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO content_records (content_type, id, status, body, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (content_type, id) DO NOTHING",
        )
        .bind(content_type.storage_key())
        .bind(&record.id)
        .bind(record.status.as_str())
        .bind(Json(&record))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(%content_type, id = %record.id, "insert skipped, id already taken");
            return Err(RepositoryError::Conflict(format!("{content_type}/{}", record.id)));
        }
        Ok(record)
    }

    async fn update(
        &self,
        content_type: ContentType,
        record: ContentRecord,
    ) -> Result<Option<ContentRecord>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE content_records SET status = $3, body = $4, updated_at = $5 \
             WHERE content_type = $1 AND id = $2",
        )
        .bind(content_type.storage_key())
        .bind(&record.id)
        .bind(record.status.as_str())
        .bind(Json(&record))
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(record))
    }

    async fn delete(&self, content_type: ContentType, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM content_records WHERE content_type = $1 AND id = $2")
            .bind(content_type.storage_key())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
