//! PDF export repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::errors::{ExportError, ExportResult};
use domain::models::{ExportRecord, ExportStatus, StatusUpdate};
use domain::services::ExportStore;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::PdfExportEntity;
use crate::metrics::QueryTimer;

/// Repository for `pdf_exports` rows.
#[derive(Clone)]
pub struct PdfExportRepository {
    pool: PgPool,
}

impl PdfExportRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExportStore for PdfExportRepository {
    async fn insert(&self, record: &ExportRecord) -> ExportResult<()> {
        let timer = QueryTimer::new("insert_pdf_export");
        let result = sqlx::query(
            r#"
            INSERT INTO pdf_exports (id, status, download_url, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(&record.download_url)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;
        timer.record();

        result.map_err(db_error)?;
        Ok(())
    }

    async fn find(&self, id: Uuid) -> ExportResult<Option<ExportRecord>> {
        let timer = QueryTimer::new("find_pdf_export");
        let result = sqlx::query_as::<_, PdfExportEntity>(
            r#"
            SELECT id, status, download_url, expires_at, created_at, updated_at
            FROM pdf_exports
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map_err(db_error)?.map(entity_to_domain).transpose()
    }

    async fn apply_update(
        &self,
        id: Uuid,
        expected: ExportStatus,
        update: &StatusUpdate,
    ) -> ExportResult<Option<ExportRecord>> {
        let timer = QueryTimer::new("update_pdf_export_status");
        let result = sqlx::query_as::<_, PdfExportEntity>(
            r#"
            UPDATE pdf_exports
            SET status = $3, download_url = $4, expires_at = $5, updated_at = $6
            WHERE id = $1 AND status = $2
            RETURNING id, status, download_url, expires_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(update.status.as_str())
        .bind(&update.download_url)
        .bind(update.expires_at)
        .bind(update.updated_at)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map_err(db_error)?.map(entity_to_domain).transpose()
    }

    async fn latest_active(&self, now: DateTime<Utc>) -> ExportResult<Option<ExportRecord>> {
        let timer = QueryTimer::new("latest_active_pdf_export");
        let result = sqlx::query_as::<_, PdfExportEntity>(
            r#"
            SELECT id, status, download_url, expires_at, created_at, updated_at
            FROM pdf_exports
            WHERE expires_at > $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map_err(db_error)?.map(entity_to_domain).transpose()
    }

    async fn health_check(&self) -> ExportResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(err: sqlx::Error) -> ExportError {
    ExportError::Persistence(err.to_string())
}

fn entity_to_domain(entity: PdfExportEntity) -> ExportResult<ExportRecord> {
    let status = entity
        .status
        .parse::<ExportStatus>()
        .map_err(ExportError::Persistence)?;

    Ok(ExportRecord {
        id: entity.id,
        status,
        download_url: entity.download_url,
        expires_at: entity.expires_at,
        created_at: entity.created_at,
        updated_at: entity.updated_at,
    })
}
