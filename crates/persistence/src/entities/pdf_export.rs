//! PDF export entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row of `pdf_exports`.
#[derive(Debug, Clone, FromRow)]
pub struct PdfExportEntity {
    pub id: Uuid,

    /// One of pending, processing, completed, failed.
    pub status: String,

    pub download_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_export_entity_creation() {
        let now = Utc::now();
        let entity = PdfExportEntity {
            id: Uuid::new_v4(),
            status: "pending".to_string(),
            download_url: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(entity.status, "pending");
        assert!(entity.download_url.is_none());
    }
}
