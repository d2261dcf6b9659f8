//! PDF export record and related DTOs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// How long a completed export's download link stays valid, in seconds.
pub const DEFAULT_EXPIRATION_SECS: i64 = 120;

/// Default spacing between client status polls, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of status polls before the client gives up.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Artifact served for completed exports when no other source is configured.
pub const DEFAULT_SOURCE_PDF_URL: &str = "https://sylla-dev-public-bucket.s3.eu-central-1.amazonaws.com/books/47f4cad9aa3c005ce22fbdef05545308495bd571c55e02f7ae69353ac831d787";

/// Lifecycle status of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ExportStatus; 4] = [
        ExportStatus::Pending,
        ExportStatus::Processing,
        ExportStatus::Completed,
        ExportStatus::Failed,
    ];

    /// Completed and failed exports never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Transitions only move forward; terminal states have no successors and
    /// re-asserting the current state is not a transition.
    pub fn can_transition_to(&self, next: ExportStatus) -> bool {
        use ExportStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExportStatus::Pending),
            "processing" => Ok(ExportStatus::Processing),
            "completed" => Ok(ExportStatus::Completed),
            "failed" => Ok(ExportStatus::Failed),
            _ => Err(format!(
                "Invalid status '{}'. Must be one of: pending, processing, completed, failed",
                s
            )),
        }
    }
}

/// One PDF export job as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub id: Uuid,
    pub status: ExportStatus,
    pub download_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExportRecord {
    /// A freshly created export awaiting its job.
    pub fn new_pending(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status: ExportStatus::Pending,
            download_url: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `download_url` and `expires_at` are set together or not at all.
    pub fn has_consistent_link(&self) -> bool {
        self.download_url.is_some() == self.expires_at.is_some()
    }

    /// Time left on the download link, if any remains.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at - now)
            .filter(|left| *left > Duration::zero())
    }
}

/// The column values written by a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ExportStatus,
    pub download_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Apply this update to a record in place.
    pub fn apply_to(&self, record: &mut ExportRecord) {
        record.status = self.status;
        record.download_url = self.download_url.clone();
        record.expires_at = self.expires_at;
        record.updated_at = self.updated_at;
    }
}

/// Response body for `POST /export`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExportResponse {
    pub id: Uuid,
    pub status: ExportStatus,
}

impl From<&ExportRecord> for CreateExportResponse {
    fn from(record: &ExportRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
        }
    }
}

/// Request body for `PATCH /export/{id}`.
///
/// `status` stays a string so unknown values surface as a validation error
/// rather than a generic deserialization failure.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExportRequest {
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,

    #[validate(
        url,
        length(max = 2048),
        custom(function = "shared::validation::validate_http_scheme")
    )]
    pub download_url: Option<String>,
}

impl UpdateExportRequest {
    pub fn parsed_status(&self) -> Result<ExportStatus, String> {
        self.status.parse()
    }
}

/// Response body for `PATCH /export/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExportResponse {
    pub success: bool,
    pub export: ExportRecord,
}
