//! Background job payload and outcome.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Body handed to a job runner, and posted to the job webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub export_id: Uuid,

    #[validate(
        url,
        length(max = 2048),
        custom(function = "shared::validation::validate_http_scheme")
    )]
    pub source_url: String,
}

impl JobPayload {
    pub fn new(export_id: Uuid, source_url: impl Into<String>) -> Self {
        Self {
            export_id,
            source_url: source_url.into(),
        }
    }
}

/// Result reported by a job runner for one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success { download_url: String },
    Failure { reason: String },
}

impl JobOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        JobOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}
