//! Export lifecycle service.
//!
//! Owns every status change of an export record. Handlers, job runners and
//! the webhook all go through here so the transition rules live in one place.

use chrono::{DateTime, Duration, Utc};
use shared::clock::{Clock, SystemClock};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{ExportError, ExportResult};
use crate::models::{
    ExportRecord, ExportStatus, JobOutcome, JobPayload, StatusUpdate, DEFAULT_EXPIRATION_SECS,
};
use crate::services::dispatcher::JobDispatcher;
use crate::services::link_guard::{has_expired, link_state, LinkState};
use crate::services::store::ExportStore;

/// Outcome of looking up a download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownload {
    pub state: LinkState,
    pub record: Option<ExportRecord>,
}

pub struct ExportLifecycleService {
    store: Arc<dyn ExportStore>,
    clock: Arc<dyn Clock>,
    expiration: Duration,
}

impl ExportLifecycleService {
    pub fn new(store: Arc<dyn ExportStore>, clock: Arc<dyn Clock>, expiration: Duration) -> Self {
        Self {
            store,
            clock,
            expiration,
        }
    }

    /// Service on the system clock with the default link lifetime.
    pub fn with_defaults(store: Arc<dyn ExportStore>) -> Self {
        Self::new(
            store,
            Arc::new(SystemClock),
            Duration::seconds(DEFAULT_EXPIRATION_SECS),
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Create a new pending export.
    pub async fn create(&self) -> ExportResult<ExportRecord> {
        let record = ExportRecord::new_pending(Uuid::new_v4(), self.now());
        self.store.insert(&record).await?;

        tracing::info!(export_id = %record.id, status = %record.status, "Export created");
        Ok(record)
    }

    /// Move an export to `new_status`.
    ///
    /// `download_url` is required for `completed` and refused for anything
    /// else. Completing an export starts its link expiry window.
    pub async fn transition(
        &self,
        id: Uuid,
        new_status: ExportStatus,
        download_url: Option<String>,
    ) -> ExportResult<ExportRecord> {
        match (new_status, download_url.is_some()) {
            (ExportStatus::Completed, false) => {
                return Err(ExportError::Validation(
                    "downloadUrl is required when status is completed".to_string(),
                ));
            }
            (status, true) if status != ExportStatus::Completed => {
                return Err(ExportError::Validation(format!(
                    "downloadUrl is only allowed when status is completed, got {}",
                    status
                )));
            }
            _ => {}
        }

        let current = self
            .store
            .find(id)
            .await?
            .ok_or(ExportError::NotFound(id))?;

        if !current.status.can_transition_to(new_status) {
            return Err(ExportError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let now = self.now();
        let expires_at = download_url.as_ref().map(|_| now + self.expiration);
        let update = StatusUpdate {
            status: new_status,
            download_url,
            expires_at,
            updated_at: now,
        };

        match self.store.apply_update(id, current.status, &update).await? {
            Some(updated) => {
                tracing::info!(
                    export_id = %id,
                    from = %current.status,
                    status = %updated.status,
                    "Export status changed"
                );
                Ok(updated)
            }
            None => {
                // Another writer got there first.
                let latest = self
                    .store
                    .find(id)
                    .await?
                    .ok_or(ExportError::NotFound(id))?;
                tracing::warn!(
                    export_id = %id,
                    observed = %current.status,
                    actual = %latest.status,
                    requested = %new_status,
                    "Export status changed concurrently"
                );
                Err(ExportError::InvalidTransition {
                    from: latest.status,
                    to: new_status,
                })
            }
        }
    }

    /// Fetch an export, hiding records whose link has expired.
    pub async fn get_by_id(&self, id: Uuid) -> ExportResult<Option<ExportRecord>> {
        let now = self.now();
        Ok(self
            .store
            .find(id)
            .await?
            .filter(|record| !has_expired(record, now)))
    }

    /// Most recently created export with a link still in its window.
    pub async fn get_latest_active(&self) -> ExportResult<Option<ExportRecord>> {
        self.store.latest_active(self.now()).await
    }

    /// Classify a download request for `id`.
    ///
    /// Reads without the expiry filter so expired links can be told apart
    /// from unknown ids.
    pub async fn resolve_download(&self, id: Uuid) -> ExportResult<ResolvedDownload> {
        let record = self.store.find(id).await?;
        let state = link_state(record.as_ref(), self.now());
        Ok(ResolvedDownload { state, record })
    }

    /// Record that a job has started working on `id`.
    pub async fn mark_processing(&self, id: Uuid) -> ExportResult<ExportRecord> {
        self.transition(id, ExportStatus::Processing, None).await
    }

    /// Apply the final result reported by a job runner.
    pub async fn apply_job_result(
        &self,
        id: Uuid,
        outcome: JobOutcome,
    ) -> ExportResult<ExportRecord> {
        match outcome {
            JobOutcome::Success { download_url } => {
                self.transition(id, ExportStatus::Completed, Some(download_url))
                    .await
            }
            JobOutcome::Failure { reason } => {
                tracing::warn!(export_id = %id, reason = %reason, "Export job failed");
                self.transition(id, ExportStatus::Failed, None).await
            }
        }
    }

    /// Dispatch a job, failing the export if it cannot be scheduled.
    pub async fn dispatch_or_fail(
        &self,
        dispatcher: &dyn JobDispatcher,
        payload: JobPayload,
    ) -> ExportResult<()> {
        let export_id = payload.export_id;
        let Err(err) = dispatcher.dispatch(payload).await else {
            return Ok(());
        };

        tracing::error!(export_id = %export_id, error = %err, "Failed to dispatch export job");
        let marked_failed = match self
            .apply_job_result(export_id, JobOutcome::failure(err.to_string()))
            .await
        {
            Ok(_) => true,
            Err(mark_err) => {
                tracing::error!(
                    export_id = %export_id,
                    error = %mark_err,
                    "Failed to mark export as failed after dispatch error"
                );
                false
            }
        };
        Err(ExportError::Dispatch {
            reason: err.to_string(),
            marked_failed,
        })
    }

    /// Readiness check against the backing store.
    pub async fn check_store(&self) -> ExportResult<()> {
        self.store.health_check().await
    }
}
