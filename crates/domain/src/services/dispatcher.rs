//! Job dispatch contract.
//!
//! A dispatcher hands a [`JobPayload`] to something that will eventually
//! report a [`JobOutcome`](crate::models::JobOutcome) back through
//! `ExportLifecycleService::apply_job_result`. Dispatch itself only reports
//! whether the job was scheduled.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::models::JobPayload;

/// Scheduling a job failed; the export will never be processed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Job endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Job endpoint rejected the job with status {0}")]
    Rejected(u16),

    #[error("Failed to prepare job: {0}")]
    Prepare(String),
}

/// Schedules background export jobs.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, payload: JobPayload) -> Result<(), DispatchError>;
}

/// Dispatcher that records payloads instead of running jobs.
#[derive(Debug, Clone, Default)]
pub struct MockJobDispatcher {
    pub simulate_failure: bool,
    dispatched: Arc<Mutex<Vec<JobPayload>>>,
}

impl MockJobDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Payloads accepted so far.
    pub fn dispatched(&self) -> Vec<JobPayload> {
        self.dispatched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl JobDispatcher for MockJobDispatcher {
    async fn dispatch(&self, payload: JobPayload) -> Result<(), DispatchError> {
        if self.simulate_failure {
            tracing::warn!(
                export_id = %payload.export_id,
                "Mock dispatcher simulating failure"
            );
            return Err(DispatchError::Unreachable("Simulated failure".to_string()));
        }

        tracing::info!(
            export_id = %payload.export_id,
            source_url = %payload.source_url,
            "Mock: Would dispatch export job"
        );

        self.dispatched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload);
        Ok(())
    }
}
