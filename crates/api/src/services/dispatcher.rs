//! Export job dispatchers and the job processor.
//!
//! `LocalDispatcher` runs jobs on a spawned task in this process.
//! `WebhookDispatcher` posts a signed payload to a job endpoint, normally this
//! service's own `/api/v1/webhooks/export-job`. That endpoint claims the export,
//! answers 202 and finishes the job on a spawned task, so a dispatch only
//! reports whether the job was accepted.

use async_trait::async_trait;
use domain::errors::{ExportError, ExportResult};
use domain::models::{ExportRecord, ExportStatus, JobOutcome, JobPayload};
use domain::services::{DispatchError, ExportLifecycleService, JobDispatcher};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::middleware::metrics::record_export_transition;

/// Header carrying the HMAC signature of a job payload.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Runs one export job against the lifecycle service.
pub struct ExportJobProcessor {
    lifecycle: Arc<ExportLifecycleService>,
    public_base_url: String,
    generation_delay: Duration,
}

impl ExportJobProcessor {
    pub fn new(
        lifecycle: Arc<ExportLifecycleService>,
        public_base_url: &str,
        generation_delay: Duration,
    ) -> Self {
        Self {
            lifecycle,
            public_base_url: shared::validation::normalize_base_url(public_base_url).to_string(),
            generation_delay,
        }
    }

    /// Link handed out for a completed export.
    pub fn download_url(&self, export_id: Uuid) -> String {
        format!("{}/api/v1/download/{}", self.public_base_url, export_id)
    }

    /// Run the whole job, marking the export failed if anything goes wrong.
    pub async fn process(&self, payload: &JobPayload) -> ExportResult<ExportRecord> {
        self.start(payload).await?;
        self.finish(payload).await
    }

    /// Claim the export by moving it from pending to processing.
    pub async fn start(&self, payload: &JobPayload) -> ExportResult<()> {
        let export_id = payload.export_id;
        match self.lifecycle.mark_processing(export_id).await {
            Ok(_) => {
                record_export_transition(ExportStatus::Processing);
                Ok(())
            }
            Err(err) => Err(self.job_failed(export_id, err).await),
        }
    }

    /// Generate the PDF for a claimed export and complete it.
    pub async fn finish(&self, payload: &JobPayload) -> ExportResult<ExportRecord> {
        let export_id = payload.export_id;

        // Stand-in for rendering `payload.source_url`.
        tokio::time::sleep(self.generation_delay).await;

        let outcome = JobOutcome::Success {
            download_url: self.download_url(export_id),
        };
        match self.lifecycle.apply_job_result(export_id, outcome).await {
            Ok(record) => {
                record_export_transition(ExportStatus::Completed);
                info!(export_id = %export_id, "Export job completed");
                Ok(record)
            }
            Err(err) => Err(self.job_failed(export_id, err).await),
        }
    }

    /// Refuse a job that cannot run and mark its export failed.
    pub async fn reject(&self, export_id: Uuid, reason: &str) {
        warn!(export_id = %export_id, reason = %reason, "Rejecting export job");
        self.mark_failed(export_id, reason).await;
    }

    async fn job_failed(&self, export_id: Uuid, err: ExportError) -> ExportError {
        error!(export_id = %export_id, error = %err, "Export job failed");

        // Nothing to mark, or the export already reached a terminal state.
        if !matches!(
            err,
            ExportError::NotFound(_) | ExportError::InvalidTransition { .. }
        ) {
            self.mark_failed(export_id, &err.to_string()).await;
        }
        err
    }

    async fn mark_failed(&self, export_id: Uuid, reason: &str) {
        match self
            .lifecycle
            .apply_job_result(export_id, JobOutcome::failure(reason))
            .await
        {
            Ok(_) => record_export_transition(ExportStatus::Failed),
            Err(err) => warn!(
                export_id = %export_id,
                error = %err,
                "Could not mark export as failed"
            ),
        }
    }
}

/// Runs jobs in-process after a short pickup delay.
pub struct LocalDispatcher {
    processor: Arc<ExportJobProcessor>,
    pickup_delay: Duration,
}

impl LocalDispatcher {
    pub fn new(processor: Arc<ExportJobProcessor>, pickup_delay: Duration) -> Self {
        Self {
            processor,
            pickup_delay,
        }
    }
}

#[async_trait]
impl JobDispatcher for LocalDispatcher {
    async fn dispatch(&self, payload: JobPayload) -> Result<(), DispatchError> {
        let processor = Arc::clone(&self.processor);
        let pickup_delay = self.pickup_delay;

        info!(export_id = %payload.export_id, "Scheduling local export job");
        tokio::spawn(async move {
            tokio::time::sleep(pickup_delay).await;
            // Errors are logged and recorded by the processor.
            let _ = processor.process(&payload).await;
        });
        Ok(())
    }
}

/// Posts signed job payloads to a job endpoint.
pub struct WebhookDispatcher {
    client: Client,
    callback_url: String,
    secret: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(
        callback_url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Prepare(e.to_string()))?;

        Ok(Self {
            client,
            callback_url: callback_url.into(),
            secret,
        })
    }
}

#[async_trait]
impl JobDispatcher for WebhookDispatcher {
    async fn dispatch(&self, payload: JobPayload) -> Result<(), DispatchError> {
        let body =
            serde_json::to_vec(&payload).map_err(|e| DispatchError::Prepare(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.callback_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(secret) = &self.secret {
            let signature = shared::crypto::sign_payload(&body, secret)
                .map_err(|e| DispatchError::Prepare(e.to_string()))?;
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| DispatchError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                export_id = %payload.export_id,
                status_code = status.as_u16(),
                "Job endpoint rejected export job"
            );
            return Err(DispatchError::Rejected(status.as_u16()));
        }

        info!(
            export_id = %payload.export_id,
            status_code = status.as_u16(),
            "Export job delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Bytes,
        http::{HeaderMap, StatusCode},
        routing::post,
        Router,
    };
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use domain::models::StatusUpdate;
    use domain::services::{ExportStore, InMemoryExportStore};
    use shared::clock::ManualClock;
    use std::sync::Mutex;

    fn lifecycle() -> (Arc<InMemoryExportStore>, Arc<ExportLifecycleService>) {
        let store = Arc::new(InMemoryExportStore::new());
        let service = ExportLifecycleService::new(
            store.clone(),
            Arc::new(ManualClock::default()),
            ChronoDuration::seconds(120),
        );
        (store, Arc::new(service))
    }

    fn processor(lifecycle: Arc<ExportLifecycleService>) -> Arc<ExportJobProcessor> {
        Arc::new(ExportJobProcessor::new(
            lifecycle,
            "http://localhost:8080/",
            Duration::from_millis(1000),
        ))
    }

    #[test]
    fn test_download_url_format() {
        let (_, lifecycle) = lifecycle();
        let processor = processor(lifecycle);
        let id = Uuid::nil();
        assert_eq!(
            processor.download_url(id),
            format!("http://localhost:8080/api/v1/download/{}", id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_completes_export() {
        let (store, lifecycle) = lifecycle();
        let record = lifecycle.create().await.unwrap();
        let processor = processor(lifecycle);

        let done = processor
            .process(&JobPayload::new(record.id, "https://example.com/a.pdf"))
            .await
            .unwrap();

        assert_eq!(done.status, ExportStatus::Completed);
        assert_eq!(
            done.download_url,
            Some(processor.download_url(record.id))
        );
        assert!(store.find(record.id).await.unwrap().unwrap().expires_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_unknown_export() {
        let (store, lifecycle) = lifecycle();
        let processor = processor(lifecycle);
        let err = processor
            .process(&JobPayload::new(Uuid::new_v4(), "https://example.com/a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::NotFound(_)));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_leaves_terminal_export_alone() {
        let (store, lifecycle) = lifecycle();
        let record = lifecycle.create().await.unwrap();
        lifecycle
            .apply_job_result(record.id, JobOutcome::failure("cancelled"))
            .await
            .unwrap();
        let processor = processor(lifecycle);

        let err = processor
            .process(&JobPayload::new(record.id, "https://example.com/a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidTransition { .. }));
        let stored = store.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Failed);
    }

    /// Store that cannot persist the completed state.
    struct BrokenCompletionStore {
        inner: InMemoryExportStore,
    }

    #[async_trait]
    impl ExportStore for BrokenCompletionStore {
        async fn insert(&self, record: &ExportRecord) -> ExportResult<()> {
            self.inner.insert(record).await
        }

        async fn find(&self, id: Uuid) -> ExportResult<Option<ExportRecord>> {
            self.inner.find(id).await
        }

        async fn apply_update(
            &self,
            id: Uuid,
            expected: ExportStatus,
            update: &StatusUpdate,
        ) -> ExportResult<Option<ExportRecord>> {
            if update.status == ExportStatus::Completed {
                return Err(ExportError::Persistence("disk full".into()));
            }
            self.inner.apply_update(id, expected, update).await
        }

        async fn latest_active(&self, now: DateTime<Utc>) -> ExportResult<Option<ExportRecord>> {
            self.inner.latest_active(now).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_processor_storage_error_marks_failed() {
        let store = Arc::new(BrokenCompletionStore {
            inner: InMemoryExportStore::new(),
        });
        let lifecycle = Arc::new(ExportLifecycleService::new(
            store.clone(),
            Arc::new(ManualClock::default()),
            ChronoDuration::seconds(120),
        ));
        let record = lifecycle.create().await.unwrap();
        let processor = processor(lifecycle);

        let err = processor
            .process(&JobPayload::new(record.id, "https://example.com/a.pdf"))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Persistence(_)));
        let stored = store.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Failed);
        assert!(stored.download_url.is_none());
        assert!(stored.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_reject_marks_pending_export_failed() {
        let (store, lifecycle) = lifecycle();
        let record = lifecycle.create().await.unwrap();
        let processor = processor(lifecycle);

        processor.reject(record.id, "Invalid job payload").await;

        let stored = store.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Failed);
    }

    #[tokio::test]
    async fn test_reject_unknown_export_is_harmless() {
        let (store, lifecycle) = lifecycle();
        let processor = processor(lifecycle);

        processor.reject(Uuid::new_v4(), "Invalid job payload").await;
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_then_finish() {
        let (store, lifecycle) = lifecycle();
        let record = lifecycle.create().await.unwrap();
        let processor = processor(lifecycle);
        let payload = JobPayload::new(record.id, "https://example.com/a.pdf");

        processor.start(&payload).await.unwrap();
        let stored = store.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Processing);

        // A second claim loses.
        let err = processor.start(&payload).await.unwrap_err();
        assert!(matches!(err, ExportError::InvalidTransition { .. }));

        let done = processor.finish(&payload).await.unwrap();
        assert_eq!(done.status, ExportStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_dispatcher_runs_job_in_background() {
        let (store, lifecycle) = lifecycle();
        let record = lifecycle.create().await.unwrap();
        let dispatcher = LocalDispatcher::new(processor(lifecycle), Duration::from_millis(1000));

        dispatcher
            .dispatch(JobPayload::new(record.id, "https://example.com/a.pdf"))
            .await
            .unwrap();

        // Still pending until the pickup delay elapses.
        let stored = store.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Pending);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let stored = store.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Processing);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let stored = store.find(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExportStatus::Completed);
    }

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(HeaderMap, Bytes)>>>,
    }

    async fn spawn_job_endpoint(status: StatusCode) -> (String, Captured) {
        let captured = Captured::default();
        let sink = captured.clone();
        let app = Router::new().route(
            "/job",
            post(move |headers: HeaderMap, body: Bytes| {
                let sink = sink.clone();
                async move {
                    sink.requests.lock().unwrap().push((headers, body));
                    status
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/job", addr), captured)
    }

    #[tokio::test]
    async fn test_webhook_dispatcher_signs_payload() {
        let (url, captured) = spawn_job_endpoint(StatusCode::OK).await;
        let dispatcher =
            WebhookDispatcher::new(url, Some("s3cret".to_string()), Duration::from_secs(5))
                .unwrap();
        let payload = JobPayload::new(Uuid::new_v4(), "https://example.com/a.pdf");

        dispatcher.dispatch(payload.clone()).await.unwrap();

        let requests = captured.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (headers, body) = &requests[0];
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(shared::crypto::verify_signature(body, "s3cret", signature));
        let sent: JobPayload = serde_json::from_slice(body).unwrap();
        assert_eq!(sent, payload);
    }

    #[tokio::test]
    async fn test_webhook_dispatcher_unsigned_without_secret() {
        let (url, captured) = spawn_job_endpoint(StatusCode::OK).await;
        let dispatcher = WebhookDispatcher::new(url, None, Duration::from_secs(5)).unwrap();

        dispatcher
            .dispatch(JobPayload::new(Uuid::new_v4(), "https://example.com/a.pdf"))
            .await
            .unwrap();

        let requests = captured.requests.lock().unwrap();
        assert!(requests[0].0.get(SIGNATURE_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_webhook_dispatcher_rejected() {
        let (url, _) = spawn_job_endpoint(StatusCode::INTERNAL_SERVER_ERROR).await;
        let dispatcher = WebhookDispatcher::new(url, None, Duration::from_secs(5)).unwrap();

        let err = dispatcher
            .dispatch(JobPayload::new(Uuid::new_v4(), "https://example.com/a.pdf"))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Rejected(500));
    }

    #[tokio::test]
    async fn test_webhook_dispatcher_unreachable() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dispatcher = WebhookDispatcher::new(
            format!("http://{}/job", addr),
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let err = dispatcher
            .dispatch(JobPayload::new(Uuid::new_v4(), "https://example.com/a.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unreachable(_)));
    }
}
