//! Export polling state machine.
//!
//! An [`ExportPoller`] owns at most one background task. Triggering again,
//! resuming, calling [`ExportPoller::shutdown`] or dropping the poller cancels
//! the running task before anything else happens, so a superseded task never
//! publishes state.

use domain::models::{ExportRecord, ExportStatus};
use domain::services::is_link_active;
use shared::clock::{Clock, SystemClock};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ClientError, ExportApi};
use crate::state::{ClientState, PollPolicy, GENERATION_FAILED_MESSAGE, TIMEOUT_MESSAGE};

/// Drives one export at a time from trigger to expiry.
///
/// Must be used from within a tokio runtime.
pub struct ExportPoller {
    api: Arc<dyn ExportApi>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
    state: Arc<watch::Sender<ClientState>>,
    task: Option<PollTask>,
}

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollTask {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

impl ExportPoller {
    pub fn new(api: Arc<dyn ExportApi>, policy: PollPolicy) -> Self {
        Self::with_clock(api, Arc::new(SystemClock), policy)
    }

    pub fn with_clock(api: Arc<dyn ExportApi>, clock: Arc<dyn Clock>, policy: PollPolicy) -> Self {
        let (state, _) = watch::channel(ClientState::Idle);
        Self {
            api,
            clock,
            policy,
            state: Arc::new(state),
            task: None,
        }
    }

    /// Receiver that sees every state published from now on.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.state.subscribe()
    }

    /// Current state snapshot.
    pub fn state(&self) -> ClientState {
        self.state.borrow().clone()
    }

    /// Create a new export and poll it, replacing any running task.
    pub fn trigger(&mut self) {
        self.stop_task();
        self.state.send_replace(ClientState::AwaitingCreation);
        self.spawn(|run| run.create_and_poll());
    }

    /// Pick up the newest active export without creating one.
    ///
    /// Ends in `Ready` (then `Expired`) when the server has a live link,
    /// otherwise in `Idle`.
    pub fn resume_latest(&mut self) {
        self.stop_task();
        self.spawn(|run| run.resume_latest());
    }

    /// Cancel the running task. The last published state is kept.
    pub fn shutdown(&mut self) {
        self.stop_task();
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Cancelling previous export poll task");
            task.stop();
        }
    }

    fn spawn<F, Fut>(&mut self, work: F)
    where
        F: FnOnce(PollRun) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let run = PollRun {
            api: Arc::clone(&self.api),
            clock: Arc::clone(&self.clock),
            policy: self.policy.clone(),
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
        };
        let token = cancel.clone();
        let work = work(run);

        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => debug!("Export poll task cancelled"),
                _ = work => {}
            }
        });
        self.task = Some(PollTask { cancel, handle });
    }
}

impl Drop for ExportPoller {
    fn drop(&mut self) {
        self.stop_task();
    }
}

/// Everything one background task needs.
struct PollRun {
    api: Arc<dyn ExportApi>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
    state: Arc<watch::Sender<ClientState>>,
    cancel: CancellationToken,
}

impl PollRun {
    /// Publish unless this run has been superseded.
    ///
    /// The check happens under the channel's write lock, so it cannot
    /// interleave with a newer run's first publish.
    fn publish(&self, next: ClientState) {
        let cancel = &self.cancel;
        self.state.send_if_modified(|current| {
            if cancel.is_cancelled() {
                return false;
            }
            *current = next;
            true
        });
    }

    fn fail(&self, message: impl Into<String>) {
        self.publish(ClientState::Failed {
            message: message.into(),
        });
    }

    async fn create_and_poll(self) {
        let created = match self.api.create_export().await {
            Ok(created) => created,
            Err(err) => {
                warn!(error = %err, "Failed to trigger export");
                self.fail(format!("Failed to trigger export: {}", err));
                return;
            }
        };

        info!(export_id = %created.id, "Export triggered, polling for completion");
        self.poll(created.id).await;
    }

    async fn poll(&self, id: Uuid) {
        let mut delay = self.policy.interval;

        for attempt in 1..=self.policy.max_attempts {
            self.publish(ClientState::Polling { id, attempt });

            match self.api.get_export(id).await {
                Ok(record) => match record.status {
                    ExportStatus::Completed => return self.hold_link(record).await,
                    ExportStatus::Failed => {
                        info!(export_id = %id, "Export failed on the server");
                        return self.fail(GENERATION_FAILED_MESSAGE);
                    }
                    ExportStatus::Pending | ExportStatus::Processing => {}
                },
                Err(ClientError::NotFound(_)) => {
                    warn!(export_id = %id, "Export disappeared while polling");
                    return self.fail("Export no longer exists");
                }
                Err(err) => {
                    warn!(export_id = %id, error = %err, "Export status read failed");
                    return self.fail(format!("Failed to fetch export status: {}", err));
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(delay).await;
                delay = self.policy.next_delay(delay);
            }
        }

        warn!(
            export_id = %id,
            attempts = self.policy.max_attempts,
            "Export polling timed out"
        );
        self.fail(TIMEOUT_MESSAGE);
    }

    /// Offer the link until it runs out.
    async fn hold_link(&self, record: ExportRecord) {
        let now = self.clock.now();
        let (download_url, expires_at) = match (&record.download_url, record.expires_at) {
            (Some(url), Some(expires_at)) if is_link_active(&record, now) => {
                (url.clone(), expires_at)
            }
            _ => {
                info!(export_id = %record.id, "Export link already expired");
                return self.publish(ClientState::Expired { id: record.id });
            }
        };

        self.publish(ClientState::Ready {
            id: record.id,
            download_url,
            expires_at,
        });

        // Expiry is local; the server is not consulted again.
        let remaining = (expires_at - now).to_std().unwrap_or_default();
        tokio::time::sleep(remaining).await;

        info!(export_id = %record.id, "Export link expired");
        self.publish(ClientState::Expired { id: record.id });
    }

    async fn resume_latest(self) {
        match self.api.latest_export().await {
            Ok(Some(record)) if is_link_active(&record, self.clock.now()) => {
                info!(export_id = %record.id, "Resuming active export");
                self.hold_link(record).await;
            }
            Ok(_) => self.publish(ClientState::Idle),
            Err(err) => {
                warn!(error = %err, "Failed to fetch latest export");
                self.publish(ClientState::Idle);
            }
        }
    }
}
