//! Observable client state and polling policy.

use chrono::{DateTime, Utc};
use domain::models::{DEFAULT_MAX_POLL_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS};
use std::time::Duration;
use uuid::Uuid;

/// Message for a poll that ran out of attempts.
pub const TIMEOUT_MESSAGE: &str = "PDF generation timed out";

/// Message for an export the server marked failed.
pub const GENERATION_FAILED_MESSAGE: &str = "PDF generation failed";

/// Where the client is in the export workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Idle,
    AwaitingCreation,
    Polling {
        id: Uuid,
        attempt: u32,
    },
    Ready {
        id: Uuid,
        download_url: String,
        expires_at: DateTime<Utc>,
    },
    Failed {
        message: String,
    },
    Expired {
        id: Uuid,
    },
}

impl ClientState {
    /// Whether no more transitions happen without a new trigger.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ClientState::Idle | ClientState::Failed { .. } | ClientState::Expired { .. }
        )
    }

    /// Link to offer the user; only present while ready.
    pub fn download_url(&self) -> Option<&str> {
        match self {
            ClientState::Ready { download_url, .. } => Some(download_url),
            _ => None,
        }
    }

    /// Time left on a ready link at `now`.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            ClientState::Ready { expires_at, .. } => (*expires_at - now).to_std().ok(),
            _ => None,
        }
    }
}

/// How often and how long to poll an export.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Multiplier applied to the interval after each attempt. `1.0` keeps it fixed.
    pub backoff_factor: f64,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        let interval = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);
        Self {
            interval,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            backoff_factor: 1.0,
            max_interval: interval,
        }
    }
}

impl PollPolicy {
    /// Fixed spacing of `interval` for up to `max_attempts` reads.
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff_factor: 1.0,
            max_interval: interval,
        }
    }

    /// Enable back-off, growing the delay by `factor` up to `max_interval`.
    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff_factor = factor.max(1.0);
        self.max_interval = max_interval.max(self.interval);
        self
    }

    /// Delay before the read following `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        if self.backoff_factor <= 1.0 {
            return current;
        }
        current.mul_f64(self.backoff_factor).min(self.max_interval)
    }
}
