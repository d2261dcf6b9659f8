//! Download link expiry checks.
//!
//! Every place that decides whether a link may be used goes through
//! [`is_link_active`]: the download route, the lifecycle read path and the
//! polling client.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{ExportRecord, ExportStatus};

/// Whether `record`'s download link is usable at `now`.
pub fn is_link_active(record: &ExportRecord, now: DateTime<Utc>) -> bool {
    record.status == ExportStatus::Completed
        && record.download_url.is_some()
        && record.expires_at.is_some_and(|expires_at| now < expires_at)
}

/// Whether `record`'s link existed and has run out at `now`.
pub fn has_expired(record: &ExportRecord, now: DateTime<Utc>) -> bool {
    record.expires_at.is_some_and(|expires_at| expires_at <= now)
}

/// Classification of a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkState {
    NotFound,
    NotReady,
    Expired,
    Active,
}

impl LinkState {
    /// Path segment of the explanation route under `/download/`.
    pub fn as_path(&self) -> &'static str {
        match self {
            LinkState::NotFound => "not-found",
            LinkState::NotReady => "not-ready",
            LinkState::Expired => "expired",
            LinkState::Active => "active",
        }
    }
}

/// Classify a download for `record` at `now`.
pub fn link_state(record: Option<&ExportRecord>, now: DateTime<Utc>) -> LinkState {
    match record {
        None => LinkState::NotFound,
        Some(r) if is_link_active(r, now) => LinkState::Active,
        Some(r) if has_expired(r, now) => LinkState::Expired,
        Some(_) => LinkState::NotReady,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn record(status: ExportStatus, expires_in: Option<i64>, now: DateTime<Utc>) -> ExportRecord {
        let mut r = ExportRecord::new_pending(Uuid::new_v4(), now - Duration::seconds(10));
        r.status = status;
        if let Some(secs) = expires_in {
            r.download_url = Some("http://x/y".into());
            r.expires_at = Some(now + Duration::seconds(secs));
        }
        r
    }

    #[test]
    fn test_inactive_for_every_non_completed_status() {
        let now = Utc::now();
        for status in [
            ExportStatus::Pending,
            ExportStatus::Processing,
            ExportStatus::Failed,
        ] {
            // Even with a future expiry the status decides.
            assert!(!is_link_active(&record(status, Some(60), now), now));
            assert!(!is_link_active(&record(status, None, now), now));
        }
    }

    #[test]
    fn test_active_before_expiry() {
        let now = Utc::now();
        assert!(is_link_active(
            &record(ExportStatus::Completed, Some(60), now),
            now
        ));
    }

    #[test]
    fn test_inactive_at_and_after_expiry() {
        let now = Utc::now();
        assert!(!is_link_active(
            &record(ExportStatus::Completed, Some(0), now),
            now
        ));
        assert!(!is_link_active(
            &record(ExportStatus::Completed, Some(-1), now),
            now
        ));
    }

    #[test]
    fn test_completed_without_link_is_inactive() {
        let now = Utc::now();
        assert!(!is_link_active(
            &record(ExportStatus::Completed, None, now),
            now
        ));
    }

    #[test]
    fn test_link_state_classification() {
        let now = Utc::now();
        assert_eq!(link_state(None, now), LinkState::NotFound);
        assert_eq!(
            link_state(Some(&record(ExportStatus::Pending, None, now)), now),
            LinkState::NotReady
        );
        assert_eq!(
            link_state(Some(&record(ExportStatus::Failed, None, now)), now),
            LinkState::NotReady
        );
        assert_eq!(
            link_state(Some(&record(ExportStatus::Completed, Some(-5), now)), now),
            LinkState::Expired
        );
        assert_eq!(
            link_state(Some(&record(ExportStatus::Completed, Some(5), now)), now),
            LinkState::Active
        );
    }

    #[test]
    fn test_link_state_paths() {
        assert_eq!(LinkState::NotFound.as_path(), "not-found");
        assert_eq!(LinkState::NotReady.as_path(), "not-ready");
        assert_eq!(LinkState::Expired.as_path(), "expired");
        assert_eq!(
            serde_json::to_value(LinkState::NotReady).unwrap(),
            "not-ready"
        );
    }
}
