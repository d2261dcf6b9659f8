//! Storage seam for export records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::errors::{ExportError, ExportResult};
use crate::models::{ExportRecord, ExportStatus, StatusUpdate};

/// Persistence operations the lifecycle service needs.
#[async_trait]
pub trait ExportStore: Send + Sync {
    /// Insert a newly created record.
    async fn insert(&self, record: &ExportRecord) -> ExportResult<()>;

    /// Fetch a record regardless of expiry.
    async fn find(&self, id: Uuid) -> ExportResult<Option<ExportRecord>>;

    /// Write `update` only if the row is still in `expected` status.
    ///
    /// Returns `None` when no row matched, either because the id is unknown or
    /// because another writer moved the status first.
    async fn apply_update(
        &self,
        id: Uuid,
        expected: ExportStatus,
        update: &StatusUpdate,
    ) -> ExportResult<Option<ExportRecord>>;

    /// Most recently created record whose link expires after `now`.
    async fn latest_active(&self, now: DateTime<Utc>) -> ExportResult<Option<ExportRecord>>;

    /// Cheap connectivity check for readiness probes.
    async fn health_check(&self) -> ExportResult<()> {
        Ok(())
    }
}

/// Process-local store, used for tests and `storage.backend = "memory"`.
#[derive(Debug, Default)]
pub struct InMemoryExportStore {
    records: RwLock<HashMap<Uuid, ExportRecord>>,
}

impl InMemoryExportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record in place as-is, bypassing lifecycle checks.
    pub fn seed(&self, record: ExportRecord) {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExportStore for InMemoryExportStore {
    async fn insert(&self, record: &ExportRecord) -> ExportResult<()> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&record.id) {
            return Err(ExportError::Persistence(format!(
                "duplicate export id {}",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> ExportResult<Option<ExportRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(&id).cloned())
    }

    async fn apply_update(
        &self,
        id: Uuid,
        expected: ExportStatus,
        update: &StatusUpdate,
    ) -> ExportResult<Option<ExportRecord>> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        match records.get_mut(&id) {
            Some(record) if record.status == expected => {
                update.apply_to(record);
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn latest_active(&self, now: DateTime<Utc>) -> ExportResult<Option<ExportRecord>> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .values()
            .filter(|r| r.expires_at.is_some_and(|expires_at| expires_at > now))
            .max_by_key(|r| r.created_at)
            .cloned())
    }
}
