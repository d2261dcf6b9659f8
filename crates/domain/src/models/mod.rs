//! Domain models for PDF exports.

pub mod export;
pub mod job;

pub use export::{
    CreateExportResponse, ExportRecord, ExportStatus, StatusUpdate, UpdateExportRequest,
    UpdateExportResponse, DEFAULT_EXPIRATION_SECS, DEFAULT_MAX_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SOURCE_PDF_URL,
};
pub use job::{JobOutcome, JobPayload};
