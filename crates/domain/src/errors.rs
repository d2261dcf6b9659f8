//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ExportStatus;

/// Errors raised by export lifecycle operations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Export {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error("Cannot transition export from {from} to {to}")]
    InvalidTransition { from: ExportStatus, to: ExportStatus },

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The job could not be scheduled. `marked_failed` is false when the
    /// follow-up failed transition did not land either.
    #[error("Dispatch error: {reason}")]
    Dispatch { reason: String, marked_failed: bool },
}

pub type ExportResult<T> = Result<T, ExportError>;
