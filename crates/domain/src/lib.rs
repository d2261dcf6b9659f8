//! Domain layer for the PDF export service.
//!
//! This crate contains:
//! - Domain models (ExportRecord, ExportStatus, job payloads)
//! - The export lifecycle service and link expiry guard
//! - Storage and job dispatch seams
//! - Domain error types

pub mod errors;
pub mod models;
pub mod services;
