//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod pdf_export;

pub use pdf_export::PdfExportEntity;
