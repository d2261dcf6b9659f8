//! Repository implementations for database operations.

pub mod pdf_export;

pub use pdf_export::PdfExportRepository;
