//! Job dispatch and processing.

pub mod dispatcher;

pub use dispatcher::{ExportJobProcessor, LocalDispatcher, WebhookDispatcher, SIGNATURE_HEADER};
