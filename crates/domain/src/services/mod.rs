//! Domain services for PDF exports.
//!
//! Services contain business logic that operates on domain models.

pub mod dispatcher;
pub mod lifecycle;
pub mod link_guard;
pub mod store;

pub use dispatcher::{DispatchError, JobDispatcher, MockJobDispatcher};
pub use lifecycle::{ExportLifecycleService, ResolvedDownload};
pub use link_guard::{has_expired, is_link_active, link_state, LinkState};
pub use store::{ExportStore, InMemoryExportStore};
