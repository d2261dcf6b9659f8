//! Client-side export workflow: trigger an export, poll it to a terminal
//! state and hold the download link until it expires.

pub mod api;
pub mod countdown;
pub mod poller;
pub mod state;

pub use api::{ClientError, ExportApi, HttpExportApi};
pub use poller::ExportPoller;
pub use state::{ClientState, PollPolicy};
