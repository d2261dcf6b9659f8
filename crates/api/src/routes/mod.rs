//! HTTP route handlers.

pub mod download;
pub mod exports;
pub mod health;
pub mod webhooks;
