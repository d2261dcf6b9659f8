//! Shared utilities and common types for the PDF export service.
//!
//! This crate provides common functionality used across all other crates:
//! - Clock abstraction so expiry arithmetic can be driven from tests
//! - HMAC signing and verification for job callbacks
//! - Common validation logic

pub mod clock;
pub mod crypto;
pub mod validation;
