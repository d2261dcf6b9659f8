//! Persistence layer for the PDF export service.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - The PostgreSQL export store

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
