//! db-vitals - explainable health-check routing and safe query execution.
//!
//! This library exposes the core modules for use in integration tests.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod query;
pub mod router;
pub mod safety;
pub mod sanitize;
