//! Error types for db-vitals.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

/// Main error type for db-vitals operations.
#[derive(Error, Debug)]
pub enum VitalsError {
    /// Catalog loading errors (missing directory, bad JSON, schema violations).
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request validation errors (rejected SQL shape, bad bind parameters).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A query exceeded its wall-clock budget.
    #[error("Query timed out after {0}s")]
    Timeout(u64),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors raised by the database (syntax, missing objects, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VitalsError {
    /// Creates a catalog error with the given message.
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a timeout error for the given budget in seconds.
    pub fn timeout(budget_seconds: u64) -> Self {
        Self::Timeout(budget_seconds)
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Catalog(_) => "Catalog Error",
            Self::Config(_) => "Configuration Error",
            Self::Validation(_) => "Validation Error",
            Self::Timeout(_) => "Timeout Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using VitalsError.
pub type Result<T> = std::result::Result<T, VitalsError>;
