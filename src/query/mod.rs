//! Safe query execution for db-vitals.
//!
//! This module isolates bind validation, timeout enforcement, and result
//! shaping so the execution path can be tested against a mock client.

pub mod binds;
pub mod executor;

#[allow(unused_imports)]
pub use binds::{validate_binds, BindValues};
#[allow(unused_imports)]
pub use executor::{ExecutionResult, QueryExecutionResult, QueryExecutor};
