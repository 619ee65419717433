//! Database abstraction layer.
//!
//! Provides a trait-based interface so the executor can run against Postgres
//! in production and scripted mocks in tests.

mod mock;
mod postgres;
mod types;

#[allow(unused_imports)]
pub use mock::MockDatabaseClient;
pub use postgres::PostgresClient;
#[allow(unused_imports)]
pub use types::{RawQueryOutput, Row, Value};

pub(crate) use types::duration_ms;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::error::Result;

/// A bind value after type conversion, ready for the wire.
///
/// Date and datetime values stay in their validated ISO-8601 string form;
/// the SQL casts them as needed.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(String),
    DateTime(String),
}

/// A named, converted bind parameter in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedBind {
    pub name: String,
    pub value: BindValue,
}

impl NamedBind {
    pub fn new(name: impl Into<String>, value: BindValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Creates a database client for the given configuration.
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn DatabaseClient>> {
    let client = PostgresClient::connect(config).await?;
    Ok(Arc::new(client))
}

/// Trait defining the interface for database clients.
///
/// A `run_query` call owns its database session for the duration of the call
/// and releases it on every exit path. Implementations must tolerate the
/// returned future being dropped mid-flight (the executor aborts timed-out
/// workers); dropping the future must release the session too.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Runs a read query, applying `binds` to its `:name` placeholders and
    /// materializing at most `max_rows` rows. One extra row is probed only to
    /// detect overflow, reported via [`RawQueryOutput::more_rows`].
    async fn run_query(
        &self,
        sql: &str,
        binds: &[NamedBind],
        max_rows: usize,
    ) -> Result<RawQueryOutput>;

    /// Closes the underlying connections.
    async fn close(&self) -> Result<()>;
}
