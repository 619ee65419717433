//! PostgreSQL database client implementation.
//!
//! Implements [`DatabaseClient`] using sqlx. Each `run_query` call detaches a
//! connection from the pool so the future owns it outright: if the executor
//! drops the future on timeout, the connection drops with it and the closed
//! socket is the server's signal to abandon the statement.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Connection, Row as SqlxRow, TypeInfo};
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::db::{BindValue, DatabaseClient, NamedBind, RawQueryOutput, Row, Value};
use crate::error::{Result, VitalsError};

/// Maximum number of pooled connections.
const MAX_CONNECTIONS: u32 = 5;

/// Timeout for acquiring a connection from the pool.
const ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects to the configured database with bounded retry on transient
    /// failures.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to {}", config.display_string());
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let transient = is_transient_error(&e);
                    last_error = Some(e);

                    if !transient {
                        break;
                    }
                    if attempt < MAX_RETRY_ATTEMPTS {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2; // Exponential backoff
                    }
                }
            }
        }

        Err(map_connection_error(
            last_error.expect("at least one attempt was made"),
            config,
        ))
    }

    /// Creates a client from an existing pool. Primarily useful for testing.
    #[allow(dead_code)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn run_query(
        &self,
        sql: &str,
        binds: &[NamedBind],
        max_rows: usize,
    ) -> Result<RawQueryOutput> {
        // Detached so this future, not the pool, owns the session.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| VitalsError::connection(format!("failed to acquire connection: {e}")))?
            .detach();

        let outcome = fetch_capped(&mut conn, sql, binds, max_rows).await;

        // Graceful close on the paths that survive to this point. A future
        // dropped on timeout never gets here; its connection closes hard.
        if let Err(e) = conn.close().await {
            debug!("connection close reported an error: {e}");
        }

        outcome
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Streams rows, materializing at most `max_rows` and probing one further row
/// only to learn whether the result was cut short.
async fn fetch_capped(
    conn: &mut PgConnection,
    sql: &str,
    binds: &[NamedBind],
    max_rows: usize,
) -> Result<RawQueryOutput> {
    let rewritten = rewrite_placeholders(sql, binds)?;

    let mut query = sqlx::query(&rewritten);
    for bind in binds {
        query = apply_bind(query, &bind.value);
    }

    let mut stream = query.fetch(&mut *conn);

    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Row> = Vec::new();
    let mut more_rows = false;

    while let Some(pg_row) = stream
        .try_next()
        .await
        .map_err(|e| VitalsError::query(format_query_error(e)))?
    {
        if columns.is_empty() {
            columns = pg_row
                .columns()
                .iter()
                .map(|col| col.name().to_string())
                .collect();
        }
        if rows.len() == max_rows {
            more_rows = true;
            break;
        }
        rows.push(convert_row(&pg_row));
    }

    Ok(RawQueryOutput {
        columns,
        rows,
        more_rows,
    })
}

/// Rewrites `:name` placeholders to positional `$n` parameters, where `n` is
/// the 1-based position of the bind in `binds`. Skips string literals and
/// `::` casts. Repeated references to one name map to the same parameter.
fn rewrite_placeholders(sql: &str, binds: &[NamedBind]) -> Result<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if c == '\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => {
                out.push(c);
                in_string = true;
                i += 1;
            }
            ':' => {
                if chars.get(i + 1) == Some(&':') {
                    out.push_str("::");
                    i += 2;
                    continue;
                }
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let starts_ident = chars
                    .get(start)
                    .map(|c| c.is_ascii_alphabetic() || *c == '_')
                    .unwrap_or(false);
                if end > start && starts_ident {
                    let name: String = chars[start..end].iter().collect();
                    match binds.iter().position(|bind| bind.name == name) {
                        Some(pos) => {
                            out.push('$');
                            out.push_str(&(pos + 1).to_string());
                        }
                        None => {
                            return Err(VitalsError::validation(format!(
                                "SQL references undeclared bind :{name}"
                            )));
                        }
                    }
                    i = end;
                } else {
                    out.push(':');
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

fn apply_bind<'q>(query: PgQuery<'q>, value: &'q BindValue) -> PgQuery<'q> {
    match value {
        BindValue::Null => query.bind(Option::<String>::None),
        BindValue::Text(s) => query.bind(s.as_str()),
        BindValue::Int(i) => query.bind(*i),
        BindValue::Float(f) => query.bind(*f),
        BindValue::Bool(b) => query.bind(*b),
        // Dates travel as their validated ISO strings; the SQL casts them
        BindValue::Date(s) => query.bind(s.as_str()),
        BindValue::DateTime(s) => query.bind(s.as_str()),
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|ts| Value::String(ts.to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|ts| Value::String(ts.to_rfc3339()))
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        // For all other types, try string first, then float (covers casts)
        _ => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .or_else(|| {
                row.try_get::<Option<f64>, _>(index)
                    .ok()
                    .flatten()
                    .map(Value::Float)
            })
            .unwrap_or(Value::Null),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    // Connection refused or timeout are often transient
    if error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
    {
        return true;
    }

    // Authentication and database-not-found errors are not transient
    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
        || error_str.contains("ssl")
        || error_str.contains("tls")
    {
        return false;
    }

    // Default to not retrying unknown errors
    false
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> VitalsError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        VitalsError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        VitalsError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        VitalsError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        VitalsError::connection(
            "Server requires SSL. Add '?sslmode=require' to connection string.".to_string(),
        )
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        VitalsError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        VitalsError::connection(error.to_string())
    }
}

/// Formats a query error with Postgres detail fields when available.
fn format_query_error(error: sqlx::Error) -> String {
    if let Some(db_error) = error.as_database_error() {
        let mut result = String::from("ERROR: ");
        result.push_str(db_error.message());

        if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            if let Some(detail) = pg_error.detail() {
                result.push_str("\n  DETAIL: ");
                result.push_str(detail);
            }
            if let Some(hint) = pg_error.hint() {
                result.push_str("\n  HINT: ");
                result.push_str(hint);
            }
            if let Some(table) = pg_error.table() {
                result.push_str("\n  TABLE: ");
                result.push_str(table);
            }
            if let Some(column) = pg_error.column() {
                result.push_str("\n  COLUMN: ");
                result.push_str(column);
            }
            if let Some(constraint) = pg_error.constraint() {
                result.push_str("\n  CONSTRAINT: ");
                result.push_str(constraint);
            }
        }

        result
    } else {
        error.to_string()
    }
}
