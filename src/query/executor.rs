//! Safe query execution.
//!
//! Every query runs through the same pipeline: SQL shape validation, bind
//! validation and conversion, execution on a worker task under a hard
//! wall-clock budget, capped fetch, sanitization. Failures at any stage are
//! folded into the per-query result instead of escaping; callers always get a
//! `QueryExecutionResult` back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::{ControlDefinition, ControlIntent, QueryDefinition};
use crate::db::{DatabaseClient, NamedBind, RawQueryOutput, Row};
use crate::error::{Result, VitalsError};
use crate::query::binds::{validate_binds, BindValues};
use crate::safety;
use crate::sanitize::Sanitizer;

/// Sanitized outcome of a single query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryExecutionResult {
    pub query_id: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Number of rows returned after sanitization.
    pub row_count: usize,
    /// True when the fetch cap or the sanitizer row cap dropped rows.
    pub truncated: bool,
    pub redaction_count: usize,
    pub truncation_count: usize,
    #[serde(rename = "execution_time_ms", with = "crate::db::duration_ms")]
    pub execution_time: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryExecutionResult {
    fn failed(query_id: &str, execution_time: Duration, error: String) -> Self {
        Self {
            query_id: query_id.to_string(),
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
            redaction_count: 0,
            truncation_count: 0,
            execution_time,
            error: Some(error),
        }
    }
}

/// Aggregate outcome of running every query of a control.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub control_id: String,
    pub control_version: String,
    pub intent: ControlIntent,
    pub results: Vec<QueryExecutionResult>,
    #[serde(rename = "total_execution_time_ms", with = "crate::db::duration_ms")]
    pub total_execution_time: Duration,
    pub has_errors: bool,
    pub errors: Vec<String>,
}

/// Executes control queries against a database client with validation,
/// timeout enforcement, and result sanitization.
pub struct QueryExecutor {
    client: Arc<dyn DatabaseClient>,
    sanitizer: Sanitizer,
}

impl QueryExecutor {
    pub fn new(client: Arc<dyn DatabaseClient>) -> Self {
        Self {
            client,
            sanitizer: Sanitizer::default(),
        }
    }

    #[allow(dead_code)]
    pub fn with_sanitizer(client: Arc<dyn DatabaseClient>, sanitizer: Sanitizer) -> Self {
        Self { client, sanitizer }
    }

    /// Runs every query of a control in declaration order, continuing past
    /// per-query failures, and aggregates the outcomes.
    ///
    /// The supplied binds cover the whole control; each query receives only
    /// the entries its own bind schema declares. A name no query declares
    /// rejects the control before anything runs.
    pub async fn execute_control(
        &self,
        control: &ControlDefinition,
        binds: &BindValues,
    ) -> ExecutionResult {
        info!(
            "executing control '{}' ({} queries)",
            control.control_id,
            control.queries.len()
        );

        for name in binds.keys() {
            let declared = control
                .queries
                .iter()
                .any(|q| q.binds.iter().any(|spec| spec.name == *name));
            if !declared {
                warn!(
                    "control '{}' rejected: unexpected bind parameter",
                    control.control_id
                );
                return ExecutionResult {
                    control_id: control.control_id.clone(),
                    control_version: control.version.clone(),
                    intent: control.intent,
                    results: Vec::new(),
                    total_execution_time: Duration::ZERO,
                    has_errors: true,
                    errors: vec![format!("unexpected bind parameter: {name}")],
                };
            }
        }

        let mut results = Vec::with_capacity(control.queries.len());
        let mut errors = Vec::new();

        for query in &control.queries {
            let query_binds = binds_for_query(query, binds);
            let result = self.execute_query(query, &query_binds).await;
            if let Some(error) = &result.error {
                errors.push(format!("{}: {}", result.query_id, error));
            }
            results.push(result);
        }

        let total_execution_time = results.iter().map(|r| r.execution_time).sum();

        ExecutionResult {
            control_id: control.control_id.clone(),
            control_version: control.version.clone(),
            intent: control.intent,
            results,
            total_execution_time,
            has_errors: !errors.is_empty(),
            errors,
        }
    }

    /// Runs one query end to end. Never returns an error; validation,
    /// database, and timeout failures all land in the result's `error` field.
    pub async fn execute_query(
        &self,
        query: &QueryDefinition,
        binds: &BindValues,
    ) -> QueryExecutionResult {
        let started = Instant::now();

        let named = match self.validate(query, binds) {
            Ok(named) => named,
            Err(e) => {
                debug!("query '{}' failed validation: {}", query.query_id, e);
                return QueryExecutionResult::failed(&query.query_id, started.elapsed(), e.to_string());
            }
        };

        match self.run_with_budget(query, named).await {
            Ok(raw) => {
                let more_rows = raw.more_rows;
                let columns = effective_columns(query, &raw);
                let sanitized = self
                    .sanitizer
                    .sanitize(&columns, raw.rows, &query.result_schema);

                debug!(
                    "query '{}' returned {} rows ({} redacted cells)",
                    query.query_id,
                    sanitized.rows.len(),
                    sanitized.redaction_count
                );

                let row_count = sanitized.rows.len();
                QueryExecutionResult {
                    query_id: query.query_id.clone(),
                    columns,
                    rows: sanitized.rows,
                    row_count,
                    truncated: more_rows || sanitized.truncated,
                    redaction_count: sanitized.redaction_count,
                    truncation_count: sanitized.truncation_count,
                    execution_time: started.elapsed(),
                    error: None,
                }
            }
            Err(e) => {
                QueryExecutionResult::failed(&query.query_id, started.elapsed(), e.to_string())
            }
        }
    }

    fn validate(&self, query: &QueryDefinition, binds: &BindValues) -> Result<Vec<NamedBind>> {
        safety::validate_sql(query.sql_text())?;
        validate_binds(&query.binds, binds)
    }

    /// Dispatches the query onto its own worker task and joins with a
    /// timeout. On expiry the worker is aborted; dropping its future drops
    /// the database session it owns, which is the best-effort server-side
    /// cancellation. The late join outcome is read and discarded by a
    /// detached reaper task.
    async fn run_with_budget(
        &self,
        query: &QueryDefinition,
        binds: Vec<NamedBind>,
    ) -> Result<RawQueryOutput> {
        let budget = Duration::from_secs(query.timeout_seconds);
        let client = Arc::clone(&self.client);
        let sql = query.sql_text().to_string();
        let max_rows = query.row_limit;

        let mut worker = tokio::spawn(async move { client.run_query(&sql, &binds, max_rows).await });

        match tokio::time::timeout(budget, &mut worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(VitalsError::internal(format!(
                "query worker failed: {join_error}"
            ))),
            Err(_) => {
                warn!(
                    "query '{}' exceeded its {}s budget, aborting worker",
                    query.query_id, query.timeout_seconds
                );
                worker.abort();
                tokio::spawn(async move {
                    match worker.await {
                        Ok(Ok(_)) => debug!("timed-out query finished late with rows"),
                        Ok(Err(e)) => debug!("timed-out query finished late: {e}"),
                        Err(join) if join.is_cancelled() => {
                            debug!("timed-out query worker cancelled")
                        }
                        Err(join) => warn!("timed-out query worker panicked: {join}"),
                    }
                });
                Err(VitalsError::timeout(query.timeout_seconds))
            }
        }
    }
}

fn binds_for_query(query: &QueryDefinition, supplied: &BindValues) -> BindValues {
    supplied
        .iter()
        .filter(|(name, _)| query.binds.iter().any(|spec| spec.name == **name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Zero-row results carry no column metadata; fall back to the declared
/// result schema so downstream consumers still see the shape.
fn effective_columns(query: &QueryDefinition, raw: &RawQueryOutput) -> Vec<String> {
    if raw.columns.is_empty() {
        query
            .result_schema
            .iter()
            .map(|col| col.name.clone())
            .collect()
    } else {
        raw.columns.clone()
    }
}
