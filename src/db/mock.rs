//! Mock database client for testing.
//!
//! Replays queued outputs instead of talking to a server, records every call,
//! and counts session teardowns so tests can assert that a query dropped
//! mid-flight still released its session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{DatabaseClient, NamedBind, RawQueryOutput, Value};
use crate::error::{Result, VitalsError};

#[derive(Debug)]
enum Outcome {
    Rows(RawQueryOutput),
    Failure(String),
}

/// A mock database client that returns predefined results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    outcomes: Mutex<VecDeque<Outcome>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Vec<NamedBind>)>>,
    started: AtomicUsize,
    released: AtomicUsize,
}

/// Increments the release counter when the surrounding future completes or is
/// dropped, mirroring how a real session closes either way.
struct SessionGuard<'a> {
    released: &'a AtomicUsize,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockDatabaseClient {
    /// Creates a mock with no queued outputs; calls return empty results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful result with the given columns and rows.
    pub fn with_rows(self, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.push(Outcome::Rows(RawQueryOutput {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            more_rows: false,
        }));
        self
    }

    /// Queues a prebuilt output, `more_rows` flag included.
    pub fn with_output(self, output: RawQueryOutput) -> Self {
        self.push(Outcome::Rows(output));
        self
    }

    /// Queues a query failure with the given message.
    pub fn with_failure(self, message: &str) -> Self {
        self.push(Outcome::Failure(message.to_string()));
        self
    }

    /// Delays every call by `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the recorded calls as (sql, binds) pairs.
    pub fn calls(&self) -> Vec<(String, Vec<NamedBind>)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of sessions torn down, whether by completion or by drop.
    pub fn sessions_released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn push(&self, outcome: Outcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn run_query(
        &self,
        sql: &str,
        binds: &[NamedBind],
        max_rows: usize,
    ) -> Result<RawQueryOutput> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _session = SessionGuard {
            released: &self.released,
        };

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((sql.to_string(), binds.to_vec()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match outcome {
            Some(Outcome::Rows(mut output)) => {
                if output.rows.len() > max_rows {
                    output.rows.truncate(max_rows);
                    output.more_rows = true;
                }
                Ok(output)
            }
            Some(Outcome::Failure(message)) => Err(VitalsError::query(message)),
            None => Ok(RawQueryOutput::default()),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
