//! Result sanitization.
//!
//! Redacts sensitive columns and truncates oversized text before query
//! results leave the core. Two independent layers decide what is sensitive:
//! the declared `sensitive` flag in a query's result schema, and a fallback
//! match of actual column names against known sensitive name patterns. The
//! fallback exists because control authors forget to flag fields; anything it
//! catches that the schema missed is reported and logged.

use tracing::warn;

use crate::catalog::ResultColumn;
use crate::db::{Row, Value};

/// Name patterns treated as sensitive regardless of schema flags. Matched
/// case-insensitively against contiguous runs of underscore-delimited tokens,
/// so `app_user_name` matches `user_name` but `description` never matches
/// `ip`.
const DEFAULT_SENSITIVE_PATTERNS: [&str; 14] = [
    "user_name",
    "login",
    "os_user",
    "email",
    "email_address",
    "password",
    "passwd",
    "pwd",
    "token",
    "secret",
    "api_key",
    "ip",
    "ip_address",
    "host_name",
];

/// Default cap on string cell length, truncation marker included.
const DEFAULT_MAX_TEXT_LENGTH: usize = 500;

/// Default cap on returned rows.
const DEFAULT_MAX_ROWS: usize = 50;

/// Tunable sanitization policy. The defaults are the production values.
#[derive(Debug, Clone)]
pub struct SanitizerPolicy {
    pub max_text_length: usize,
    pub max_rows: usize,
    pub redaction_marker: String,
    pub truncation_marker: String,
    pub sensitive_name_patterns: Vec<String>,
}

impl Default for SanitizerPolicy {
    fn default() -> Self {
        Self {
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
            max_rows: DEFAULT_MAX_ROWS,
            redaction_marker: "[REDACTED]".to_string(),
            truncation_marker: "[...truncated]".to_string(),
            sensitive_name_patterns: DEFAULT_SENSITIVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Outcome of one sanitization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedResult {
    /// Surviving rows, redacted and truncated in place.
    pub rows: Vec<Row>,
    /// Row count before the row cap was applied.
    pub total_row_count: usize,
    /// True when rows were dropped by the cap.
    pub truncated: bool,
    /// Number of cells rewritten to the redaction marker.
    pub redaction_count: usize,
    /// Number of string cells shortened.
    pub truncation_count: usize,
    /// Columns redacted by the pattern layer that the schema did not flag.
    pub pattern_caught: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    policy: SanitizerPolicy,
}

impl Sanitizer {
    pub fn new(policy: SanitizerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SanitizerPolicy {
        &self.policy
    }

    /// Applies the row cap, redacts sensitive columns, and truncates
    /// oversized strings. `columns` are the actual returned column names;
    /// `schema` is the query's declared result schema. Running the output
    /// through a second pass changes nothing.
    pub fn sanitize(
        &self,
        columns: &[String],
        rows: Vec<Row>,
        schema: &[ResultColumn],
    ) -> SanitizedResult {
        let total_row_count = rows.len();
        let truncated = total_row_count > self.policy.max_rows;
        let mut kept = rows;
        kept.truncate(self.policy.max_rows);

        let mut redact = vec![false; columns.len()];
        let mut pattern_caught = Vec::new();
        for (i, name) in columns.iter().enumerate() {
            let flagged = schema
                .iter()
                .any(|col| col.sensitive && col.name.eq_ignore_ascii_case(name));
            let pattern_hit = self.name_matches_patterns(name);
            redact[i] = flagged || pattern_hit;
            if pattern_hit && !flagged {
                warn!(
                    "column '{}' redacted by name pattern but not flagged sensitive in schema",
                    name
                );
                pattern_caught.push(name.clone());
            }
        }

        let mut redaction_count = 0;
        let mut truncation_count = 0;
        for row in &mut kept {
            for (i, value) in row.iter_mut().enumerate() {
                if redact.get(i).copied().unwrap_or(false) {
                    match value {
                        // Null carries nothing to leak
                        Value::Null => {}
                        Value::String(s) if *s == self.policy.redaction_marker => {}
                        _ => {
                            *value = Value::String(self.policy.redaction_marker.clone());
                            redaction_count += 1;
                        }
                    }
                    continue;
                }
                if let Value::String(s) = value {
                    if let Some(shortened) = self.truncate_text(s) {
                        *s = shortened;
                        truncation_count += 1;
                    }
                }
            }
        }

        SanitizedResult {
            rows: kept,
            total_row_count,
            truncated,
            redaction_count,
            truncation_count,
            pattern_caught,
        }
    }

    fn name_matches_patterns(&self, column_name: &str) -> bool {
        let tokens: Vec<String> = column_name
            .to_lowercase()
            .split('_')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        self.policy
            .sensitive_name_patterns
            .iter()
            .any(|pattern| token_run_match(&tokens, pattern))
    }

    /// Returns the shortened value for strings over the length cap. The
    /// result is exactly `max_text_length` characters with the marker at the
    /// end, so an already-truncated value never shrinks further.
    fn truncate_text(&self, value: &str) -> Option<String> {
        let max = self.policy.max_text_length;
        if value.chars().count() <= max {
            return None;
        }
        let marker = &self.policy.truncation_marker;
        let keep = max.saturating_sub(marker.chars().count());
        let mut out: String = value.chars().take(keep).collect();
        out.push_str(marker);
        Some(out)
    }
}

/// True when `pattern`'s underscore tokens appear as a contiguous run inside
/// the column's tokens.
fn token_run_match(column_tokens: &[String], pattern: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('_').filter(|t| !t.is_empty()).collect();
    if pattern_tokens.is_empty() || pattern_tokens.len() > column_tokens.len() {
        return false;
    }
    column_tokens
        .windows(pattern_tokens.len())
        .any(|run| run.iter().map(String::as_str).eq(pattern_tokens.iter().copied()))
}
