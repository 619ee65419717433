//! SQL safety enforcement.
//!
//! Two layers with different jobs: [`validate_sql`] is the cheap gate every
//! query passes through at execution time (SELECT prefix plus a whole-word
//! forbidden-keyword scan), and [`ensure_single_select`] is the load-time
//! lint that fully parses control SQL and walks it for data-modifying
//! constructs. The runtime gate is deliberately shallow; it is a backstop,
//! not a parser.

mod parser;

pub use parser::ensure_single_select;

use crate::error::{Result, VitalsError};
use once_cell::sync::Lazy;
use regex::Regex;

/// Statement keywords that must never appear anywhere in control SQL.
pub const FORBIDDEN_KEYWORDS: [&str; 12] = [
    "DROP", "TRUNCATE", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "GRANT", "REVOKE",
    "COMMIT", "ROLLBACK", "BEGIN",
];

static FORBIDDEN_RE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(r"\b(?:{})\b", FORBIDDEN_KEYWORDS.join("|"));
    Regex::new(&pattern).expect("static keyword pattern")
});

/// Validates the shape of a SQL statement immediately before execution.
///
/// The statement must start with SELECT (after trimming, case-insensitive)
/// and must not contain any forbidden keyword as a whole word. Column names
/// like `updated_at` or `begin_date` pass because `_` is a word character.
pub fn validate_sql(sql: &str) -> Result<()> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(VitalsError::validation("empty SQL statement"));
    }

    let upper = trimmed.to_uppercase();
    if !upper.starts_with("SELECT") {
        return Err(VitalsError::validation(
            "only SELECT statements are allowed",
        ));
    }

    if let Some(found) = FORBIDDEN_RE.find(&upper) {
        return Err(VitalsError::validation(format!(
            "forbidden SQL keyword: {}",
            found.as_str()
        )));
    }

    Ok(())
}

/// Extracts `:name` bind placeholders from SQL text, in first-appearance
/// order, deduplicated.
///
/// Skips single-quoted string literals and `::` type casts. Placeholder names
/// start with a letter or underscore and continue with word characters.
pub fn named_placeholders(sql: &str) -> Vec<String> {
    let bytes = sql.as_bytes();
    let mut names: Vec<String> = Vec::new();
    let mut in_string = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if in_string {
            if b == b'\'' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' => {
                in_string = true;
                i += 1;
            }
            b':' => {
                // '::' is a cast, not a placeholder
                if bytes.get(i + 1) == Some(&b':') {
                    i += 2;
                    continue;
                }
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                let starts_ident = bytes
                    .get(start)
                    .map(|c| c.is_ascii_alphabetic() || *c == b'_')
                    .unwrap_or(false);
                if end > start && starts_ident {
                    let name = &sql[start..end];
                    if !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                    i = end;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    names
}
