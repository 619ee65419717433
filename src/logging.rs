//! Logging configuration for db-vitals.
//!
//! Provides platform-aware logging initialization (stderr by default, file
//! output on request) plus sanitization of operator-supplied text before it
//! is logged.

use std::fs::{self, File};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Maximum length of operator-supplied text in a log line.
pub const MAX_LOG_LENGTH: usize = 200;

/// Initializes logging to a file.
///
/// Location: `~/.local/state/vitals/vitals.log` on Linux (XDG state directory),
/// or the platform-appropriate state/config directory on other systems.
pub fn init_file_logging() {
    let log_path = get_log_path();

    // Ensure parent directory exists
    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            return;
        }
    }

    // Open log file (truncate on each run to avoid unbounded growth)
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {e}");
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(log_file)
        .with_ansi(false) // No ANSI colors in file output
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Returns the path for the log file.
///
/// Uses XDG state directory on Linux (`~/.local/state/vitals/vitals.log`),
/// or falls back to config directory on other platforms.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("vitals").join("vitals.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("vitals").join("vitals.log");
    }

    std::env::temp_dir().join("vitals.log")
}

/// Sanitizes operator-supplied text for inclusion in a log line.
///
/// Newlines and tabs are escaped, other control characters are stripped, and
/// the result is capped at [`MAX_LOG_LENGTH`] characters. Free-text questions
/// must pass through here before logging so a crafted input cannot forge log
/// records or flood the log.
pub fn sanitize_for_log(input: &str) -> String {
    let escaped = input
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
        .replace('\r', "\\n")
        .replace('\t', "\\t");
    let cleaned: String = escaped.chars().filter(|c| !c.is_control()).collect();

    if cleaned.chars().count() > MAX_LOG_LENGTH {
        let capped: String = cleaned.chars().take(MAX_LOG_LENGTH).collect();
        format!("{capped}...")
    } else {
        cleaned
    }
}
