//! Control catalog loading and validation.
//!
//! Reads every control JSON file in a directory and fails the whole load if
//! any file is unparseable or violates the schema rules. A bad control must
//! never be routable, so problems are collected across all files and reported
//! together instead of stopping at the first one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::catalog::types::ControlDefinition;
use crate::catalog::ControlCatalog;
use crate::error::{Result, VitalsError};
use crate::safety;

/// Loads and validates all control definitions under `dir`.
///
/// Files are read in name order, which becomes the catalog's iteration order
/// (and therefore the router's tie-break order). `metadata.json` is reserved
/// for free-form catalog notes and skipped.
pub fn load_catalog(dir: &Path) -> Result<ControlCatalog> {
    if !dir.is_dir() {
        return Err(VitalsError::catalog(format!(
            "control directory not found: {}",
            dir.display()
        )));
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| VitalsError::catalog(format!("cannot read {}: {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name != "metadata.json")
        })
        .collect();
    files.sort();

    let mut controls = Vec::with_capacity(files.len());
    let mut problems = Vec::new();

    for path in &files {
        // Named `file_name` rather than `display`: tracing's macros import
        // `tracing::field::display` into their expansion, shadowing any local
        // with that name (tracing#831).
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match load_control_file(path, dir) {
            Ok(control) => {
                debug!(control_id = %control.control_id, file = %file_name, "control loaded");
                controls.push(control);
            }
            Err(e) => problems.push(format!("{file_name}: {e}")),
        }
    }

    if !problems.is_empty() {
        return Err(VitalsError::catalog(format!(
            "{} control file(s) rejected:\n  {}",
            problems.len(),
            problems.join("\n  ")
        )));
    }

    let catalog = ControlCatalog::from_controls(controls)?;
    info!(controls = catalog.len(), dir = %dir.display(), "control catalog loaded");
    Ok(catalog)
}

fn load_control_file(path: &Path, catalog_dir: &Path) -> Result<ControlDefinition> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| VitalsError::catalog(format!("cannot read file: {e}")))?;

    let mut control: ControlDefinition = serde_json::from_str(&content)
        .map_err(|e| VitalsError::catalog(format!("invalid JSON: {e}")))?;

    resolve_sql_files(&mut control, catalog_dir)?;
    validate_control(&control)?;
    Ok(control)
}

/// Resolves `sql_file` references into inline SQL so the rest of the system
/// only ever sees `sql`.
fn resolve_sql_files(control: &mut ControlDefinition, catalog_dir: &Path) -> Result<()> {
    for query in &mut control.queries {
        match (&query.sql, &query.sql_file) {
            (Some(_), Some(_)) => {
                return Err(VitalsError::catalog(format!(
                    "query '{}': declare either sql or sql_file, not both",
                    query.query_id
                )));
            }
            (None, None) => {
                return Err(VitalsError::catalog(format!(
                    "query '{}': declare sql or sql_file",
                    query.query_id
                )));
            }
            (None, Some(file)) => {
                let sql_path = catalog_dir.join(file);
                let sql = std::fs::read_to_string(&sql_path).map_err(|e| {
                    VitalsError::catalog(format!(
                        "query '{}': cannot read {}: {e}",
                        query.query_id,
                        sql_path.display()
                    ))
                })?;
                query.sql = Some(sql);
            }
            (Some(_), None) => {}
        }
    }
    Ok(())
}

/// Schema rules every control must satisfy before it becomes routable.
fn validate_control(control: &ControlDefinition) -> Result<()> {
    let id = control.control_id.trim();
    if id.is_empty() {
        return Err(VitalsError::catalog("control_id must not be empty"));
    }
    if !id.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return Err(VitalsError::catalog(format!(
            "control_id '{id}' must be lowercase words separated by underscores"
        )));
    }

    if control.title.trim().is_empty() {
        return Err(VitalsError::catalog(format!(
            "control '{id}': title must not be empty"
        )));
    }

    if control.keywords.en.is_empty() || control.keywords.tr.is_empty() {
        return Err(VitalsError::catalog(format!(
            "control '{id}': keyword lists must not be empty (en and tr)"
        )));
    }

    if control.queries.is_empty() {
        return Err(VitalsError::catalog(format!(
            "control '{id}': at least one query is required"
        )));
    }

    let mut seen_query_ids = HashSet::new();
    for query in &control.queries {
        let qid = query.query_id.as_str();
        if !seen_query_ids.insert(qid) {
            return Err(VitalsError::catalog(format!(
                "control '{id}': duplicate query_id '{qid}'"
            )));
        }

        if query.result_schema.is_empty() {
            return Err(VitalsError::catalog(format!(
                "query '{qid}': result_schema must not be empty"
            )));
        }
        if query.row_limit == 0 {
            return Err(VitalsError::catalog(format!(
                "query '{qid}': row_limit must be positive"
            )));
        }
        if query.timeout_seconds == 0 {
            return Err(VitalsError::catalog(format!(
                "query '{qid}': timeout_seconds must be positive"
            )));
        }

        let sql = query.sql_text();
        safety::ensure_single_select(sql)
            .map_err(|e| VitalsError::catalog(format!("query '{qid}': {e}")))?;

        let declared: HashSet<&str> = query.binds.iter().map(|b| b.name.as_str()).collect();
        for placeholder in safety::named_placeholders(sql) {
            if !declared.contains(placeholder.as_str()) {
                return Err(VitalsError::catalog(format!(
                    "query '{qid}': SQL references undeclared bind :{placeholder}"
                )));
            }
        }
    }

    Ok(())
}
