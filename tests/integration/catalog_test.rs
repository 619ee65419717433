//! Catalog loading integration tests.
//!
//! Exercises the loader against realistic control files on disk: full
//! production-shaped definitions, file-backed SQL, and catalogs that mix
//! good and bad files.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use db_vitals::catalog::{load_catalog, ControlIntent, FieldType};

/// A production-shaped control with two queries, binds, and sensitive columns.
const CONCURRENT_MGR_HEALTH: &str = r#"{
    "control_id": "concurrent_mgr_health",
    "version": "2024-03-10.2",
    "title": "Concurrent Manager Health",
    "description": "Manager queue depth and stuck concurrent requests",
    "intent": "conc_mgr",
    "keywords": {
        "en": ["concurrent manager", "pending requests"],
        "tr": ["eşzamanlı yönetici", "bekleyen istekler"]
    },
    "queries": [
        {
            "query_id": "pending_by_queue",
            "sql": "SELECT queue_name, count(*) AS pending FROM fnd_concurrent_requests WHERE phase_code = 'P' GROUP BY queue_name",
            "result_schema": [
                {"name": "queue_name", "type": "string"},
                {"name": "pending", "type": "int"}
            ],
            "row_limit": 20
        },
        {
            "query_id": "long_running",
            "sql": "SELECT request_id, requestor, actual_start_date FROM fnd_concurrent_requests WHERE phase_code = 'R' AND actual_start_date < :started_before",
            "binds": [
                {"name": "started_before", "type": "datetime", "optional": true}
            ],
            "result_schema": [
                {"name": "request_id", "type": "int"},
                {"name": "requestor", "type": "string", "sensitive": true},
                {"name": "actual_start_date", "type": "datetime"}
            ],
            "timeout_seconds": 10
        }
    ],
    "doc_hint": "Pending counts above 100 per queue usually mean a stuck manager.",
    "analysis_hint": "Summarize backlog per queue and flag long runners.",
    "knowledge_ref": "conc_mgr.md"
}"#;

fn write_minimal_control(dir: &Path, file: &str, control_id: &str, sql: &str) {
    let json = format!(
        r#"{{
            "control_id": "{control_id}",
            "version": "2024-01-15.1",
            "title": "Minimal Control",
            "intent": "performance",
            "keywords": {{"en": ["minimal"], "tr": ["asgari"]}},
            "queries": [
                {{
                    "query_id": "q1",
                    "sql": "{sql}",
                    "result_schema": [{{"name": "one", "type": "int"}}]
                }}
            ]
        }}"#
    );
    fs::write(dir.join(file), json).unwrap();
}

#[test]
fn test_production_shaped_control_loads_fully() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("concurrent_mgr_health.json"), CONCURRENT_MGR_HEALTH).unwrap();

    let catalog = load_catalog(tmp.path()).unwrap();
    let control = catalog.get_control("concurrent_mgr_health").unwrap();

    assert_eq!(control.version, "2024-03-10.2");
    assert_eq!(control.intent, ControlIntent::ConcMgr);
    assert_eq!(control.keywords.tr[0], "eşzamanlı yönetici");
    assert_eq!(control.queries.len(), 2);
    assert_eq!(control.total_result_columns(), 5);
    assert_eq!(control.knowledge_ref.as_deref(), Some("conc_mgr.md"));

    let first = &control.queries[0];
    assert_eq!(first.row_limit, 20);
    assert_eq!(first.timeout_seconds, 30);

    let second = &control.queries[1];
    assert_eq!(second.timeout_seconds, 10);
    assert_eq!(second.binds[0].name, "started_before");
    assert_eq!(second.binds[0].bind_type, FieldType::DateTime);
    assert!(second.binds[0].optional);
    assert!(second.result_schema[1].sensitive);
}

#[test]
fn test_catalog_iterates_in_file_name_order() {
    let tmp = TempDir::new().unwrap();
    write_minimal_control(tmp.path(), "02_invalid_objects.json", "invalid_objects", "SELECT 1");
    write_minimal_control(tmp.path(), "03_active_users.json", "active_users", "SELECT 2");
    write_minimal_control(tmp.path(), "01_conc_mgr.json", "conc_mgr", "SELECT 3");

    let catalog = load_catalog(tmp.path()).unwrap();

    let ids: Vec<&str> = catalog
        .get_all_controls()
        .iter()
        .map(|c| c.control_id.as_str())
        .collect();
    assert_eq!(ids, vec!["conc_mgr", "invalid_objects", "active_users"]);
}

#[test]
fn test_sql_file_reference_resolves_against_catalog_dir() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("invalid_count.sql"),
        "SELECT owner, count(*) AS invalid FROM dba_objects WHERE status = 'INVALID' GROUP BY owner",
    )
    .unwrap();
    let json = r#"{
        "control_id": "invalid_objects",
        "version": "2024-02-01.1",
        "title": "Invalid Objects",
        "intent": "invalid_objects",
        "keywords": {"en": ["invalid objects"], "tr": ["geçersiz nesneler"]},
        "queries": [
            {
                "query_id": "invalid_count",
                "sql_file": "invalid_count.sql",
                "result_schema": [
                    {"name": "owner", "type": "string"},
                    {"name": "invalid", "type": "int"}
                ]
            }
        ]
    }"#;
    fs::write(tmp.path().join("invalid_objects.json"), json).unwrap();

    let catalog = load_catalog(tmp.path()).unwrap();

    // The companion .sql file is query text, not a control of its own.
    assert_eq!(catalog.len(), 1);
    let control = catalog.get_control("invalid_objects").unwrap();
    assert!(control.queries[0].sql_text().starts_with("SELECT owner"));
    assert!(control.queries[0].sql_file.is_some());
}

#[test]
fn test_bad_files_are_reported_together_and_nothing_loads() {
    let tmp = TempDir::new().unwrap();
    write_minimal_control(tmp.path(), "good.json", "good_control", "SELECT 1");
    fs::write(tmp.path().join("broken.json"), "{ this is not json").unwrap();
    write_minimal_control(tmp.path(), "mutating.json", "mutating_control", "DELETE FROM fnd_user");

    let err = load_catalog(tmp.path()).unwrap_err().to_string();

    assert!(err.contains("2 control file(s) rejected"), "got: {err}");
    assert!(err.contains("broken.json"));
    assert!(err.contains("mutating.json"));
    assert!(!err.contains("good.json"));
}

#[test]
fn test_metadata_and_stray_files_are_skipped() {
    let tmp = TempDir::new().unwrap();
    write_minimal_control(tmp.path(), "real.json", "real_control", "SELECT 1");
    fs::write(tmp.path().join("metadata.json"), r#"{"catalog_version": "3"}"#).unwrap();
    fs::write(tmp.path().join("README.txt"), "catalog notes").unwrap();

    let catalog = load_catalog(tmp.path()).unwrap();

    assert_eq!(catalog.len(), 1);
    assert!(catalog.get_control("real_control").is_some());
}
