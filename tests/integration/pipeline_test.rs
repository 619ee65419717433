//! Full pipeline integration tests.
//!
//! The production flow end to end: load a catalog from disk, route a
//! question, and execute the selected control against a scripted database
//! client. Covers sanitization, bind validation, timeouts, and per-query
//! failure aggregation as they compose.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use db_vitals::catalog::{load_catalog, ControlCatalog, ControlDefinition};
use db_vitals::db::{BindValue, DatabaseClient, MockDatabaseClient, NamedBind, Value};
use db_vitals::query::{BindValues, QueryExecutor};
use db_vitals::router::{IntentSignal, PromptIntent, Router};

const ACTIVE_USERS_SQL: &str =
    "SELECT user_id, user_name, responsibility FROM fnd_logins WHERE login_time > CURRENT_DATE - :days";

/// Two production-shaped controls: a bind-taking login report and a
/// two-query invalid objects control.
fn write_catalog(dir: &Path, login_timeout_seconds: u64) {
    let active_users = format!(
        r#"{{
            "control_id": "active_users",
            "version": "2024-04-01.1",
            "title": "Active Users",
            "intent": "performance",
            "keywords": {{
                "en": ["active users", "recent logins"],
                "tr": ["aktif kullanıcılar", "son oturumlar"]
            }},
            "queries": [
                {{
                    "query_id": "recent_logins",
                    "sql": "{ACTIVE_USERS_SQL}",
                    "binds": [{{"name": "days", "type": "int", "optional": false}}],
                    "result_schema": [
                        {{"name": "user_id", "type": "int"}},
                        {{"name": "user_name", "type": "string"}},
                        {{"name": "responsibility", "type": "string"}}
                    ],
                    "timeout_seconds": {login_timeout_seconds}
                }}
            ]
        }}"#
    );
    fs::write(dir.join("01_active_users.json"), active_users).unwrap();

    let invalid_objects = r#"{
        "control_id": "invalid_objects",
        "version": "2024-02-01.1",
        "title": "Invalid Database Objects",
        "intent": "invalid_objects",
        "keywords": {
            "en": ["invalid objects", "compilation errors"],
            "tr": ["geçersiz nesneler", "derleme hataları"]
        },
        "queries": [
            {
                "query_id": "invalid_counts",
                "sql": "SELECT owner, count(*) AS invalid_count FROM dba_objects WHERE status = 'INVALID' GROUP BY owner",
                "result_schema": [
                    {"name": "owner", "type": "string"},
                    {"name": "invalid_count", "type": "int"}
                ]
            },
            {
                "query_id": "invalid_list",
                "sql": "SELECT owner, object_name, object_type, status FROM dba_objects WHERE status = 'INVALID'",
                "result_schema": [
                    {"name": "owner", "type": "string"},
                    {"name": "object_name", "type": "string"},
                    {"name": "object_type", "type": "string"},
                    {"name": "status", "type": "string"}
                ]
            }
        ]
    }"#;
    fs::write(dir.join("02_invalid_objects.json"), invalid_objects).unwrap();
}

fn route<'a>(catalog: &'a ControlCatalog, question: &str) -> &'a ControlDefinition {
    let router = Router::new(Arc::new(catalog.clone()));
    let signal = IntentSignal::new(PromptIntent::EbsControl, 0.9);
    let decision = router.route(question, signal);

    let control_id = decision
        .selected_control_id
        .as_deref()
        .unwrap_or_else(|| panic!("no control selected: {}", decision.justification));
    assert!(!decision.ambiguity_threshold_breach);
    catalog.get_control(control_id).unwrap()
}

fn executor(mock: &Arc<MockDatabaseClient>) -> QueryExecutor {
    QueryExecutor::new(Arc::clone(mock) as Arc<dyn DatabaseClient>)
}

#[tokio::test]
async fn test_route_then_execute_redacts_and_records_binds() {
    let tmp = TempDir::new().unwrap();
    write_catalog(tmp.path(), 30);
    let catalog = load_catalog(tmp.path()).unwrap();
    let control = route(&catalog, "show me active users");
    assert_eq!(control.control_id, "active_users");

    let mock = Arc::new(MockDatabaseClient::new().with_rows(
        &["user_id", "user_name", "responsibility"],
        vec![
            vec![
                Value::Int(1),
                Value::String("SYSADMIN".into()),
                Value::String("System Administrator".into()),
            ],
            vec![
                Value::Int(2),
                Value::String("OPS_CLERK".into()),
                Value::String("Receivables Manager".into()),
            ],
        ],
    ));
    let binds: BindValues = [("days".to_string(), json!(7))].into_iter().collect();

    let result = executor(&mock).execute_control(control, &binds).await;

    assert!(!result.has_errors);
    assert_eq!(result.results.len(), 1);
    let query_result = &result.results[0];
    assert_eq!(query_result.columns, vec!["user_id", "user_name", "responsibility"]);
    assert_eq!(query_result.row_count, 2);

    // The unflagged user_name column is still redacted by the name patterns.
    assert_eq!(query_result.rows[0][0], Value::Int(1));
    assert_eq!(query_result.rows[0][1], Value::String("[REDACTED]".into()));
    assert_eq!(
        query_result.rows[0][2],
        Value::String("System Administrator".into())
    );
    assert_eq!(query_result.redaction_count, 2);

    // The client received the SQL verbatim with the converted bind.
    let calls = mock.calls();
    assert_eq!(calls[0].0, ACTIVE_USERS_SQL);
    assert_eq!(calls[0].1, vec![NamedBind::new("days", BindValue::Int(7))]);
}

#[tokio::test]
async fn test_unexpected_bind_stops_the_control_before_any_call() {
    let tmp = TempDir::new().unwrap();
    write_catalog(tmp.path(), 30);
    let catalog = load_catalog(tmp.path()).unwrap();
    let control = route(&catalog, "show me active users");

    let mock = Arc::new(MockDatabaseClient::new());
    let binds: BindValues = [
        ("days".to_string(), json!(7)),
        ("evil".to_string(), json!("x")),
    ]
    .into_iter()
    .collect();

    let result = executor(&mock).execute_control(control, &binds).await;

    assert!(result.has_errors);
    assert_eq!(result.errors, vec!["unexpected bind parameter: evil"]);
    assert!(result.results.is_empty());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_missing_required_bind_fails_the_query_locally() {
    let tmp = TempDir::new().unwrap();
    write_catalog(tmp.path(), 30);
    let catalog = load_catalog(tmp.path()).unwrap();
    let control = route(&catalog, "show me active users");

    let mock = Arc::new(MockDatabaseClient::new());
    let result = executor(&mock)
        .execute_control(control, &BindValues::new())
        .await;

    assert!(result.has_errors);
    assert!(result.errors[0].starts_with("recent_logins: "));
    assert!(result.errors[0].contains("missing required bind parameter: days"));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_query_budget_enforced_end_to_end() {
    let tmp = TempDir::new().unwrap();
    write_catalog(tmp.path(), 1);
    let catalog = load_catalog(tmp.path()).unwrap();
    let control = route(&catalog, "show me active users");

    let mock = Arc::new(
        MockDatabaseClient::new()
            .with_delay(Duration::from_secs(5))
            .with_rows(&["user_id"], vec![vec![Value::Int(1)]]),
    );
    let binds: BindValues = [("days".to_string(), json!(7))].into_iter().collect();

    let result = executor(&mock).execute_control(control, &binds).await;

    assert!(result.has_errors);
    assert!(
        result.errors[0].contains("timed out after 1s"),
        "got: {}",
        result.errors[0]
    );
    assert_eq!(mock.call_count(), 1);

    // The aborted worker still tears down its session.
    for _ in 0..10 {
        tokio::task::yield_now().await;
        if mock.sessions_released() == 1 {
            break;
        }
    }
    assert_eq!(mock.sessions_released(), 1);
}

#[tokio::test]
async fn test_multi_query_control_survives_one_failing_query() {
    let tmp = TempDir::new().unwrap();
    write_catalog(tmp.path(), 30);
    let catalog = load_catalog(tmp.path()).unwrap();
    let control = route(&catalog, "invalid objects in the database");
    assert_eq!(control.control_id, "invalid_objects");

    let mock = Arc::new(
        MockDatabaseClient::new()
            .with_rows(
                &["owner", "invalid_count"],
                vec![vec![Value::String("APPS".into()), Value::Int(12)]],
            )
            .with_failure("relation \"dba_objects\" does not exist"),
    );

    let result = executor(&mock)
        .execute_control(control, &BindValues::new())
        .await;

    assert!(result.has_errors);
    assert_eq!(result.results.len(), 2);
    assert!(result.results[0].error.is_none());
    assert_eq!(result.results[0].row_count, 1);
    assert!(result.results[1].error.is_some());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("invalid_list: "));
    assert_eq!(
        result.total_execution_time,
        result.results[0].execution_time + result.results[1].execution_time
    );
}

#[tokio::test]
async fn test_execution_result_serializes_for_downstream() {
    let tmp = TempDir::new().unwrap();
    write_catalog(tmp.path(), 30);
    let catalog = load_catalog(tmp.path()).unwrap();
    let control = route(&catalog, "show me active users");

    let mock = Arc::new(MockDatabaseClient::new().with_rows(
        &["user_id", "user_name", "responsibility"],
        vec![vec![
            Value::Int(1),
            Value::String("SYSADMIN".into()),
            Value::String("System Administrator".into()),
        ]],
    ));
    let binds: BindValues = [("days".to_string(), json!(7))].into_iter().collect();

    let result = executor(&mock).execute_control(control, &binds).await;
    let payload = serde_json::to_value(&result).unwrap();

    assert_eq!(payload["control_id"], "active_users");
    assert_eq!(payload["control_version"], "2024-04-01.1");
    assert_eq!(payload["intent"], "performance");
    assert_eq!(payload["has_errors"], false);
    assert!(payload["total_execution_time_ms"].is_number());

    let query_payload = &payload["results"][0];
    assert_eq!(query_payload["query_id"], "recent_logins");
    assert!(query_payload["execution_time_ms"].is_number());
    assert!(query_payload.get("error").is_none());
    assert_eq!(query_payload["rows"][0][1], "[REDACTED]");
}
