//! Routing integration tests.
//!
//! Loads catalogs from disk and routes questions through them, so keyword
//! lists, catalog order, and configuration overrides all take the same path
//! they take in production.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use db_vitals::catalog::load_catalog;
use db_vitals::config::Config;
use db_vitals::router::{IntentSignal, PromptIntent, Router, RouterPolicy};

fn write_control(
    dir: &Path,
    file: &str,
    control_id: &str,
    title: &str,
    en: &[&str],
    tr: &[&str],
) {
    let en_list: Vec<String> = en.iter().map(|k| format!("\"{k}\"")).collect();
    let tr_list: Vec<String> = tr.iter().map(|k| format!("\"{k}\"")).collect();
    let json = format!(
        r#"{{
            "control_id": "{control_id}",
            "version": "2024-03-10.2",
            "title": "{title}",
            "intent": "conc_mgr",
            "keywords": {{"en": [{en}], "tr": [{tr}]}},
            "queries": [
                {{
                    "query_id": "q1",
                    "sql": "SELECT count(*) AS total FROM fnd_concurrent_requests",
                    "result_schema": [{{"name": "total", "type": "int"}}]
                }}
            ]
        }}"#,
        en = en_list.join(", "),
        tr = tr_list.join(", "),
    );
    fs::write(dir.join(file), json).unwrap();
}

/// The standard three-control health catalog used across these tests. All
/// versions are old enough that the recency boost stays zero as wall-clock
/// time advances.
fn write_health_catalog(dir: &Path) {
    write_control(
        dir,
        "01_concurrent_mgr_health.json",
        "concurrent_mgr_health",
        "Concurrent Manager Health",
        &["concurrent manager", "health check"],
        &["eşzamanlı yönetici", "sağlık kontrolü"],
    );
    write_control(
        dir,
        "02_invalid_objects.json",
        "invalid_objects",
        "Invalid Database Objects",
        &["invalid objects", "compilation errors"],
        &["geçersiz nesneler", "derleme hataları"],
    );
    write_control(
        dir,
        "03_workflow_stuck.json",
        "workflow_stuck",
        "Stuck Workflows",
        &["stuck workflow", "workflow errors"],
        &["takılı iş akışı", "iş akışı hataları"],
    );
}

fn signal() -> IntentSignal {
    IntentSignal::new(PromptIntent::EbsControl, 0.9)
}

#[test]
fn test_loaded_catalog_routes_matching_question() {
    let tmp = TempDir::new().unwrap();
    write_health_catalog(tmp.path());
    let catalog = Arc::new(load_catalog(tmp.path()).unwrap());
    let router = Router::new(Arc::clone(&catalog));

    let decision = router.route("concurrent manager health check", signal());

    assert_eq!(
        decision.selected_control_id.as_deref(),
        Some("concurrent_mgr_health")
    );
    assert_eq!(decision.selected_control_version.as_deref(), Some("2024-03-10.2"));
    assert!(decision.confidence >= 0.45);
    assert!(!decision.ambiguity_threshold_breach);
    assert!(decision.justification.contains("Concurrent Manager Health"));

    // Candidates are ranked best first and the winner leads.
    assert_eq!(decision.candidates[0].control_id, "concurrent_mgr_health");
    for pair in decision.candidates.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}

#[test]
fn test_turkish_question_routes_on_turkish_keywords() {
    let tmp = TempDir::new().unwrap();
    write_health_catalog(tmp.path());
    let catalog = Arc::new(load_catalog(tmp.path()).unwrap());
    let router = Router::new(catalog);

    let decision = router.route("eşzamanlı yönetici sağlık kontrolü", signal());

    assert_eq!(
        decision.selected_control_id.as_deref(),
        Some("concurrent_mgr_health")
    );
    assert!(!decision.ambiguity_threshold_breach);
}

#[test]
fn test_small_talk_gets_clarification_with_suggestions() {
    let tmp = TempDir::new().unwrap();
    write_health_catalog(tmp.path());
    let catalog = Arc::new(load_catalog(tmp.path()).unwrap());
    let router = Router::new(catalog);

    let decision = router.route("hello, how are you", signal());

    assert_eq!(decision.selected_control_id, None);
    assert_eq!(decision.confidence, 0.0);
    assert!(decision.ambiguity_threshold_breach);
    assert!(decision.justification.contains("clarification"));

    assert_eq!(decision.suggestions.len(), 3);
    for suggestion in &decision.suggestions {
        // "Title: en keywords / tr keywords"
        assert!(suggestion.contains(": "));
        assert!(suggestion.contains(" / "));
    }
}

#[test]
fn test_file_name_order_breaks_exact_ties() {
    let tmp = TempDir::new().unwrap();
    write_control(
        tmp.path(),
        "a_workflow_stuck.json",
        "workflow_stuck",
        "Stuck Workflows",
        &["workflow"],
        &["iş akışı"],
    );
    write_control(
        tmp.path(),
        "b_workflow_errors.json",
        "workflow_errors",
        "Workflow Errors",
        &["workflow"],
        &["iş akışı"],
    );
    let catalog = Arc::new(load_catalog(tmp.path()).unwrap());
    let router = Router::new(catalog);

    let decision = router.route("workflow", signal());

    // Identical scores: the control from the earlier file wins, flagged as
    // ambiguous because the runner-up is within the gap.
    assert_eq!(decision.selected_control_id.as_deref(), Some("workflow_stuck"));
    assert!(decision.ambiguity_threshold_breach);
    assert!(!decision.suggestions.is_empty());
    assert_eq!(
        decision.candidates[0].final_score,
        decision.candidates[1].final_score
    );
}

#[test]
fn test_config_file_overrides_reach_the_router() {
    let tmp = TempDir::new().unwrap();
    write_health_catalog(tmp.path());
    let catalog = Arc::new(load_catalog(tmp.path()).unwrap());

    let config: Config = toml::from_str(
        r#"
[router]
selection_threshold = 0.7
"#,
    )
    .unwrap();
    let policy = RouterPolicy::default().with_overrides(&config.router);
    let router = Router::with_policy(catalog, policy);

    // Confident under the default threshold, clarification under 0.7.
    let decision = router.route("concurrent manager health check", signal());

    assert_eq!(decision.selected_control_id, None);
    assert!(decision.ambiguity_threshold_breach);
}

#[test]
fn test_decision_payload_shape() {
    let tmp = TempDir::new().unwrap();
    write_health_catalog(tmp.path());
    let catalog = Arc::new(load_catalog(tmp.path()).unwrap());
    let router = Router::new(catalog);

    let decision = router.route("concurrent manager health check", signal());
    let json = serde_json::to_value(&decision).unwrap();

    assert!(json["request_id"].as_str().unwrap().starts_with("req_"));
    assert_eq!(json["intent"], "ebs_control");
    assert_eq!(json["intent_confidence"], 0.9);
    assert_eq!(json["selected_control_id"], "concurrent_mgr_health");

    let candidate = &json["candidates"][0];
    for key in [
        "control_id",
        "keyword_match",
        "intent_match",
        "sql_shape",
        "recency_boost",
        "priority_boost",
        "ambiguity_penalty",
        "final",
    ] {
        assert!(candidate.get(key).is_some(), "missing candidate key {key}");
    }
}
