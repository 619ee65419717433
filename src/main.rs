//! db-vitals - explainable health-check routing and safe query execution.

mod catalog;
mod cli;
mod config;
mod db;
mod error;
mod logging;
mod query;
mod router;
mod safety;
mod sanitize;

use std::sync::Arc;

use tracing::{error, info};

use catalog::load_catalog;
use cli::Cli;
use config::{Config, ConnectionConfig};
use error::{Result, VitalsError};
use query::QueryExecutor;
use router::{IntentSignal, PromptIntent, Router, RouterDecision, RouterPolicy};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration file
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    // Load the control catalog, fail-fast
    let catalog_dir = cli
        .catalog_dir
        .clone()
        .or_else(|| config.catalog.dir.clone())
        .ok_or_else(|| {
            VitalsError::config(
                "no catalog directory configured; pass --catalog-dir or set [catalog] dir",
            )
        })?;
    let catalog = Arc::new(load_catalog(&catalog_dir)?);

    // Questions the upstream classifier marked as small talk or unclassifiable
    // are not routed at all.
    let signal = cli.intent_signal()?;
    if matches!(signal.intent, PromptIntent::ChitChat | PromptIntent::Unknown) {
        info!(
            "skipping routing for {} question: {}",
            signal.intent,
            logging::sanitize_for_log(&cli.question)
        );
        print_json(&no_route_decision(signal))?;
        return Ok(());
    }

    let policy = RouterPolicy::default().with_overrides(&config.router);
    let router = Router::with_policy(Arc::clone(&catalog), policy);
    let decision = router.route(&cli.question, signal);
    print_json(&decision)?;

    let Some(control_id) = decision.selected_control_id.as_deref() else {
        return Ok(());
    };
    if cli.route_only {
        info!("route-only run; not executing '{control_id}'");
        return Ok(());
    }
    let Some(control) = catalog.get_control(control_id) else {
        return Ok(());
    };

    let binds = cli.parse_binds()?;
    let connection = resolve_connection(&cli, &config)?;
    info!("Connection: {}", connection.display_string());
    let client = db::connect(&connection).await?;

    let executor = QueryExecutor::new(Arc::clone(&client));
    let result = executor.execute_control(control, &binds).await;
    print_json(&result)?;

    client.close().await?;
    Ok(())
}

/// Resolves the connection configuration from CLI args, the config file, and
/// `PG*` environment variables, in that order of precedence.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<ConnectionConfig> {
    let mut connection = match cli.to_connection_config()? {
        Some(connection) => connection,
        None => config.database.clone(),
    };
    connection.apply_env_defaults();
    Ok(connection)
}

/// Decision emitted when routing is skipped for an out-of-domain question.
fn no_route_decision(signal: IntentSignal) -> RouterDecision {
    RouterDecision {
        request_id: format!("req_{}", uuid::Uuid::new_v4().simple()),
        intent: signal.intent,
        intent_confidence: signal.confidence,
        candidates: Vec::new(),
        selected_control_id: None,
        selected_control_version: None,
        confidence: 0.0,
        justification: format!(
            "question classified as {}; control routing skipped",
            signal.intent
        ),
        ambiguity_threshold_breach: false,
        suggestions: Vec::new(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| VitalsError::internal(format!("failed to render output: {e}")))?;
    println!("{rendered}");
    Ok(())
}
