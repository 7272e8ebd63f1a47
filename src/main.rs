//! `cx-router` CLI: inspect routes and the ledger, or inject one vector.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use serde_json::Value;
use tracing::{info, warn};

use cx_router::config::{config_dir, load_config, load_default_config, Config};
use cx_router::engine::ExecutionEngine;
use cx_router::ledger::Ledger;
use cx_router::logging;
use cx_router::observer::TracingObserver;
use cx_router::plugins::{EngineRoutes, LoggerRoutes, PluginLoader};
use cx_router::policy::CallContext;
use cx_router::router::{DispatchOutcome, Router};
use cx_router::signature::SignatureValidator;

/// CX Router CLI: inspect or dispatch CX vectors.
#[derive(Parser)]
#[command(name = "cx-router", version, about)]
struct Cli {
    /// Show active routes and recent CX events.
    #[arg(long, conflicts_with = "dispatch")]
    summary: bool,

    /// Dispatch a CX vector manually, e.g. 'hyperx.logger:log:0.3:record:write'.
    #[arg(long, value_name = "CXVECTOR")]
    dispatch: Option<String>,

    /// JSON payload for --dispatch, e.g. '{"msg":"hi"}'.
    #[arg(long, value_name = "JSON", default_value = "{}")]
    payload: String,

    /// Config file (default: ~/.cx/config.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if !cli.summary && cli.dispatch.is_none() {
        Cli::command().print_help()?;
        return Ok(());
    }

    load_env_files();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_default_config()?,
    };
    let _logging_guard = logging::init(&config.logging)?;

    let router = build_router(&config, cli.dispatch.is_some()).await?;

    if cli.summary {
        println!("{}", router.summary().await);
    } else if let Some(vector) = cli.dispatch.as_deref() {
        let payload = parse_payload(&cli.payload);
        let outcome = router.dispatch(vector, payload).await;
        println!("{}", describe(&outcome));
    }

    if let Some(ledger) = router.ledger() {
        if let Err(err) = ledger.flush().await {
            warn!(error = %err, "ledger flush failed");
        }
    }
    Ok(())
}

/// Load `.env` from the working directory and from `~/.cx/`.
fn load_env_files() {
    let _ = dotenvy::dotenv();
    if let Ok(dir) = config_dir() {
        let _ = dotenvy::from_path(dir.join(".env"));
    }
}

/// Assemble ledger and router, then load the plugin manifest.
///
/// The engine, and with it `engine_routes`, needs the signing secret. Only
/// dispatch requires it; without it a read-only run skips those routes.
async fn build_router(config: &Config, require_secret: bool) -> anyhow::Result<Router> {
    let engine = match SignatureValidator::from_env(&config.signing.secret_env) {
        Ok(validator) => Some(Arc::new(
            ExecutionEngine::new(config.policy_registry()?, validator)
                .with_handler_timeout(config.router.handler_timeout()),
        )),
        Err(err) if require_secret => {
            return Err(err).context("refusing to dispatch without a signing secret");
        }
        Err(err) => {
            warn!(error = %err, "no signing secret, engine routes not loaded");
            None
        }
    };

    let ledger_path = config.ledger_path()?;
    let ledger = Ledger::open(&ledger_path, config.ledger.channel_capacity)
        .await
        .with_context(|| format!("failed to open ledger at {}", ledger_path.display()))?;

    let mut router = Router::new()
        .with_ledger(Arc::new(ledger))
        .with_observer(Arc::new(TracingObserver))
        .with_handler_timeout(config.router.handler_timeout())
        .with_summary_limit(config.ledger.summary_limit);

    let mut loader = PluginLoader::new().with(LoggerRoutes);
    if let Some(engine) = engine {
        let mut engine_routes =
            EngineRoutes::new(engine, config.plugins.engine_patterns.clone());
        if let Some(role) = &config.plugins.engine_caller_role {
            engine_routes = engine_routes.with_resolver(Arc::new(CallContext::with_role(role)));
        }
        loader = loader.with(engine_routes);
    }
    if let Some(enabled) = &config.plugins.enabled {
        loader = loader.enable_only(enabled.iter().cloned());
    }
    let report = loader.load(&mut router);
    for (plugin, error) in &report.failed {
        warn!(plugin = %plugin, error = %error, "plugin not loaded");
    }
    info!(routes = router.list_routes().len(), "cx router ready");
    Ok(router)
}

/// Parse the `--payload` JSON; invalid input becomes `{}`.
fn parse_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|err| {
        warn!(error = %err, "invalid --payload JSON, using {{}}");
        Value::Object(serde_json::Map::new())
    })
}

fn describe(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Malformed => "malformed vector, ignored".to_owned(),
        DispatchOutcome::Unrouted => "no route".to_owned(),
        DispatchOutcome::Handled { pattern } => format!("handled by {pattern}"),
        DispatchOutcome::Failed { pattern, error } => format!("handler {pattern} failed: {error}"),
    }
}
