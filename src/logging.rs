//! Tracing setup for the `cx-router` binary.
//!
//! [`init`] picks the mode from `[logging]` in `config.toml`:
//! - `dir` set: JSON lines to `{dir}/cx-router.log.YYYY-MM-DD` plus stderr
//!   ([`init_production`])
//! - `dir` unset: stderr only ([`init_cli`])
//!
//! The filter comes from `RUST_LOG`, then `[logging] filter`, then
//! [`DEFAULT_FILTER`], which keeps the sqlx query log out of dispatch output.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Log file prefix inside the logs directory.
pub const LOG_FILE_PREFIX: &str = "cx-router.log";

/// Filter used when neither `RUST_LOG` nor `[logging] filter` is set.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Keeps the file writer alive; dropping it flushes pending lines.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Filter directive in effect: environment, then config, then default.
pub fn filter_directive(env: Option<&str>, configured: Option<&str>) -> String {
    [env, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|d| !d.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_owned()
}

fn env_filter(configured: Option<&str>) -> EnvFilter {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(env.as_deref(), configured);
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if file logging is configured and cannot be set up.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<LoggingGuard>> {
    let filter = config.filter.as_deref();
    match &config.dir {
        Some(dir) => init_production(dir, filter).map(Some),
        None => {
            init_cli(filter);
            Ok(None)
        }
    }
}

/// JSON file logging with daily rotation, plus human-readable stderr.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_production(logs_dir: &Path, filter: Option<&str>) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!(
            "failed to create logs directory {}: {e}",
            logs_dir.display()
        )
    })?;

    let (non_blocking, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(env_filter(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Console-only logging on stderr, so stdout stays the command's output.
///
/// A second call is a no-op.
pub fn init_cli(filter: Option<&str>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(filter))
        .with_writer(std::io::stderr)
        .try_init();
}
