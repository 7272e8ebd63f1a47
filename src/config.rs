//! Configuration loading for the CX router.
//!
//! Loads `config.toml`. Every section is `#[serde(default)]`, so an empty
//! file (or no file at all) yields a working configuration. The signing
//! secret itself never lives here, only the name of the environment variable
//! that holds it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::ledger::DEFAULT_CHANNEL_CAPACITY;
use crate::policy::{PolicyRegistry, PolicyRule};
use crate::router::DEFAULT_SUMMARY_LIMIT;
use crate::signature::DEFAULT_SECRET_ENV;

/// Environment variable overriding the directory holding the ledger database.
pub const REPORTS_DIR_ENV: &str = "CX_REPORTS_DIR";

/// File name of the ledger database inside the reports directory.
pub const LEDGER_FILE_NAME: &str = "cx_log.sqlite3";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Ledger storage.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Link signing.
    #[serde(default)]
    pub signing: SigningConfig,

    /// Authorization rules.
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Dispatch behaviour.
    #[serde(default)]
    pub router: RouterConfig,

    /// Route plugin manifest.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Ledger storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Database file. Defaults to `$CX_REPORTS_DIR/cx_log.sqlite3`, then `~/.cx/cx_log.sqlite3`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Bounded capacity of the writer queue.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Entries shown by `--summary`.
    #[serde(default = "default_summary_limit")]
    pub summary_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            channel_capacity: default_channel_capacity(),
            summary_limit: default_summary_limit(),
        }
    }
}

/// Signing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Environment variable holding the HMAC secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
        }
    }
}

/// Policy sources. Inline rules are applied after the file's rules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyConfig {
    /// TOML policy file.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Inline per-entity rules.
    #[serde(default)]
    pub rules: BTreeMap<String, PolicyRule>,
}

/// Dispatch settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Deadline for one handler call, in seconds.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout_secs(),
        }
    }
}

impl RouterConfig {
    /// Handler deadline as a [`Duration`].
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

/// Plugin manifest settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginsConfig {
    /// Plugin names to load. `None` loads every eligible plugin.
    #[serde(default)]
    pub enabled: Option<Vec<String>>,

    /// Patterns forwarded into the execution engine by `engine_routes`.
    #[serde(default)]
    pub engine_patterns: Vec<String>,

    /// Role `engine_routes` authorizes vectors as. Unset means guest.
    #[serde(default)]
    pub engine_caller_role: Option<String>,
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Directory for JSON log files. Console-only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_summary_limit() -> usize {
    DEFAULT_SUMMARY_LIMIT
}
fn default_secret_env() -> String {
    DEFAULT_SECRET_ENV.to_owned()
}
fn default_handler_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Resolve the ledger database path.
    ///
    /// # Errors
    ///
    /// Returns an error if no explicit path is set and the home directory
    /// cannot be determined.
    pub fn ledger_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.ledger.path {
            return Ok(path.clone());
        }
        if let Some(dir) = std::env::var_os(REPORTS_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir).join(LEDGER_FILE_NAME));
        }
        Ok(config_dir()?.join(LEDGER_FILE_NAME))
    }

    /// Build the policy registry from the configured file and inline rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy file cannot be read or parsed.
    pub fn policy_registry(&self) -> anyhow::Result<PolicyRegistry> {
        let mut registry = match &self.policy.file {
            Some(path) => PolicyRegistry::load_from_file(path)?,
            None => PolicyRegistry::new(),
        };
        for (entity, rule) in &self.policy.rules {
            registry.set_rule(entity.clone(), rule.clone());
        }
        Ok(registry)
    }
}

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Load `~/.cx/config.toml`, or defaults when it does not exist.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined or an existing
/// file is invalid.
pub fn load_default_config() -> anyhow::Result<Config> {
    let path = config_dir()?.join("config.toml");
    if path.exists() {
        load_config(&path)
    } else {
        Ok(Config::default())
    }
}

/// Resolve the default config directory (`~/.cx/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".cx"))
}
