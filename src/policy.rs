//! Role-based allow/deny policy per entity.
//!
//! Rules are strings of the form `function:role`, or `*` in the allow set
//! to admit every function and role. Deny always wins over allow, and an
//! entity without rules denies everything.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Role assumed when the caller context carries none.
pub const GUEST_ROLE: &str = "guest";

/// Wildcard accepted in an allow set.
pub const ALLOW_ALL: &str = "*";

/// Errors from loading policy rules.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policy file could not be read.
    #[error("failed to read policy file {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The policy file is not valid TOML for the rule schema.
    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Caller identity passed through the engine to policy and handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    /// Caller role; [`GUEST_ROLE`] when absent.
    #[serde(default)]
    pub role: Option<String>,
    /// Optional caller identifier, for handlers and logs.
    #[serde(default)]
    pub user: Option<String>,
    /// Free-form values forwarded to handlers.
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl CallContext {
    /// Context for a caller with the given role.
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    /// Effective role.
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(GUEST_ROLE)
    }
}

/// Allow and deny sets for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// `function:role` entries (or `*`) that are permitted.
    #[serde(default)]
    pub allow: BTreeSet<String>,
    /// `function:role` entries that are refused regardless of `allow`.
    #[serde(default)]
    pub deny: BTreeSet<String>,
}

impl PolicyRule {
    /// Build a rule from string slices.
    pub fn new(allow: &[&str], deny: &[&str]) -> Self {
        Self {
            allow: allow.iter().map(|s| (*s).to_owned()).collect(),
            deny: deny.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// Per-entity rule table.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    rules: BTreeMap<String, PolicyRule>,
}

impl PolicyRegistry {
    /// An empty registry; every check is denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an in-memory rule table.
    pub fn from_rules(rules: BTreeMap<String, PolicyRule>) -> Self {
        Self { rules }
    }

    /// Parse a TOML document whose top-level tables are entity names.
    ///
    /// ```toml
    /// ["hyperx.logger"]
    /// allow = ["record:admin", "*"]
    /// deny = ["purge:guest"]
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the document does not match the schema.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        let rules: BTreeMap<String, PolicyRule> = toml::from_str(source)?;
        Ok(Self { rules })
    }

    /// Load rules from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Read`] or [`PolicyError::Parse`].
    pub fn load_from_file(path: &Path) -> Result<Self, PolicyError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_toml_str(&contents).map_err(|source| PolicyError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), entities = registry.rules.len(), "policy file loaded");
        Ok(registry)
    }

    /// Insert or replace the rule for `entity`.
    pub fn set_rule(&mut self, entity: impl Into<String>, rule: PolicyRule) {
        self.rules.insert(entity.into(), rule);
    }

    /// Rule for `entity`, if any.
    pub fn rule(&self, entity: &str) -> Option<&PolicyRule> {
        self.rules.get(entity)
    }

    /// Number of entities with rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no entity has rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `function` on `entity` is permitted for the context's role.
    pub fn is_allowed(&self, entity: &str, function: &str, context: &CallContext) -> bool {
        let role = context.role();
        let Some(rule) = self.rules.get(entity) else {
            debug!(entity, function, role, "no policy for entity");
            return false;
        };
        let key = format!("{function}:{role}");
        if rule.deny.contains(&key) {
            debug!(entity, rule = %key, "denied by rule");
            return false;
        }
        rule.allow.contains(&key) || rule.allow.contains(ALLOW_ALL)
    }
}
