//! Execution engine: verify, authorize, and invoke one handler per link.
//!
//! [`ExecutionEngine::execute`] never fails outward. Every rejection and
//! every handler failure comes back as [`Outcome::Failed`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::guard::{run_guarded, GuardError};
use crate::link::CxLink;
use crate::policy::{CallContext, PolicyRegistry};
use crate::signature::SignatureValidator;

/// Default deadline for a single handler call.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// A handler bound to an `(entity, function)` pair.
#[async_trait]
pub trait LinkHandler: Send + Sync {
    /// Run `command` with the link's extras on behalf of `context`.
    async fn call(
        &self,
        command: &str,
        extras: &[String],
        context: &CallContext,
    ) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`LinkHandler`].
pub struct LinkFn<F>(F);

/// Wrap `f` as a [`LinkHandler`].
pub fn link_fn<F, Fut>(f: F) -> LinkFn<F>
where
    F: Fn(String, Vec<String>, CallContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    LinkFn(f)
}

#[async_trait]
impl<F, Fut> LinkHandler for LinkFn<F>
where
    F: Fn(String, Vec<String>, CallContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(
        &self,
        command: &str,
        extras: &[String],
        context: &CallContext,
    ) -> anyhow::Result<Value> {
        (self.0)(command.to_owned(), extras.to_vec(), context.clone()).await
    }
}

/// Why a link was not executed successfully.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    /// No link was supplied.
    #[error("empty link")]
    EmptyLink,

    /// The link's signature is missing or wrong.
    #[error("signature invalid")]
    SignatureInvalid,

    /// Policy refused the caller.
    #[error("policy denied")]
    PolicyDenied,

    /// Nothing is registered for the link's entity and function.
    #[error("no handler for {entity}:{function}")]
    NoHandler {
        /// Link entity.
        entity: String,
        /// Link function.
        function: String,
    },

    /// The handler returned an error or panicked.
    #[error("{0}")]
    Handler(String),

    /// The handler exceeded its deadline.
    #[error("handler timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    /// A secure group's control link was missing or refused.
    #[error("authorization failed")]
    ControlRejected,
}

impl From<GuardError> for ExecError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::TimedOut(deadline) => Self::TimedOut(deadline),
            other => Self::Handler(other.to_string()),
        }
    }
}

/// Result of executing one link.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The handler ran and returned this value.
    Ok(Value),
    /// The link was rejected or the handler failed.
    Failed(ExecError),
}

impl Outcome {
    /// Whether the handler ran successfully.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&ExecError> {
        match self {
            Self::Ok(_) => None,
            Self::Failed(err) => Some(err),
        }
    }

    /// Tagged JSON form: `{"ok": true, "result": ..}` or `{"ok": false, "error": ".."}`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Ok(result) => json!({ "ok": true, "result": result }),
            Self::Failed(err) => json!({ "ok": false, "error": err.to_string() }),
        }
    }
}

/// Declarative execution kernel for CX links.
pub struct ExecutionEngine {
    handlers: HashMap<(String, String), Arc<dyn LinkHandler>>,
    policy: PolicyRegistry,
    validator: SignatureValidator,
    handler_timeout: Duration,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("handlers", &self.handlers.len())
            .field("policy_entities", &self.policy.len())
            .field("handler_timeout", &self.handler_timeout)
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    /// Create an engine with no handlers.
    pub fn new(policy: PolicyRegistry, validator: SignatureValidator) -> Self {
        Self {
            handlers: HashMap::new(),
            policy,
            validator,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Override the per-call handler deadline.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Bind `handler` to `(entity, function)`, replacing any previous one.
    pub fn register(
        &mut self,
        entity: impl Into<String>,
        function: impl Into<String>,
        handler: Arc<dyn LinkHandler>,
    ) {
        let key = (entity.into(), function.into());
        info!(entity = %key.0, function = %key.1, "registered link handler");
        self.handlers.insert(key, handler);
    }

    /// Whether a handler is bound to `(entity, function)`.
    pub fn has_handler(&self, entity: &str, function: &str) -> bool {
        self.handlers
            .contains_key(&(entity.to_owned(), function.to_owned()))
    }

    /// The policy registry consulted by this engine.
    pub fn policy(&self) -> &PolicyRegistry {
        &self.policy
    }

    /// The signature validator consulted by this engine.
    pub fn validator(&self) -> &SignatureValidator {
        &self.validator
    }

    /// Signature and policy gate shared with secure groups.
    pub fn authorize(&self, link: &CxLink, context: &CallContext) -> Result<(), ExecError> {
        if !self.validator.verify(link) {
            warn!(link = %link.target(), "signature invalid");
            return Err(ExecError::SignatureInvalid);
        }
        if !self.policy.is_allowed(&link.entity, &link.function, context) {
            warn!(link = %link.target(), role = context.role(), "policy blocked");
            return Err(ExecError::PolicyDenied);
        }
        Ok(())
    }

    /// Execute a single link after validation.
    pub async fn execute(&self, link: Option<&CxLink>, context: &CallContext) -> Outcome {
        let Some(link) = link else {
            return Outcome::Failed(ExecError::EmptyLink);
        };

        if let Err(err) = self.authorize(link, context) {
            return Outcome::Failed(err);
        }

        let key = (link.entity.clone(), link.function.clone());
        let Some(handler) = self.handlers.get(&key).map(Arc::clone) else {
            debug!(link = %link.target(), "no handler registered");
            return Outcome::Failed(ExecError::NoHandler {
                entity: key.0,
                function: key.1,
            });
        };

        let command = link.command.clone();
        let extras = link.extras.clone();
        let ctx = context.clone();
        let run = async move { handler.call(&command, &extras, &ctx).await };

        match run_guarded(self.handler_timeout, run).await {
            Ok(result) => {
                info!(
                    link = %link.target(),
                    command = %link.command,
                    "link executed successfully"
                );
                Outcome::Ok(result)
            }
            Err(err) => {
                warn!(link = %link.target(), error = %err, "handler error");
                Outcome::Failed(err.into())
            }
        }
    }
}
