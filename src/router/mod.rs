//! Route table and priority-ordered dispatch of raw vectors.
//!
//! The router is built and populated once (registration takes `&mut self`)
//! and then shared behind an `Arc` for dispatch. Dispatch never surfaces an
//! error to the caller: malformed and unrouted vectors are logged and
//! dropped, and handler failures are reported to the observer.

pub mod bridge;
pub mod pattern;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use self::pattern::{candidate_keys, PatternError, RoutePattern};
use crate::engine::DEFAULT_HANDLER_TIMEOUT;
use crate::guard::run_guarded;
use crate::ledger::Ledger;
use crate::observer::{NoopObserver, Observer};
use crate::vector::Vector;

pub use self::bridge::{ContextResolver, EngineRoute, GuestContext};

/// Name the router reports under to the observer.
pub const OBSERVER_NAME: &str = "cx_router";

/// Ledger entries shown by [`Router::summary`] when not configured.
pub const DEFAULT_SUMMARY_LIMIT: usize = 20;

/// A handler bound to a route pattern.
#[async_trait]
pub trait RouteHandler: Send + Sync {
    /// Handle one dispatched vector.
    async fn handle(&self, vector: &Vector, payload: &Value) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`RouteHandler`].
pub struct RouteFn<F>(F);

/// Wrap `f` as a [`RouteHandler`].
pub fn route_fn<F, Fut>(f: F) -> RouteFn<F>
where
    F: Fn(Vector, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    RouteFn(f)
}

#[async_trait]
impl<F, Fut> RouteHandler for RouteFn<F>
where
    F: Fn(Vector, Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, vector: &Vector, payload: &Value) -> anyhow::Result<()> {
        (self.0)(vector.clone(), payload.clone()).await
    }
}

/// Errors from route registration.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The pattern string is invalid.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// What dispatch did with a vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The vector did not have five fields; nothing ran.
    Malformed,
    /// No candidate key was registered; nothing ran.
    Unrouted,
    /// The handler for `pattern` succeeded and the vector was recorded.
    Handled {
        /// Matched route pattern.
        pattern: String,
    },
    /// The handler for `pattern` failed; nothing was recorded.
    Failed {
        /// Matched route pattern.
        pattern: String,
        /// Failure description.
        error: String,
    },
}

/// Pattern-to-handler table plus dispatch collaborators.
pub struct Router {
    routes: BTreeMap<String, Arc<dyn RouteHandler>>,
    ledger: Option<Arc<Ledger>>,
    observer: Arc<dyn Observer>,
    handler_timeout: Duration,
    summary_limit: usize,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("ledger", &self.ledger.is_some())
            .field("handler_timeout", &self.handler_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Empty router without ledger, with a no-op observer.
    pub fn new() -> Self {
        Self {
            routes: BTreeMap::new(),
            ledger: None,
            observer: Arc::new(NoopObserver),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            summary_limit: DEFAULT_SUMMARY_LIMIT,
        }
    }

    /// Record successful dispatches in `ledger`.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Report check-ins and alerts to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Deadline applied to each route handler call.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Number of ledger entries included in [`Router::summary`].
    #[must_use]
    pub fn with_summary_limit(mut self, limit: usize) -> Self {
        self.summary_limit = limit;
        self
    }

    /// Bind `handler` to `pattern`, replacing any previous binding.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Pattern`] when `pattern` is not four non-empty segments.
    pub fn register(
        &mut self,
        pattern: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Result<(), RouteError> {
        let parsed = RoutePattern::parse(pattern)?;
        if !parsed.is_reachable() {
            warn!(pattern, "route pattern can never be selected by dispatch");
        }
        if self.routes.insert(parsed.to_string(), handler).is_some() {
            debug!(pattern, "route replaced");
        } else {
            debug!(pattern, "route registered");
        }
        Ok(())
    }

    /// Registered patterns, sorted.
    pub fn list_routes(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    /// The attached ledger, if any.
    pub fn ledger(&self) -> Option<&Arc<Ledger>> {
        self.ledger.as_ref()
    }

    /// First registered candidate for `vector`, in priority order.
    pub fn resolve(&self, vector: &Vector) -> Option<(String, Arc<dyn RouteHandler>)> {
        candidate_keys(vector).into_iter().find_map(|key| {
            let handler = self.routes.get(&key).map(Arc::clone)?;
            Some((key, handler))
        })
    }

    /// Decode `raw` and send it to the matching handler.
    pub async fn dispatch(&self, raw: &str, payload: Value) -> DispatchOutcome {
        let vector = match Vector::parse(raw) {
            Ok(vector) => vector,
            Err(err) => {
                warn!(error = %err, "invalid vector");
                return DispatchOutcome::Malformed;
            }
        };

        let Some((pattern, handler)) = self.resolve(&vector) else {
            debug!(vector = raw, "no route");
            return DispatchOutcome::Unrouted;
        };

        debug!(pattern = %pattern, vector = raw, "dispatch");
        let task_vector = vector.clone();
        let task_payload = payload.clone();
        let run = async move { handler.handle(&task_vector, &task_payload).await };

        match run_guarded(self.handler_timeout, run).await {
            Ok(()) => {
                self.observer.check_in(OBSERVER_NAME);
                self.observer.heartbeat(OBSERVER_NAME);
                if let Some(ledger) = &self.ledger {
                    ledger.record(raw, &payload).await;
                }
                DispatchOutcome::Handled { pattern }
            }
            Err(err) => {
                let error = err.to_string();
                error!(pattern = %pattern, error = %error, "handler failed");
                self.observer
                    .red_alert(OBSERVER_NAME, &format!("handler {pattern} failed: {error}"));
                DispatchOutcome::Failed { pattern, error }
            }
        }
    }

    /// Active routes followed by recent ledger entries.
    pub async fn summary(&self) -> String {
        let mut lines = vec![format!("active routes: {}", self.routes.len())];
        lines.extend(self.routes.keys().map(|r| format!("   ↳ {r}")));
        info!(routes = self.routes.len(), "router summary");

        match &self.ledger {
            Some(ledger) => match ledger.summarize(self.summary_limit).await {
                Ok(listing) => {
                    lines.push("recent CX events:".to_owned());
                    if !listing.is_empty() {
                        lines.push(listing);
                    }
                }
                Err(err) => debug!(error = %err, "summarize failed"),
            },
            None => lines.push("ledger: disabled".to_owned()),
        }
        lines.join("\n")
    }
}
