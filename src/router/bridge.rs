//! Route handler that forwards a vector into the execution engine.
//!
//! The vector becomes a [`CxLink`] whose raw form is the vector's wire
//! string. Payload keys supply the rest:
//! - `signature`: hex signature over the wire string
//! - `extras`: array of extra arguments
//!
//! The caller's [`CallContext`] never comes from the payload. The signature
//! covers only the wire string, so the role is resolved by the host through
//! a [`ContextResolver`]; the default resolves every vector as a guest.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::RouteHandler;
use crate::engine::{ExecutionEngine, Outcome};
use crate::link::CxLink;
use crate::policy::CallContext;
use crate::vector::Vector;

/// Host-supplied source of the caller context for a routed vector.
pub trait ContextResolver: Send + Sync {
    /// Context the engine authorizes `vector` against.
    fn context_for(&self, vector: &Vector) -> CallContext;
}

/// Resolves every vector as an anonymous guest.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuestContext;

impl ContextResolver for GuestContext {
    fn context_for(&self, _vector: &Vector) -> CallContext {
        CallContext::default()
    }
}

/// A fixed context, for hosts with one authenticated principal.
impl ContextResolver for CallContext {
    fn context_for(&self, _vector: &Vector) -> CallContext {
        self.clone()
    }
}

/// Executes dispatched vectors through an [`ExecutionEngine`].
#[derive(Clone)]
pub struct EngineRoute {
    engine: Arc<ExecutionEngine>,
    resolver: Arc<dyn ContextResolver>,
}

impl std::fmt::Debug for EngineRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRoute")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl EngineRoute {
    /// Forward into `engine`, authorizing every vector as a guest.
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            resolver: Arc::new(GuestContext),
        }
    }

    /// Resolve caller contexts through `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ContextResolver>) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Build the link the engine will execute for `vector`.
pub fn link_from_payload(vector: &Vector, payload: &Value) -> CxLink {
    let extras = payload
        .get("extras")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let mut link = CxLink::from_vector(vector).with_extras(extras);
    link.signature = payload
        .get("signature")
        .and_then(Value::as_str)
        .map(str::to_owned);
    link
}

#[async_trait]
impl RouteHandler for EngineRoute {
    async fn handle(&self, vector: &Vector, payload: &Value) -> anyhow::Result<()> {
        let link = link_from_payload(vector, payload);
        if payload.get("context").is_some() {
            debug!(link = %link.target(), "payload context ignored");
        }
        let context = self.resolver.context_for(vector);
        match self.engine.execute(Some(&link), &context).await {
            Outcome::Ok(result) => {
                debug!(link = %link.target(), %result, "engine route completed");
                Ok(())
            }
            Outcome::Failed(err) => Err(anyhow::Error::new(err)),
        }
    }
}
