//! Route plugins registered from an explicit manifest at startup.
//!
//! Only plugins named `*_routes` are eligible. Each plugin stages its routes
//! in a [`RouteSet`]; the set is applied to the router only if the plugin
//! finished without error, so a failing plugin leaves no partial routes
//! behind and does not stop the rest of the manifest.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::engine::ExecutionEngine;
use crate::router::pattern::RoutePattern;
use crate::router::{route_fn, ContextResolver, EngineRoute, RouteHandler, Router};
use crate::vector::Vector;

/// Naming convention for loadable plugins.
pub const PLUGIN_SUFFIX: &str = "_routes";

/// A bundle of routes.
pub trait RoutePlugin: Send + Sync {
    /// Plugin name, e.g. `logger_routes`.
    fn name(&self) -> &str;

    /// Stage this plugin's routes.
    ///
    /// # Errors
    ///
    /// Any error aborts this plugin only.
    fn register(&self, routes: &mut RouteSet) -> anyhow::Result<()>;
}

/// Routes staged by one plugin.
#[derive(Default)]
pub struct RouteSet {
    routes: Vec<(String, Arc<dyn RouteHandler>)>,
}

impl RouteSet {
    /// Stage `handler` for `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error when the pattern is invalid.
    pub fn add(&mut self, pattern: &str, handler: Arc<dyn RouteHandler>) -> anyhow::Result<()> {
        let parsed = RoutePattern::parse(pattern)?;
        self.routes.push((parsed.to_string(), handler));
        Ok(())
    }

    /// Number of staged routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// What [`PluginLoader::load`] did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Plugins whose routes were applied.
    pub loaded: Vec<String>,
    /// Plugins not eligible or not enabled.
    pub skipped: Vec<String>,
    /// Plugins that failed, with the error.
    pub failed: Vec<(String, String)>,
}

/// Ordered plugin manifest.
#[derive(Default)]
pub struct PluginLoader {
    plugins: Vec<Box<dyn RoutePlugin>>,
    enabled: Option<BTreeSet<String>>,
}

impl PluginLoader {
    /// Empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin to the manifest.
    #[must_use]
    pub fn with(mut self, plugin: impl RoutePlugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Restrict loading to the named plugins.
    #[must_use]
    pub fn enable_only<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Register every eligible plugin into `router`.
    pub fn load(&self, router: &mut Router) -> LoadReport {
        let mut report = LoadReport::default();
        for plugin in &self.plugins {
            let name = plugin.name().to_owned();
            let enabled = self.enabled.as_ref().is_none_or(|set| set.contains(&name));
            if !name.ends_with(PLUGIN_SUFFIX) || !enabled {
                debug!(plugin = %name, "plugin skipped");
                report.skipped.push(name);
                continue;
            }

            let mut staged = RouteSet::default();
            if let Err(err) = plugin.register(&mut staged) {
                warn!(plugin = %name, error = %err, "plugin load failed");
                report.failed.push((name, format!("{err:#}")));
                continue;
            }
            for (pattern, handler) in staged.routes {
                if let Err(err) = router.register(&pattern, handler) {
                    warn!(plugin = %name, pattern = %pattern, error = %err, "route rejected");
                }
            }
            debug!(plugin = %name, "plugin loaded");
            report.loaded.push(name);
        }
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "plugins loaded"
        );
        report
    }
}

/// Logs `record:write` vectors of type `log` for any entity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggerRoutes;

/// Pattern served by [`LoggerRoutes`].
pub const LOGGER_PATTERN: &str = "*:log:record:write";

impl RoutePlugin for LoggerRoutes {
    fn name(&self) -> &str {
        "logger_routes"
    }

    fn register(&self, routes: &mut RouteSet) -> anyhow::Result<()> {
        routes.add(
            LOGGER_PATTERN,
            Arc::new(route_fn(|vector: Vector, payload: Value| async move {
                let msg = payload.get("msg").and_then(Value::as_str).unwrap_or("");
                info!(
                    entity = %vector.entity,
                    opac = %vector.opac,
                    msg,
                    %payload,
                    "cx log record"
                );
                Ok(())
            })),
        )
    }
}

/// Forwards configured patterns into an [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct EngineRoutes {
    route: EngineRoute,
    patterns: Vec<String>,
}

impl EngineRoutes {
    /// Bind each of `patterns` to `engine`. Callers are guests.
    pub fn new(engine: Arc<ExecutionEngine>, patterns: Vec<String>) -> Self {
        Self {
            route: EngineRoute::new(engine),
            patterns,
        }
    }

    /// Resolve caller contexts through `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ContextResolver>) -> Self {
        self.route = self.route.with_resolver(resolver);
        self
    }
}

impl RoutePlugin for EngineRoutes {
    fn name(&self) -> &str {
        "engine_routes"
    }

    fn register(&self, routes: &mut RouteSet) -> anyhow::Result<()> {
        let route: Arc<dyn RouteHandler> = Arc::new(self.route.clone());
        for pattern in &self.patterns {
            routes.add(pattern, Arc::clone(&route))?;
        }
        Ok(())
    }
}
