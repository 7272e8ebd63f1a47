//! Optional observability sink notified by the router.
//!
//! Chosen when the router is built. [`NoopObserver`] is the default, so
//! dispatch never depends on an observer being present.

use tracing::{debug, error};

/// Check-in, heartbeat, and alert capability.
pub trait Observer: Send + Sync {
    /// A component reported in.
    fn check_in(&self, name: &str);

    /// A component is alive.
    fn heartbeat(&self, name: &str);

    /// A component failed.
    fn red_alert(&self, name: &str, message: &str);
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn check_in(&self, _name: &str) {}

    fn heartbeat(&self, _name: &str) {}

    fn red_alert(&self, _name: &str, _message: &str) {}
}

/// Forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn check_in(&self, name: &str) {
        debug!(component = name, "check-in");
    }

    fn heartbeat(&self, name: &str) {
        debug!(component = name, "heartbeat");
    }

    fn red_alert(&self, name: &str, message: &str) {
        error!(component = name, alert = message, "red alert");
    }
}
