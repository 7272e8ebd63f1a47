//! Vector groups: several links under one entity with an optional control link.
//!
//! A secure group runs nothing unless its control link passes signature and
//! policy checks. Past that gate every member is attempted, and one member's
//! failure does not stop the others.

use tracing::warn;

use crate::engine::{ExecError, ExecutionEngine, Outcome};
use crate::link::CxLink;
use crate::policy::CallContext;

/// Result of executing a group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    /// The control gate refused the group; no member ran.
    Rejected(ExecError),
    /// One outcome per member, in insertion order.
    Executed(Vec<Outcome>),
}

impl GroupOutcome {
    /// Member outcomes, empty when rejected.
    pub fn outcomes(&self) -> &[Outcome] {
        match self {
            Self::Rejected(_) => &[],
            Self::Executed(outcomes) => outcomes,
        }
    }
}

/// An ordered bundle of links for one entity.
#[derive(Debug, Clone)]
pub struct VectorGroup {
    /// Entity the group acts on.
    pub entity: String,
    /// Whether the control link gate applies.
    pub secure: bool,
    links: Vec<CxLink>,
    control: Option<CxLink>,
}

impl VectorGroup {
    /// Empty group.
    pub fn new(entity: impl Into<String>, secure: bool) -> Self {
        Self {
            entity: entity.into(),
            secure,
            links: Vec::new(),
            control: None,
        }
    }

    /// Append a member, or set the control link when `control` is true.
    pub fn add(&mut self, link: CxLink, control: bool) {
        if control {
            self.control = Some(link);
        } else {
            self.links.push(link);
        }
    }

    /// Member links in order.
    pub fn links(&self) -> &[CxLink] {
        &self.links
    }

    /// Current control link.
    pub fn control(&self) -> Option<&CxLink> {
        self.control.as_ref()
    }

    /// Execute all members through `engine`.
    pub async fn execute_all(
        &self,
        engine: &ExecutionEngine,
        context: &CallContext,
    ) -> GroupOutcome {
        if self.secure {
            let authorized = self
                .control
                .as_ref()
                .is_some_and(|control| engine.authorize(control, context).is_ok());
            if !authorized {
                warn!(entity = %self.entity, "control link authorization failed");
                return GroupOutcome::Rejected(ExecError::ControlRejected);
            }
        }

        let mut outcomes = Vec::with_capacity(self.links.len());
        for link in &self.links {
            outcomes.push(engine.execute(Some(link), context).await);
        }
        GroupOutcome::Executed(outcomes)
    }
}
