//! The CX link: one signable, executable unit.

use serde::{Deserialize, Serialize};

use crate::vector::Vector;

/// A single invocation of `function` on `entity`.
///
/// `raw` is the pre-signature representation the signature is computed over.
/// A link without a signature never verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CxLink {
    /// Target entity.
    pub entity: String,
    /// Target function.
    pub function: String,
    /// Command verb passed to the handler.
    pub command: String,
    /// Extra positional arguments passed to the handler.
    #[serde(default)]
    pub extras: Vec<String>,
    /// Signed representation.
    #[serde(default)]
    pub raw: String,
    /// Hex HMAC over `raw`, if signed.
    #[serde(default)]
    pub signature: Option<String>,
}

impl CxLink {
    /// Build an unsigned link. `raw` defaults to `entity:function:command`.
    pub fn new(
        entity: impl Into<String>,
        function: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        let entity = entity.into();
        let function = function.into();
        let command = command.into();
        let raw = format!("{entity}:{function}:{command}");
        Self {
            entity,
            function,
            command,
            extras: Vec::new(),
            raw,
            signature: None,
        }
    }

    /// Build an unsigned link from a decoded vector; `raw` is the vector's wire form.
    pub fn from_vector(vector: &Vector) -> Self {
        Self {
            entity: vector.entity.clone(),
            function: vector.function.clone(),
            command: vector.command.clone(),
            extras: Vec::new(),
            raw: vector.serialize(),
            signature: None,
        }
    }

    /// Replace the extra arguments.
    #[must_use]
    pub fn with_extras(mut self, extras: Vec<String>) -> Self {
        self.extras = extras;
        self
    }

    /// Replace the raw representation.
    #[must_use]
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    /// Attach a signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// `entity:function`, used in log lines and error messages.
    pub fn target(&self) -> String {
        format!("{}:{}", self.entity, self.function)
    }
}
