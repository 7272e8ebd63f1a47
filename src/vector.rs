//! Vector codec: the 5-field `entity:type:opac:function:command` wire string.
//!
//! The codec only checks shape. Whether `opac` is numeric is decided by the
//! consumer that needs the number (the ledger), via [`Vector::opac_value`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Field delimiter of the wire format.
pub const DELIMITER: char = ':';

/// Number of fields in a well-formed vector.
pub const FIELD_COUNT: usize = 5;

/// Errors from decoding a vector string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VectorError {
    /// The string did not split into exactly five fields.
    #[error("malformed vector {vector:?}: expected {FIELD_COUNT} fields, found {found}")]
    Malformed {
        /// The offending input.
        vector: String,
        /// Number of fields actually present.
        found: usize,
    },

    /// The `opac` field is not a finite decimal number.
    #[error("invalid opac {opac:?}: not a finite decimal")]
    InvalidOpac {
        /// The raw opac field.
        opac: String,
    },
}

/// A decoded CX vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector {
    /// Target entity (e.g. `hyperx.logger`).
    pub entity: String,
    /// Record type (the `type` field on the wire).
    #[serde(rename = "type")]
    pub kind: String,
    /// Decimal weight, kept verbatim.
    pub opac: String,
    /// Target function.
    pub function: String,
    /// Command verb.
    pub command: String,
}

impl Vector {
    /// Build a vector from its five fields.
    pub fn new(
        entity: impl Into<String>,
        kind: impl Into<String>,
        opac: impl Into<String>,
        function: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            kind: kind.into(),
            opac: opac.into(),
            function: function.into(),
            command: command.into(),
        }
    }

    /// Decode a wire string.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Malformed`] unless the input has exactly five
    /// `:`-separated fields.
    pub fn parse(raw: &str) -> Result<Self, VectorError> {
        let parts: Vec<&str> = raw.split(DELIMITER).collect();
        match parts.as_slice() {
            [entity, kind, opac, function, command] => {
                Ok(Self::new(*entity, *kind, *opac, *function, *command))
            }
            _ => Err(VectorError::Malformed {
                vector: raw.to_owned(),
                found: parts.len(),
            }),
        }
    }

    /// Encode back to the wire string.
    pub fn serialize(&self) -> String {
        self.fields().join(":")
    }

    /// Fields in wire order.
    pub fn fields(&self) -> [&str; FIELD_COUNT] {
        [
            &self.entity,
            &self.kind,
            &self.opac,
            &self.function,
            &self.command,
        ]
    }

    /// Numeric view of `opac`.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::InvalidOpac`] for non-numeric, NaN, or infinite values.
    pub fn opac_value(&self) -> Result<f64, VectorError> {
        match self.opac.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(VectorError::InvalidOpac {
                opac: self.opac.clone(),
            }),
        }
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.entity, self.kind, self.opac, self.function, self.command
        )
    }
}

impl FromStr for Vector {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
