//! Route patterns and the ordered matcher rules used by dispatch.
//!
//! A pattern is `entity:type:function:command` with any segment either a
//! literal or `*`. Dispatch does not search for the most specific pattern.
//! It builds one candidate key per rule in [`PRIORITY`] and takes the first
//! key present in the route table.

use std::fmt;

use crate::vector::Vector;

/// Wildcard segment.
pub const WILDCARD: &str = "*";

/// Number of segments in a route pattern.
pub const SEGMENT_COUNT: usize = 4;

/// Errors from parsing a route pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Wrong number of segments.
    #[error("route pattern {pattern:?} must have {SEGMENT_COUNT} segments, found {found}")]
    SegmentCount {
        /// The offending pattern.
        pattern: String,
        /// Segments present.
        found: usize,
    },
}

/// One validated `entity:type:function:command` pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutePattern {
    entity: String,
    kind: String,
    function: String,
    command: String,
}

impl RoutePattern {
    /// Parse and validate a pattern string.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] for a wrong segment count. Empty segments
    /// are literals, as they are in vectors.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let segments: Vec<&str> = pattern.split(':').collect();
        let [entity, kind, function, command] = segments.as_slice() else {
            return Err(PatternError::SegmentCount {
                pattern: pattern.to_owned(),
                found: segments.len(),
            });
        };
        Ok(Self {
            entity: (*entity).to_owned(),
            kind: (*kind).to_owned(),
            function: (*function).to_owned(),
            command: (*command).to_owned(),
        })
    }

    /// Shape of this pattern: which segments are wildcards.
    pub fn shape(&self) -> MatchRule {
        MatchRule {
            entity: Segment::of(&self.entity),
            kind: Segment::of(&self.kind),
            function: Segment::of(&self.function),
            command: Segment::of(&self.command),
        }
    }

    /// Whether some rule in [`PRIORITY`] can ever produce this pattern.
    pub fn is_reachable(&self) -> bool {
        let shape = self.shape();
        PRIORITY.iter().any(|rule| *rule == shape)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.entity, self.kind, self.function, self.command
        )
    }
}

/// How a rule fills one segment of the candidate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Copy the vector's field.
    Exact,
    /// Use `*`.
    Any,
}

impl Segment {
    fn of(segment: &str) -> Self {
        if segment == WILDCARD {
            Self::Any
        } else {
            Self::Exact
        }
    }

    fn render<'a>(self, field: &'a str) -> &'a str {
        match self {
            Self::Exact => field,
            Self::Any => WILDCARD,
        }
    }
}

/// Builds one candidate key from a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRule {
    /// Entity segment.
    pub entity: Segment,
    /// Type segment.
    pub kind: Segment,
    /// Function segment.
    pub function: Segment,
    /// Command segment.
    pub command: Segment,
}

impl MatchRule {
    const fn new(entity: Segment, kind: Segment, function: Segment, command: Segment) -> Self {
        Self {
            entity,
            kind,
            function,
            command,
        }
    }

    /// Candidate route key for `vector`.
    pub fn key_for(&self, vector: &Vector) -> String {
        format!(
            "{}:{}:{}:{}",
            self.entity.render(&vector.entity),
            self.kind.render(&vector.kind),
            self.function.render(&vector.function),
            self.command.render(&vector.command),
        )
    }
}

/// Dispatch order. The first rule whose key is registered wins.
pub const PRIORITY: [MatchRule; 5] = {
    use Segment::{Any, Exact};
    [
        MatchRule::new(Exact, Exact, Exact, Exact),
        MatchRule::new(Exact, Exact, Exact, Any),
        MatchRule::new(Exact, Any, Exact, Exact),
        MatchRule::new(Any, Exact, Exact, Exact),
        MatchRule::new(Any, Any, Exact, Exact),
    ]
};

/// Candidate keys for `vector`, in priority order.
pub fn candidate_keys(vector: &Vector) -> [String; 5] {
    PRIORITY.map(|rule| rule.key_for(vector))
}
