//! Edge types for the social graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::user::UserId;

/// Directed edge in the social graph.
///
/// Read directly from an input line; edges are filtered and re-serialized,
/// never mutated. Implements `Ord` for deterministic ordering:
/// (source, target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source user (follower).
    pub source: UserId,
    /// Target user (followed).
    pub target: UserId,
}

impl Edge {
    /// Create a new edge.
    pub fn new(source: UserId, target: UserId) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for Edge {
    /// The output-line form: `"<sourceId> <targetId>"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source, self.target)
    }
}

// Canonical ordering: source, then target
impl PartialOrd for Edge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Edge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.source.cmp(&other.source) {
            std::cmp::Ordering::Equal => self.target.cmp(&other.target),
            ord => ord,
        }
    }
}
