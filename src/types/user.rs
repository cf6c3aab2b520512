//! User identifier type shared across the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique numeric identifier for a user, as assigned by the crawl corpus.
///
/// Wraps the 64-bit non-negative id both source corpora use and implements
/// `Ord` for deterministic ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    /// Create a new UserId from a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Parse a UserId from its decimal string form.
    pub fn from_decimal(s: &str) -> Result<Self, std::num::ParseIntError> {
        Ok(Self(s.parse()?))
    }

    /// Get the inner id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_ordering() {
        assert!(UserId::new(1) < UserId::new(2));
        assert!(UserId::new(10) < UserId::new(100));
    }

    #[test]
    fn test_user_id_from_decimal() {
        assert_eq!(UserId::from_decimal("42").unwrap(), UserId::new(42));
        assert!(UserId::from_decimal("not a number").is_err());
        // Larger than u64 capacity.
        assert!(UserId::from_decimal("99999999999999999999999").is_err());
    }
}
