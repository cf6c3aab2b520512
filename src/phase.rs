//! Phase and subphase identifiers.
//!
//! The pipeline is a fixed chain of seven phases. Operators request work as
//! a set of tokens: a bare phase (`"3"`), a subphase within a phase
//! (`"3.1"`), or the sentinel `"all"`. Tokens are ordered so a resumed run
//! can skip everything at or below the last completed marker.

use regex_lite::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Number of phases in the fixed chain.
pub const PHASE_COUNT: u8 = 7;

/// Identifier of one pipeline phase (1 through [`PHASE_COUNT`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhaseId(u8);

impl PhaseId {
    /// Create a PhaseId, rejecting numbers outside the fixed chain.
    pub fn new(n: u8) -> Option<Self> {
        (1..=PHASE_COUNT).contains(&n).then_some(Self(n))
    }

    /// Construct from a number known to be in range (static tables).
    pub(crate) const fn new_unchecked(n: u8) -> Self {
        Self(n)
    }

    /// Get the phase number.
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// All phases in execution order.
    pub fn all() -> impl Iterator<Item = PhaseId> {
        (1..=PHASE_COUNT).map(PhaseId)
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A requested or completed unit of work: a whole phase or one subphase.
///
/// Ordering is ordinal on (phase, subphase), with a bare phase sorting
/// after its own subphases so that a completed `"4"` marker covers `"4.2"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseToken {
    /// A whole phase, e.g. `"4"`.
    Phase(PhaseId),
    /// One subphase within a phase, e.g. `"4.2"`.
    Subphase(PhaseId, u8),
}

impl PhaseToken {
    /// The phase this token belongs to.
    pub fn phase(self) -> PhaseId {
        match self {
            Self::Phase(p) | Self::Subphase(p, _) => p,
        }
    }

    /// Parse a token from its string form (`^\d$` or `^\d\.\d$`).
    ///
    /// Returns `None` for anything else, including phase numbers outside
    /// the fixed chain.
    pub fn parse(s: &str) -> Option<Self> {
        let phase_re = Regex::new(r"^(\d)$").expect("static pattern");
        let subphase_re = Regex::new(r"^(\d)\.(\d)$").expect("static pattern");
        if let Some(caps) = phase_re.captures(s) {
            let n: u8 = caps[1].parse().ok()?;
            return PhaseId::new(n).map(Self::Phase);
        }
        if let Some(caps) = subphase_re.captures(s) {
            let n: u8 = caps[1].parse().ok()?;
            let sub: u8 = caps[2].parse().ok()?;
            return PhaseId::new(n).map(|p| Self::Subphase(p, sub));
        }
        None
    }

    fn rank(self) -> (u8, u8) {
        match self {
            Self::Phase(p) => (p.as_u8(), u8::MAX),
            Self::Subphase(p, sub) => (p.as_u8(), sub),
        }
    }
}

impl fmt::Display for PhaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase(p) => write!(f, "{p}"),
            Self::Subphase(p, sub) => write!(f, "{p}.{sub}"),
        }
    }
}

impl PartialOrd for PhaseToken {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PhaseToken {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Serialize for PhaseToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PhaseToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| de::Error::custom(format!("invalid phase token {s:?}")))
    }
}

/// Error for a request token that is not `"all"`, a phase, or a subphase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid phase token {0:?} (expected \"all\", a phase like \"3\", or a subphase like \"3.1\")")]
pub struct InvalidPhaseToken(pub String);

/// The set of phases requested for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseRequest {
    /// Run every phase in the chain.
    All,
    /// Run only the listed phases and subphases.
    Selected(Vec<PhaseToken>),
}

/// How a phase should execute when it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubphaseMode {
    /// The whole phase was requested.
    Full,
    /// Only these subphases were requested (sorted, deduplicated).
    Only(Vec<u8>),
}

impl PhaseRequest {
    /// Parse operator-supplied tokens. The single sentinel `"all"` (in any
    /// position) selects the whole chain.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self, InvalidPhaseToken> {
        if tokens.iter().any(|t| t.as_ref().eq_ignore_ascii_case("all")) {
            return Ok(Self::All);
        }
        let mut selected = Vec::with_capacity(tokens.len());
        for token in tokens {
            let token = token.as_ref();
            match PhaseToken::parse(token) {
                Some(t) => selected.push(t),
                None => return Err(InvalidPhaseToken(token.to_string())),
            }
        }
        Ok(Self::Selected(selected))
    }

    /// Whether (and how) a phase should run under this request.
    ///
    /// An explicitly requested phase runs in full; a phase named only
    /// through subphase tokens runs in subphase mode; anything else is
    /// not run.
    pub fn wants(&self, phase: PhaseId) -> Option<SubphaseMode> {
        match self {
            Self::All => Some(SubphaseMode::Full),
            Self::Selected(tokens) => {
                if tokens
                    .iter()
                    .any(|t| matches!(t, PhaseToken::Phase(p) if *p == phase))
                {
                    return Some(SubphaseMode::Full);
                }
                let mut minors: Vec<u8> = tokens
                    .iter()
                    .filter_map(|t| match t {
                        PhaseToken::Subphase(p, sub) if *p == phase => Some(*sub),
                        _ => None,
                    })
                    .collect();
                if minors.is_empty() {
                    None
                } else {
                    minors.sort_unstable();
                    minors.dedup();
                    Some(SubphaseMode::Only(minors))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_parsing() {
        assert_eq!(
            PhaseToken::parse("3"),
            Some(PhaseToken::Phase(PhaseId::new(3).unwrap()))
        );
        assert_eq!(
            PhaseToken::parse("3.1"),
            Some(PhaseToken::Subphase(PhaseId::new(3).unwrap(), 1))
        );
        assert_eq!(PhaseToken::parse("0"), None);
        assert_eq!(PhaseToken::parse("8"), None);
        assert_eq!(PhaseToken::parse("3.10"), None);
        assert_eq!(PhaseToken::parse("three"), None);
        assert_eq!(PhaseToken::parse(""), None);
    }

    #[test]
    fn test_token_ordering_covers_subphases() {
        let p3 = PhaseToken::parse("3").unwrap();
        let p3_1 = PhaseToken::parse("3.1").unwrap();
        let p3_9 = PhaseToken::parse("3.9").unwrap();
        let p4 = PhaseToken::parse("4").unwrap();

        // A bare phase sorts after all of its own subphases.
        assert!(p3_1 < p3);
        assert!(p3_9 < p3);
        // And before everything in the next phase.
        assert!(p3 < p4);
        assert!(p3_1 < p4);
    }

    #[test]
    fn test_request_all_sentinel() {
        assert_eq!(PhaseRequest::parse(&["all"]).unwrap(), PhaseRequest::All);
        assert_eq!(
            PhaseRequest::parse(&["2", "ALL"]).unwrap(),
            PhaseRequest::All
        );
    }

    #[test]
    fn test_request_rejects_bad_tokens() {
        let err = PhaseRequest::parse(&["2", "9"]).unwrap_err();
        assert_eq!(err.0, "9");
    }

    #[test]
    fn test_wants_full_vs_subphase_mode() {
        let request = PhaseRequest::parse(&["1", "2.2", "2.1", "2.2"]).unwrap();
        let p1 = PhaseId::new(1).unwrap();
        let p2 = PhaseId::new(2).unwrap();
        let p3 = PhaseId::new(3).unwrap();

        assert_eq!(request.wants(p1), Some(SubphaseMode::Full));
        assert_eq!(request.wants(p2), Some(SubphaseMode::Only(vec![1, 2])));
        assert_eq!(request.wants(p3), None);
    }

    #[test]
    fn test_wants_explicit_phase_beats_subphases() {
        let request = PhaseRequest::parse(&["2", "2.1"]).unwrap();
        let p2 = PhaseId::new(2).unwrap();
        assert_eq!(request.wants(p2), Some(SubphaseMode::Full));
    }

    #[test]
    fn test_token_serde_round_trip() {
        let tokens = vec![
            PhaseToken::parse("1").unwrap(),
            PhaseToken::parse("6.2").unwrap(),
        ];
        let json = serde_json::to_string(&tokens).unwrap();
        assert_eq!(json, r#"["1","6.2"]"#);
        let back: Vec<PhaseToken> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tokens);
    }
}
