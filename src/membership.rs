//! Membership set loading.
//!
//! The membership source is gzip-compressed text with one `<id> <flag>`
//! record per line; the set of ids it yields is the sole filtering
//! predicate for edge projection. Malformed lines are counted and skipped,
//! never fatal: a truncated or garbage source yields an empty set plus
//! full counters. Only resource-level I/O failures abort the load.
//!
//! The flag column is captured by the record pattern but not consulted
//! here; it only matters to the labeling phases upstream.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use regex_lite::Regex;
use tracing::{debug, warn};

use crate::report::RunReport;
use crate::types::UserId;

/// Record pattern: an integer id, whitespace, a single-digit flag.
const MEMBERSHIP_LINE_PATTERN: &str = r"(\d+)\s+(\d)";

/// Lines between progress events while loading.
pub const MEMBERSHIP_PROGRESS_INTERVAL: u64 = 100_000;

/// Errors from membership loading.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    /// The source file is missing or unreadable.
    #[error("failed to open membership source {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The stream failed mid-read (truncated gzip, disk error).
    #[error("failed reading membership source: {0}")]
    Read(#[from] std::io::Error),
}

/// Counters from one membership load.
///
/// Invariant: `matching_lines + nonmatching_lines == lines_read`.
/// `bad_id_lines` is a subset of `matching_lines`: the pattern matched but
/// the id column did not fit in 64 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipStats {
    /// Total lines consumed from the source.
    pub lines_read: u64,
    /// Lines matching the record pattern.
    pub matching_lines: u64,
    /// Lines that did not match the record pattern.
    pub nonmatching_lines: u64,
    /// Matching lines whose id failed integer conversion.
    pub bad_id_lines: u64,
}

/// In-memory set of known user ids.
///
/// Built once per projection pass and immutable afterwards; membership
/// tests are O(1) amortized.
#[derive(Debug, Default)]
pub struct MembershipSet {
    ids: HashSet<UserId>,
}

impl MembershipSet {
    /// Whether `id` is a known user.
    pub fn contains(&self, id: UserId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of known users.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Load a membership set from a gzip-compressed source file.
    pub fn load_gzip(
        path: &Path,
        report: &mut RunReport,
    ) -> Result<(Self, MembershipStats), MembershipError> {
        let file = File::open(path).map_err(|source| MembershipError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(GzDecoder::new(file));
        Self::load_reader(reader, report)
    }

    /// Load a membership set from any line-oriented reader.
    pub fn load_reader<R: BufRead>(
        reader: R,
        report: &mut RunReport,
    ) -> Result<(Self, MembershipStats), MembershipError> {
        let pattern = Regex::new(MEMBERSHIP_LINE_PATTERN).expect("static pattern");
        let mut ids = HashSet::new();
        let mut stats = MembershipStats::default();

        for line in reader.lines() {
            let line = line?;
            stats.lines_read += 1;
            match pattern.captures(&line) {
                Some(caps) => {
                    stats.matching_lines += 1;
                    match caps[1].parse::<u64>() {
                        Ok(id) => {
                            ids.insert(UserId::new(id));
                        }
                        Err(_) => {
                            stats.bad_id_lines += 1;
                            warn!(line = stats.lines_read, id = &caps[1], "bad user id");
                        }
                    }
                }
                None => stats.nonmatching_lines += 1,
            }
            if stats.lines_read % MEMBERSHIP_PROGRESS_INTERVAL == 0 {
                debug!(
                    lines_read = stats.lines_read,
                    matching = stats.matching_lines,
                    bad_ids = stats.bad_id_lines,
                    "loading membership set"
                );
                report.line(&format!(
                    "{} lines read; {} lines matched; {} bad ids",
                    stats.lines_read, stats.matching_lines, stats.bad_id_lines
                ));
            }
        }

        debug!(users = ids.len(), "membership set loaded");
        Ok((Self { ids }, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn load(text: &str) -> (MembershipSet, MembershipStats) {
        MembershipSet::load_reader(Cursor::new(text.as_bytes().to_vec()), &mut RunReport::disabled())
            .unwrap()
    }

    #[test]
    fn test_load_counts_and_contents() {
        // The "XX 0" line fails the digit pattern.
        let (set, stats) = load("10 0\n20 1\nXX 0\n30 1\n");

        assert_eq!(set.len(), 3);
        assert!(set.contains(UserId::new(10)));
        assert!(set.contains(UserId::new(20)));
        assert!(set.contains(UserId::new(30)));
        assert!(!set.contains(UserId::new(40)));

        assert_eq!(stats.lines_read, 4);
        assert_eq!(stats.matching_lines, 3);
        assert_eq!(stats.nonmatching_lines, 1);
        assert_eq!(stats.bad_id_lines, 0);
    }

    #[test]
    fn test_empty_source_yields_empty_set() {
        let (set, stats) = load("");
        assert!(set.is_empty());
        assert_eq!(stats, MembershipStats::default());
    }

    #[test]
    fn test_bad_id_is_counted_as_matching() {
        // Matches the pattern but overflows u64.
        let (set, stats) = load("99999999999999999999999 0\n7 1\n");
        assert_eq!(set.len(), 1);
        assert_eq!(stats.matching_lines, 2);
        assert_eq!(stats.bad_id_lines, 1);
        assert_eq!(stats.nonmatching_lines, 0);
    }

    #[test]
    fn test_tab_separated_records_match() {
        let (set, stats) = load("5\t1\n");
        assert!(set.contains(UserId::new(5)));
        assert_eq!(stats.matching_lines, 1);
    }

    proptest! {
        /// For any source, matching + nonmatching accounts for every line,
        /// and bad ids never exceed the matching count.
        #[test]
        fn prop_counter_accounting(lines in proptest::collection::vec("[a-z0-9 ]{0,12}", 0..64)) {
            let text = lines.join("\n");
            let (_, stats) = load(&text);
            prop_assert_eq!(
                stats.matching_lines + stats.nonmatching_lines,
                stats.lines_read
            );
            prop_assert!(stats.bad_id_lines <= stats.matching_lines);
        }
    }
}
