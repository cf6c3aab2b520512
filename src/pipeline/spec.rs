//! Static description of the phase chain.
//!
//! The chain is fixed, small, and encoded as data: an ordered table of
//! phase specifications driven by a generic loop in the orchestrator.
//! Adding or removing a phase is a table change, not a control-flow
//! change. Phases 3 and 5 are the only ones with two upstream phases.

use crate::phase::PhaseId;
use std::path::{Path, PathBuf};

/// File produced by phase 1: deduplicated, sorted microblog user list.
pub const USER_LIST_FILE: &str = "user_list.txt.gz";
/// File produced by phase 2: sorted crawl user list.
pub const CRAWL_USERS_FILE: &str = "crawl_users.txt.gz";
/// File produced by phase 2: `<screen_name> <uid>` map, sorted by name.
pub const UID_MAP_FILE: &str = "uid_map.txt.gz";
/// File produced by phase 3: users present in both corpora.
pub const INTERSECTION_FILE: &str = "intersection.txt.gz";
/// File produced by phase 4: `<screen_name> <flag>` labels.
pub const USER_LABELS_FILE: &str = "user_labels.txt.gz";
/// File produced by phase 5: `<uid> <flag>` labels, the membership source.
pub const UID_LABELS_FILE: &str = "uid_labels.txt.gz";
/// File produced by phase 6: the projected edge list.
pub const PROJECTED_EDGES_FILE: &str = "projected_edges.txt.gz";
/// File produced by phase 7: the full graph in GraphML form.
pub const GRAPHML_FILE: &str = "social_graph.graphml.gz";
/// File produced by phase 7: a head sample of the graph in GraphML form.
pub const GRAPHML_SAMPLE_FILE: &str = "social_graph_sample.graphml.gz";

/// Expected in the crawl directory: `<uid> <screen_name>` user map.
pub const CRAWL_USER_MAP_FILE: &str = "user_map.txt.gz";
/// Expected in the crawl directory: the zip edge archive.
pub const CRAWL_ARCHIVE_FILE: &str = "social_graph.zip";
/// Optional beside the microblog export: `<screen_name> <flag>` lexicon.
pub const LABEL_LEXICON_FILE: &str = "label_lexicon.txt.gz";

/// Report file written inside each phase output directory.
pub const PHASE_REPORT_FILE: &str = "phase_report.txt";

/// Source of one phase input directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseInput {
    /// Output directory of an upstream phase.
    Phase(PhaseId),
    /// The microblog export directory from the invocation arguments.
    Microblog,
    /// The crawl directory from the invocation arguments.
    Crawl,
}

/// One row of the phase table.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSpec {
    /// Phase identifier.
    pub id: PhaseId,
    /// Short name used in logs and reports.
    pub name: &'static str,
    /// Input directories, in the order the runner receives them.
    pub inputs: &'static [PhaseInput],
    /// One-line description of what the phase produces.
    pub description: &'static str,
}

const P1: PhaseId = PhaseId::new_unchecked(1);
const P2: PhaseId = PhaseId::new_unchecked(2);
const P3: PhaseId = PhaseId::new_unchecked(3);
const P4: PhaseId = PhaseId::new_unchecked(4);
const P5: PhaseId = PhaseId::new_unchecked(5);
const P6: PhaseId = PhaseId::new_unchecked(6);
const P7: PhaseId = PhaseId::new_unchecked(7);

/// The fixed phase chain, in execution order.
pub const PHASE_TABLE: [PhaseSpec; 7] = [
    PhaseSpec {
        id: P1,
        name: "corpus-users",
        inputs: &[PhaseInput::Microblog],
        description: "Collect the deduplicated user list of the microblog export",
    },
    PhaseSpec {
        id: P2,
        name: "crawl-users",
        inputs: &[PhaseInput::Crawl],
        description: "Normalize the crawl user map into a sorted user list and uid map",
    },
    PhaseSpec {
        id: P3,
        name: "intersection",
        inputs: &[PhaseInput::Phase(P1), PhaseInput::Phase(P2)],
        description: "Intersect the microblog and crawl user lists",
    },
    PhaseSpec {
        id: P4,
        name: "labels",
        inputs: &[PhaseInput::Phase(P3), PhaseInput::Microblog],
        description: "Attach a binary label to every intersection user",
    },
    PhaseSpec {
        id: P5,
        name: "label-join",
        inputs: &[PhaseInput::Phase(P2), PhaseInput::Phase(P4)],
        description: "Join user labels with crawl uids into the membership source",
    },
    PhaseSpec {
        id: P6,
        name: "projection",
        inputs: &[PhaseInput::Phase(P5), PhaseInput::Crawl],
        description: "Project the crawl edge list onto the known-user intersection",
    },
    PhaseSpec {
        id: P7,
        name: "graph-assembly",
        inputs: &[PhaseInput::Phase(P6)],
        description: "Assemble the projected edges into GraphML deliverables",
    },
];

/// Output directory for a phase under the base output directory.
///
/// Pure and deterministic given the base path and phase number.
pub fn phase_output_dpath(base: &Path, id: PhaseId) -> PathBuf {
    base.join(format!("phase_{id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_ordered_and_complete() {
        let ids: Vec<u8> = PHASE_TABLE.iter().map(|s| s.id.as_u8()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_dual_upstream_phases() {
        let phase_inputs = |n: u8| -> usize {
            PHASE_TABLE[usize::from(n) - 1]
                .inputs
                .iter()
                .filter(|i| matches!(i, PhaseInput::Phase(_)))
                .count()
        };
        assert_eq!(phase_inputs(3), 2);
        assert_eq!(phase_inputs(5), 2);
        for n in [1, 2, 4, 6, 7] {
            assert!(phase_inputs(n) <= 1, "phase {n}");
        }
    }

    #[test]
    fn test_upstream_phases_precede_their_consumers() {
        for spec in &PHASE_TABLE {
            for input in spec.inputs {
                if let PhaseInput::Phase(upstream) = input {
                    assert!(upstream < &spec.id);
                }
            }
        }
    }

    #[test]
    fn test_output_dpath_is_deterministic() {
        let base = Path::new("/data/out");
        let id = PhaseId::new(6).unwrap();
        assert_eq!(
            phase_output_dpath(base, id),
            PathBuf::from("/data/out/phase_6")
        );
        assert_eq!(phase_output_dpath(base, id), phase_output_dpath(base, id));
    }
}
