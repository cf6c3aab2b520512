//! # graphweld
//!
//! Resumable curation pipeline that merges a microblog export with a prior
//! social-network crawl into one consistent graph dataset.
//!
//! The hard constraints are restartability and bounded memory: the crawl's
//! edge list is far larger than RAM (on the order of 10^9 lines), and a
//! full run takes long enough that surviving interruption matters. The
//! core is therefore:
//!
//! 1. A streaming, set-membership **edge projector** that filters the
//!    edge list down to edges connecting two known users, writing output
//!    in fixed-size batches.
//! 2. A **session-backed orchestrator** that sequences the seven dependent
//!    phases, persists progress after each one, and reconciles phase
//!    outputs into the final deliverable set.
//!
//! ## Architecture
//!
//! ```text
//! MembershipSet ──► EdgeProjector ──► projected edges ──► OutputFinalizer
//!        ▲                ▲
//!        └── Pipeline (phase table, Session lifecycle, RunReport) ──┘
//! ```
//!
//! ## Guarantees
//!
//! - Peak memory during projection is about one output batch, regardless
//!   of input size.
//! - Projection is deterministic: same inputs, byte-identical output.
//! - A resumed run takes every invocation argument from the persisted
//!   session, skipping phases at or below the completed marker.
//! - Malformed input lines are counted and skipped, never fatal; missing
//!   input files are fatal with a file-identifying error.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod finalize;
pub mod membership;
pub mod phase;
pub mod pipeline;
pub mod projector;
pub mod report;
pub mod session;
pub mod types;

// Re-exports
pub use config::{ConfigError, FileConfig, DEFAULT_CONFIG_FILE};
pub use finalize::{finalize, Artifact, FinalizeError, FinalizeSummary, TransferMode, ARTIFACT_MANIFEST};
pub use membership::{MembershipError, MembershipSet, MembershipStats};
pub use phase::{InvalidPhaseToken, PhaseId, PhaseRequest, PhaseToken, SubphaseMode, PHASE_COUNT};
pub use pipeline::{Pipeline, PipelineError, PhaseContext, PhaseRunner, PhaseSpec, PHASE_TABLE};
pub use projector::{EdgeProjector, ProjectionError, ProjectionSummary, ProjectorConfig};
pub use report::RunReport;
pub use session::{Session, SessionArgs, SessionError};
pub use types::{Edge, UserId};

/// Schema version embedded in persisted session state.
/// Increment on breaking changes to the session format.
pub const SESSION_SCHEMA_VERSION: &str = "1.0.0";
