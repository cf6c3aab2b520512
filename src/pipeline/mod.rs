//! Pipeline orchestration.
//!
//! The orchestrator drives the fixed phase chain: it resolves each
//! requested phase's input directories from the static table, prepares a
//! fresh output directory, invokes the phase's runner, and advances the
//! session's completed marker (persisting it) after every success. A
//! restored session skips everything at or below its marker, which is what
//! makes a multi-day run survive interruption. After the last requested
//! phase, the artifact manifest is reconciled into the final output
//! directory.
//!
//! Everything is synchronous and single-threaded; a phase either fully
//! succeeds or the whole run aborts with the phase's error unchanged.

pub mod phases;
pub mod runner;
pub mod spec;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::config::ConfigError;
use crate::finalize::{finalize, FinalizeError, FinalizeSummary};
use crate::phase::{PhaseId, PhaseRequest, PhaseToken, SubphaseMode};
use crate::projector::ProjectionError;
use crate::report::RunReport;
use crate::session::{Session, SessionArgs, SessionError};

pub use phases::standard_runners;
pub use runner::{PhaseContext, PhaseRunner};
pub use spec::{phase_output_dpath, PhaseInput, PhaseSpec, PHASE_TABLE};

/// Errors aborting a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Session state failed to load or persist.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Invocation parameters failed to resolve.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The projection phase failed.
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    /// Artifact finalization failed.
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    /// A requested phase has no registered runner.
    #[error("no runner registered for phase {0}")]
    MissingRunner(PhaseId),
    /// Filesystem failure while preparing or running a phase.
    #[error("I/O failure while {what}: {source}")]
    Io {
        /// What was being done.
        what: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// The multi-phase pipeline orchestrator.
///
/// Owns the [`Session`] lifecycle: a fresh session for new invocations, a
/// restored one for resumed invocations, persisted after every completed
/// phase.
pub struct Pipeline {
    session: Session,
    session_path: PathBuf,
    runners: BTreeMap<PhaseId, Box<dyn PhaseRunner>>,
}

impl Pipeline {
    /// Create a pipeline for a fresh invocation with the standard runners.
    pub fn new(args: SessionArgs, requested: PhaseRequest) -> Self {
        let session = Session::new(args, requested);
        let session_path = Session::file_path(&session.args.output_dpath);
        Self {
            session,
            session_path,
            runners: standard_runners(),
        }
    }

    /// Restore a pipeline from a persisted session file.
    ///
    /// All invocation parameters come from the persisted state; nothing
    /// else is consulted, so the resumed run is configured identically to
    /// the original.
    pub fn resume(session_path: &Path) -> Result<Self, PipelineError> {
        let session = Session::load(session_path)?;
        info!(
            started_at = %session.started_at,
            last_completed = ?session.last_completed,
            "session restored"
        );
        Ok(Self {
            session,
            session_path: session_path.to_path_buf(),
            runners: standard_runners(),
        })
    }

    /// Replace the runner set. Used by tests and by deployments that swap
    /// a phase implementation.
    pub fn with_runners(mut self, runners: BTreeMap<PhaseId, Box<dyn PhaseRunner>>) -> Self {
        self.runners = runners;
        self
    }

    /// The current session state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run every requested phase in dependency order, then finalize.
    pub fn run(&mut self) -> Result<FinalizeSummary, PipelineError> {
        let base = self.session.args.output_dpath.clone();
        fs::create_dir_all(&base).map_err(|source| PipelineError::Io {
            what: format!("creating output directory {}", base.display()),
            source,
        })?;
        self.session.persist(&self.session_path)?;

        info!(
            microblog = %self.session.args.microblog_dpath.display(),
            crawl = %self.session.args.crawl_dpath.display(),
            output = %base.display(),
            "pipeline starting"
        );

        for phase_spec in &PHASE_TABLE {
            self.run_phase(phase_spec, &base)?;
        }

        let mut report = RunReport::disabled();
        let summary = finalize(&base, &base, &mut report)?;
        info!(
            transferred = summary.transferred,
            skipped = summary.skipped,
            "pipeline completed"
        );
        Ok(summary)
    }

    fn run_phase(&mut self, phase_spec: &PhaseSpec, base: &Path) -> Result<(), PipelineError> {
        let id = phase_spec.id;
        let mode = match self.session.requested.wants(id) {
            Some(mode) => mode,
            None => return Ok(()),
        };

        // Skip rule: anything at or below the restored marker is done.
        let (subphases, completion_token) = match mode {
            SubphaseMode::Full => {
                if self.session.is_completed(PhaseToken::Phase(id)) {
                    info!(phase = %id, "phase already completed; skipping");
                    return Ok(());
                }
                (None, PhaseToken::Phase(id))
            }
            SubphaseMode::Only(minors) => {
                let pending: Vec<u8> = minors
                    .into_iter()
                    .filter(|m| !self.session.is_completed(PhaseToken::Subphase(id, *m)))
                    .collect();
                match pending.last() {
                    Some(last) => {
                        let token = PhaseToken::Subphase(id, *last);
                        (Some(pending), token)
                    }
                    None => {
                        info!(phase = %id, "requested subphases already completed; skipping");
                        return Ok(());
                    }
                }
            }
        };

        let runner = self
            .runners
            .get(&id)
            .ok_or(PipelineError::MissingRunner(id))?;

        let output_dpath = phase_output_dpath(base, id);
        // A full phase run starts from a fresh directory so prior partial
        // output can never merge in; subphase runs build on what is there.
        if subphases.is_none() && output_dpath.exists() {
            fs::remove_dir_all(&output_dpath).map_err(|source| PipelineError::Io {
                what: format!("clearing {}", output_dpath.display()),
                source,
            })?;
        }
        fs::create_dir_all(&output_dpath).map_err(|source| PipelineError::Io {
            what: format!("creating {}", output_dpath.display()),
            source,
        })?;

        let inputs = resolve_inputs(phase_spec, base, &self.session.args);
        let report = RunReport::open(&output_dpath.join(spec::PHASE_REPORT_FILE))
            .unwrap_or_else(|e| {
                warn!(phase = %id, error = %e, "cannot open phase report; continuing without");
                RunReport::disabled()
            });

        info!(
            phase = %id,
            name = phase_spec.name,
            subphases = ?subphases,
            "phase starting"
        );
        let started = Instant::now();
        let mut ctx = PhaseContext {
            inputs,
            output_dpath,
            subphases,
            report,
        };
        let result = runner.run(&mut ctx);
        if let Err(e) = ctx.report.close() {
            warn!(phase = %id, error = %e, "phase report close failed");
        }
        if let Err(e) = result {
            error!(phase = %id, error = %e, "phase failed; aborting run");
            return Err(e);
        }
        info!(
            phase = %id,
            elapsed_s = started.elapsed().as_secs_f64(),
            "phase completed"
        );

        self.session.mark_completed(completion_token);
        self.session.persist(&self.session_path)?;
        Ok(())
    }
}

fn resolve_inputs(phase_spec: &PhaseSpec, base: &Path, args: &SessionArgs) -> Vec<PathBuf> {
    phase_spec
        .inputs
        .iter()
        .map(|input| match input {
            PhaseInput::Phase(upstream) => phase_output_dpath(base, *upstream),
            PhaseInput::Microblog => args.microblog_dpath.clone(),
            PhaseInput::Crawl => args.crawl_dpath.clone(),
        })
        .collect()
}
