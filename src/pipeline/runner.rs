//! The phase runner seam.
//!
//! Each phase is executed through a capability object so the orchestrator
//! stays a generic loop over the phase table. Built-in runners live in
//! [`super::phases`]; tests substitute recording runners.

use std::path::PathBuf;

use crate::report::RunReport;

use super::PipelineError;

/// Everything a phase needs to run: resolved input directories (in the
/// order its table row declares them), its own output directory, the
/// requested subphase subset, and the phase report.
pub struct PhaseContext {
    /// Input directories resolved from the phase table.
    pub inputs: Vec<PathBuf>,
    /// This phase's output directory, already created.
    pub output_dpath: PathBuf,
    /// Requested subphase minors, or `None` for a full run.
    pub subphases: Option<Vec<u8>>,
    /// Report handle for operator-facing progress.
    pub report: RunReport,
}

impl PhaseContext {
    /// Whether a subphase should run under the requested subset.
    pub fn wants_subphase(&self, minor: u8) -> bool {
        self.subphases
            .as_ref()
            .map_or(true, |subset| subset.contains(&minor))
    }
}

/// A capability that executes one phase.
///
/// A runner reads from `ctx.inputs`, writes its artifacts under
/// `ctx.output_dpath`, and reports progress through `ctx.report`. Errors
/// propagate unchanged and abort the run.
pub trait PhaseRunner {
    /// Execute the phase against the prepared context.
    fn run(&self, ctx: &mut PhaseContext) -> Result<(), PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ctx(subphases: Option<Vec<u8>>) -> PhaseContext {
        PhaseContext {
            inputs: vec![],
            output_dpath: PathBuf::from("/tmp/out"),
            subphases,
            report: RunReport::disabled(),
        }
    }

    #[test]
    fn test_full_run_wants_every_subphase() {
        let ctx = make_ctx(None);
        assert!(ctx.wants_subphase(1));
        assert!(ctx.wants_subphase(9));
    }

    #[test]
    fn test_subphase_mode_filters() {
        let ctx = make_ctx(Some(vec![2]));
        assert!(!ctx.wants_subphase(1));
        assert!(ctx.wants_subphase(2));
    }
}
