//! Final artifact reconciliation.
//!
//! After the requested phases complete, a fixed manifest maps intermediate
//! phase outputs to their final locations in the output directory.
//! Artifacts that later invocations may reuse are copied; the large
//! one-shot deliverables are moved. A missing source is a logged skip,
//! never an abort: it is normal when only a subset of phases ran.

use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::phase::PhaseId;
use crate::pipeline::spec::{
    phase_output_dpath, GRAPHML_FILE, GRAPHML_SAMPLE_FILE, INTERSECTION_FILE,
    PROJECTED_EDGES_FILE, UID_LABELS_FILE,
};
use crate::report::RunReport;

/// Errors from finalization. Missing sources are not errors; these are
/// real I/O failures while transferring an artifact that does exist.
#[derive(Debug, thiserror::Error)]
pub enum FinalizeError {
    /// The final output directory could not be created.
    #[error("failed to create final output directory {path}: {source}")]
    CreateDir {
        /// Path that failed to create.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// An artifact transfer failed mid-way.
    #[error("failed to finalize {description} ({from} -> {to}): {source}")]
    Transfer {
        /// Human description of the artifact.
        description: &'static str,
        /// Source path.
        from: String,
        /// Destination path.
        to: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Transfer mode for one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Source retained; the artifact may be reused by later invocations.
    Copy,
    /// Source removed; large one-shot deliverable.
    Move,
}

/// One row of the artifact manifest.
#[derive(Debug, Clone, Copy)]
pub struct Artifact {
    /// Phase whose output directory holds the artifact.
    pub phase: PhaseId,
    /// File name inside the phase output directory.
    pub file_name: &'static str,
    /// File name inside the final output directory.
    pub final_name: &'static str,
    /// Human description for logs.
    pub description: &'static str,
    /// Whether the artifact is copied or moved.
    pub mode: TransferMode,
}

/// The fixed artifact manifest.
pub const ARTIFACT_MANIFEST: [Artifact; 5] = [
    Artifact {
        phase: PhaseId::new_unchecked(5),
        file_name: UID_LABELS_FILE,
        final_name: "uid_labels.txt.gz",
        description: "membership map",
        mode: TransferMode::Copy,
    },
    Artifact {
        phase: PhaseId::new_unchecked(3),
        file_name: INTERSECTION_FILE,
        final_name: "user_intersection.txt.gz",
        description: "identifier list",
        mode: TransferMode::Copy,
    },
    Artifact {
        phase: PhaseId::new_unchecked(7),
        file_name: GRAPHML_SAMPLE_FILE,
        final_name: GRAPHML_SAMPLE_FILE,
        description: "sampled graph",
        mode: TransferMode::Copy,
    },
    Artifact {
        phase: PhaseId::new_unchecked(6),
        file_name: PROJECTED_EDGES_FILE,
        final_name: "social_graph_edges.txt.gz",
        description: "full edge graph",
        mode: TransferMode::Move,
    },
    Artifact {
        phase: PhaseId::new_unchecked(7),
        file_name: GRAPHML_FILE,
        final_name: GRAPHML_FILE,
        description: "full graphml",
        mode: TransferMode::Move,
    },
];

/// Counts from one finalize pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeSummary {
    /// Artifacts copied or moved into place.
    pub transferred: usize,
    /// Manifest entries whose source was absent.
    pub skipped: usize,
}

fn transfer_error(
    artifact: &Artifact,
    from: &Path,
    to: &Path,
    source: std::io::Error,
) -> FinalizeError {
    FinalizeError::Transfer {
        description: artifact.description,
        from: from.display().to_string(),
        to: to.display().to_string(),
        source,
    }
}

/// Reconcile every manifest entry from the phase directories under
/// `base_dpath` into `final_dpath`.
pub fn finalize(
    base_dpath: &Path,
    final_dpath: &Path,
    report: &mut RunReport,
) -> Result<FinalizeSummary, FinalizeError> {
    fs::create_dir_all(final_dpath).map_err(|source| FinalizeError::CreateDir {
        path: final_dpath.display().to_string(),
        source,
    })?;

    let mut summary = FinalizeSummary::default();
    for artifact in &ARTIFACT_MANIFEST {
        let source = phase_output_dpath(base_dpath, artifact.phase).join(artifact.file_name);
        let dest = final_dpath.join(artifact.final_name);

        if !source.exists() {
            warn!(
                artifact = artifact.description,
                path = %source.display(),
                "artifact absent; skipping"
            );
            report.line(&format!(
                "skipped {}: {} not present",
                artifact.description,
                source.display()
            ));
            summary.skipped += 1;
            continue;
        }

        match artifact.mode {
            TransferMode::Copy => {
                fs::copy(&source, &dest)
                    .map_err(|e| transfer_error(artifact, &source, &dest, e))?;
            }
            TransferMode::Move => {
                // Rename when possible; fall back to copy+remove across
                // filesystems.
                if fs::rename(&source, &dest).is_err() {
                    fs::copy(&source, &dest)
                        .map_err(|e| transfer_error(artifact, &source, &dest, e))?;
                    fs::remove_file(&source)
                        .map_err(|e| transfer_error(artifact, &source, &dest, e))?;
                }
            }
        }
        info!(
            artifact = artifact.description,
            dest = %dest.display(),
            "artifact finalized"
        );
        report.line(&format!(
            "finalized {} -> {}",
            artifact.description,
            dest.display()
        ));
        summary.transferred += 1;
    }
    Ok(summary)
}
