//! Streaming edge-list projection.
//!
//! Filters a zip-contained edge list down to the edges whose endpoints are
//! both in a membership set, writing survivors to a gzip stream. The input
//! may hold on the order of 10^9 lines, so kept edges accumulate in a
//! fixed-capacity batch that is written and cleared whenever it fills;
//! peak memory stays around one batch regardless of input size.
//!
//! ## Guarantees
//!
//! - An edge is kept iff both endpoints are members.
//! - `edges_kept` equals the number of output lines written.
//! - Output is deterministic: rerunning over the same inputs produces
//!   byte-identical output and identical counters.
//!
//! Malformed edge lines are counted and skipped, matching the membership
//! loader's tolerance: one bad line in a multi-gigabyte crawl must not
//! abort a multi-hour pass.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use regex_lite::Regex;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::membership::{MembershipError, MembershipSet};
use crate::report::RunReport;
use crate::types::{Edge, UserId};

/// Edge pattern: two integer ids separated by tabs or spaces.
const EDGE_LINE_PATTERN: &str = r"(\d+)[\t ]+(\d+)";

/// Errors from a projection pass. All of these are resource-level and
/// fatal; the recovery path is to rerun the pass.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Membership source failed to load.
    #[error(transparent)]
    Membership(#[from] MembershipError),
    /// The edge archive file is missing or unreadable.
    #[error("failed to open edge archive {path}: {source}")]
    OpenArchive {
        /// Path that failed to open.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The archive is not a readable zip container.
    #[error("edge archive {path} is not a readable zip container: {source}")]
    BadArchive {
        /// Path of the offending archive.
        path: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// The archive has no entry under the expected name.
    #[error("edge archive {path} has no {entry:?} entry: {source}")]
    MissingEntry {
        /// Path of the offending archive.
        path: String,
        /// Entry name that was looked up.
        entry: String,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// The output file could not be created.
    #[error("failed to create projection output {path}: {source}")]
    CreateOutput {
        /// Path that failed to open for writing.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Read or write failure mid-stream.
    #[error("I/O failure during projection: {0}")]
    Io(#[from] std::io::Error),
}

/// Tunables for one projection pass.
///
/// Defaults match the production dataset layout. Tests shrink `batch_size`
/// to exercise the flush boundary without hundred-thousand-line fixtures.
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// Name of the single edge-list entry inside the archive.
    pub archive_entry: String,
    /// Kept edges buffered between writes.
    pub batch_size: usize,
    /// Input lines between progress events.
    pub progress_interval: u64,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            archive_entry: "social_graph.net".to_string(),
            batch_size: 100_000,
            progress_interval: 10_000,
        }
    }
}

/// Counters describing one completed projection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionSummary {
    /// Total lines consumed from the edge stream.
    pub lines_read: u64,
    /// Edges kept; equals the number of output lines written.
    pub edges_kept: u64,
    /// Edges dropped because at least one endpoint was unknown.
    pub edges_thrown: u64,
    /// Non-empty lines that did not parse as an edge.
    pub parse_failures: u64,
    /// Full batches written (the final partial flush is not counted).
    pub batches_flushed: u64,
}

/// Streaming projector from an edge archive to a filtered gzip edge list.
pub struct EdgeProjector {
    config: ProjectorConfig,
    pattern: Regex,
}

impl EdgeProjector {
    /// Create a projector with the given configuration.
    pub fn new(mut config: ProjectorConfig) -> Self {
        config.batch_size = config.batch_size.max(1);
        config.progress_interval = config.progress_interval.max(1);
        Self {
            config,
            pattern: Regex::new(EDGE_LINE_PATTERN).expect("static pattern"),
        }
    }

    /// Create a projector with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ProjectorConfig::default())
    }

    /// Project the archive's edge list onto the membership set loaded from
    /// `membership`, writing kept edges to a gzip stream at `output`
    /// (overwriting any prior content).
    pub fn project(
        &self,
        archive: &Path,
        membership: &Path,
        output: &Path,
        report: &mut RunReport,
    ) -> Result<ProjectionSummary, ProjectionError> {
        let (set, stats) = MembershipSet::load_gzip(membership, report)?;
        info!(
            users = set.len(),
            lines_read = stats.lines_read,
            nonmatching = stats.nonmatching_lines,
            "membership set loaded"
        );
        report.line(&format!(
            "membership set loaded: {} users from {} lines",
            set.len(),
            stats.lines_read
        ));

        let archive_file = File::open(archive).map_err(|source| ProjectionError::OpenArchive {
            path: archive.display().to_string(),
            source,
        })?;
        let mut container =
            ZipArchive::new(BufReader::new(archive_file)).map_err(|source| {
                ProjectionError::BadArchive {
                    path: archive.display().to_string(),
                    source,
                }
            })?;
        let entry = container
            .by_name(&self.config.archive_entry)
            .map_err(|source| ProjectionError::MissingEntry {
                path: archive.display().to_string(),
                entry: self.config.archive_entry.clone(),
                source,
            })?;

        let out_file = File::create(output).map_err(|source| ProjectionError::CreateOutput {
            path: output.display().to_string(),
            source,
        })?;
        let mut encoder = GzEncoder::new(out_file, Compression::default());

        let summary = self.project_stream(BufReader::new(entry), &set, &mut encoder, report)?;
        encoder.finish()?;

        info!(
            lines_read = summary.lines_read,
            edges_kept = summary.edges_kept,
            edges_thrown = summary.edges_thrown,
            parse_failures = summary.parse_failures,
            "projection pass complete"
        );
        report.line(&format!(
            "projection complete: {} kept, {} thrown, {} unparsable of {} lines",
            summary.edges_kept, summary.edges_thrown, summary.parse_failures, summary.lines_read
        ));
        Ok(summary)
    }

    /// Core filtering loop over any line-oriented edge stream.
    pub fn project_stream<R: BufRead, W: Write>(
        &self,
        edges: R,
        set: &MembershipSet,
        mut out: W,
        report: &mut RunReport,
    ) -> Result<ProjectionSummary, ProjectionError> {
        let mut summary = ProjectionSummary::default();
        let mut batch: Vec<String> = Vec::with_capacity(self.config.batch_size);

        for line in edges.lines() {
            let line = line?;
            summary.lines_read += 1;
            if !line.is_empty() {
                match self.parse_edge(&line) {
                    Some(edge) => {
                        if set.contains(edge.source) && set.contains(edge.target) {
                            batch.push(edge.to_string());
                            if batch.len() == self.config.batch_size {
                                flush_batch(&mut batch, &mut out)?;
                                summary.edges_kept += self.config.batch_size as u64;
                                summary.batches_flushed += 1;
                            }
                        } else {
                            summary.edges_thrown += 1;
                        }
                    }
                    None => summary.parse_failures += 1,
                }
            }
            if summary.lines_read % self.config.progress_interval == 0 {
                debug!(
                    lines_read = summary.lines_read,
                    edges_kept = summary.edges_kept,
                    edges_thrown = summary.edges_thrown,
                    "projecting edge list"
                );
                report.line(&format!(
                    "{} lines read | {} kept | {} thrown",
                    summary.lines_read, summary.edges_kept, summary.edges_thrown
                ));
            }
        }

        if !batch.is_empty() {
            summary.edges_kept += batch.len() as u64;
            flush_batch(&mut batch, &mut out)?;
        }
        out.flush()?;
        Ok(summary)
    }

    fn parse_edge(&self, line: &str) -> Option<Edge> {
        let caps = self.pattern.captures(line)?;
        let source: u64 = caps[1].parse().ok()?;
        let target: u64 = caps[2].parse().ok()?;
        Some(Edge::new(UserId::new(source), UserId::new(target)))
    }
}

/// Join the batch into one block, write it in a single call, clear the
/// batch. The batch allocation is retained across flushes.
fn flush_batch<W: Write>(batch: &mut Vec<String>, out: &mut W) -> std::io::Result<()> {
    let mut block = batch.join("\n");
    block.push('\n');
    out.write_all(block.as_bytes())?;
    batch.clear();
    Ok(())
}
