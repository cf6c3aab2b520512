//! Run report output.
//!
//! Each phase (and the pipeline itself) writes operator-facing progress to
//! an explicit report handle with an open-at-start, close-at-end lifecycle.
//! The handle is passed down through the orchestrator rather than living in
//! process-global state, and closing it leaves a timestamped copy of the
//! report next to the original so successive runs do not clobber history.
//!
//! Report output is a side effect only: write failures degrade to a
//! warning and disable further report output, they never fail a run.

use chrono::Local;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only report file for one phase or run.
pub struct RunReport {
    sink: Option<ReportSink>,
}

struct ReportSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunReport {
    /// Open a report file at `path`, truncating any prior content.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            sink: Some(ReportSink {
                path: path.to_path_buf(),
                writer: BufWriter::new(file),
            }),
        })
    }

    /// A report handle that discards everything. For library callers and
    /// tests that do not want a report file.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Append one line to the report.
    pub fn line(&mut self, text: &str) {
        let failed = match &mut self.sink {
            Some(sink) => writeln!(sink.writer, "{text}").is_err(),
            None => false,
        };
        if failed {
            warn!("report file write failed; disabling report output");
            self.sink = None;
        }
    }

    /// Flush the report and leave a timestamped copy beside it.
    pub fn close(mut self) -> std::io::Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.writer.flush()?;
            drop(sink.writer);
            std::fs::copy(&sink.path, timestamped_copy_path(&sink.path))?;
        }
        Ok(())
    }
}

fn timestamped_copy_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    path.with_file_name(format!("{stem}_{stamp}.txt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lines_and_timestamped_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phase_report.txt");

        let mut report = RunReport::open(&path).unwrap();
        report.line("first");
        report.line("second");
        report.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");

        let copies: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy().into_owned();
                name.starts_with("phase_report_") && name.ends_with(".txt")
            })
            .collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(
            std::fs::read_to_string(copies[0].path()).unwrap(),
            "first\nsecond\n"
        );
    }

    #[test]
    fn test_disabled_report_is_a_no_op() {
        let mut report = RunReport::disabled();
        report.line("goes nowhere");
        report.close().unwrap();
    }
}
