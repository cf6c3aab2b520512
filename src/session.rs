//! Resumable run state.
//!
//! A [`Session`] records one pipeline invocation: when it started, the
//! invocation arguments, which phases were requested, and the last
//! completed phase or subphase. Persisting it after every completed phase
//! is what lets an interrupted multi-hour run resume without repeating
//! finished work. Resumption granularity is whole phases: there is no
//! checkpoint inside a phase.
//!
//! On restore, every invocation argument comes from the persisted state,
//! so a resumed run is byte-identical in configuration to the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::phase::{PhaseRequest, PhaseToken};
use crate::SESSION_SCHEMA_VERSION;

/// Errors from session persistence.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session file is absent or unreadable.
    #[error("failed to read session file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The session file content is not valid session state.
    #[error("session file {path} does not hold valid session state: {source}")]
    Deserialize {
        /// Path of the offending file.
        path: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
    /// The session file was produced by an incompatible version.
    #[error("session file {path} has schema version {found}, expected {expected}")]
    VersionMismatch {
        /// Path of the offending file.
        path: String,
        /// Version found in the file.
        found: String,
        /// Version this build expects.
        expected: String,
    },
    /// The session state failed to serialize.
    #[error("failed to serialize session state: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The session file could not be written.
    #[error("failed to write session file {path}: {source}")]
    Write {
        /// Path that failed to write.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Invocation parameters for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArgs {
    /// Directory of the microblog export.
    pub microblog_dpath: PathBuf,
    /// Directory of the network crawl.
    pub crawl_dpath: PathBuf,
    /// Directory receiving all phase output and the final dataset.
    pub output_dpath: PathBuf,
}

/// Persistent record of one pipeline invocation and its progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Schema version of this state; load rejects other versions.
    pub schema_version: String,
    /// When the original invocation started.
    pub started_at: DateTime<Utc>,
    /// Invocation arguments, taken verbatim on restore.
    pub args: SessionArgs,
    /// The phases requested by the original invocation.
    pub requested: PhaseRequest,
    /// Marker of the last completed phase or subphase, if any.
    pub last_completed: Option<PhaseToken>,
}

impl Session {
    /// Create a fresh session with no completed work.
    pub fn new(args: SessionArgs, requested: PhaseRequest) -> Self {
        Self {
            schema_version: SESSION_SCHEMA_VERSION.to_string(),
            started_at: Utc::now(),
            args,
            requested,
            last_completed: None,
        }
    }

    /// Conventional session file location for an output directory.
    pub fn file_path(output_dpath: &Path) -> PathBuf {
        output_dpath.join("session.json")
    }

    /// Whether `token` is covered by the completed marker.
    ///
    /// Ordinal comparison on (phase, subphase); a completed bare phase
    /// covers all of its own subphases.
    pub fn is_completed(&self, token: PhaseToken) -> bool {
        self.last_completed.is_some_and(|marker| token <= marker)
    }

    /// Advance the completed marker. The marker is monotonic: marking a
    /// token below the current marker leaves it unchanged.
    pub fn mark_completed(&mut self, token: PhaseToken) {
        match self.last_completed {
            Some(marker) if marker >= token => {}
            _ => self.last_completed = Some(token),
        }
    }

    /// Serialize the full session state to `path`.
    ///
    /// Writes to a sibling temp file and renames it into place, so a
    /// reader never observes partially written state.
    pub fn persist(&self, path: &Path) -> Result<(), SessionError> {
        let body = serde_json::to_vec_pretty(self).map_err(SessionError::Serialize)?;
        let tmp_path = path.with_extension("json.tmp");
        let write_err = |source| SessionError::Write {
            path: path.display().to_string(),
            source,
        };
        fs::write(&tmp_path, body).map_err(write_err)?;
        fs::rename(&tmp_path, path).map_err(write_err)?;
        Ok(())
    }

    /// Load a previously persisted session.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let body = fs::read_to_string(path).map_err(|source| SessionError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let session: Session =
            serde_json::from_str(&body).map_err(|source| SessionError::Deserialize {
                path: path.display().to_string(),
                source,
            })?;
        if session.schema_version != SESSION_SCHEMA_VERSION {
            return Err(SessionError::VersionMismatch {
                path: path.display().to_string(),
                found: session.schema_version,
                expected: SESSION_SCHEMA_VERSION.to_string(),
            });
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseRequest;

    fn make_args() -> SessionArgs {
        SessionArgs {
            microblog_dpath: PathBuf::from("/data/microblog"),
            crawl_dpath: PathBuf::from("/data/crawl"),
            output_dpath: PathBuf::from("/data/out"),
        }
    }

    fn make_session() -> Session {
        Session::new(
            make_args(),
            PhaseRequest::parse(&["2", "3.1", "6"]).unwrap(),
        )
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut session = make_session();
        session.mark_completed(PhaseToken::parse("3.1").unwrap());
        session.persist(&path).unwrap();

        let restored = Session::load(&path).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SessionError::Read { .. }));
    }

    #[test]
    fn test_load_truncated_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{"schema_version": "1.0.0", "#).unwrap();
        let err = Session::load(&path).unwrap_err();
        assert!(matches!(err, SessionError::Deserialize { .. }));
    }

    #[test]
    fn test_load_rejects_other_schema_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut session = make_session();
        session.schema_version = "0.0.1".to_string();
        session.persist(&path).unwrap();

        let err = Session::load(&path).unwrap_err();
        assert!(matches!(err, SessionError::VersionMismatch { .. }));
    }

    #[test]
    fn test_persist_overwrites_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut session = make_session();
        session.persist(&path).unwrap();
        session.mark_completed(PhaseToken::parse("2").unwrap());
        session.persist(&path).unwrap();

        let restored = Session::load(&path).unwrap();
        assert_eq!(restored.last_completed, PhaseToken::parse("2"));
    }

    #[test]
    fn test_completed_marker_is_monotonic() {
        let mut session = make_session();
        session.mark_completed(PhaseToken::parse("4").unwrap());
        session.mark_completed(PhaseToken::parse("2").unwrap());
        assert_eq!(session.last_completed, PhaseToken::parse("4"));
    }

    #[test]
    fn test_skip_rule_ordering() {
        let mut session = make_session();
        session.mark_completed(PhaseToken::parse("4").unwrap());

        for done in ["1", "2", "3", "4", "3.1", "4.2"] {
            assert!(session.is_completed(PhaseToken::parse(done).unwrap()), "{done}");
        }
        for pending in ["5", "5.1", "6", "7"] {
            assert!(!session.is_completed(PhaseToken::parse(pending).unwrap()), "{pending}");
        }
    }

    #[test]
    fn test_fresh_session_has_nothing_completed() {
        let session = make_session();
        assert!(!session.is_completed(PhaseToken::parse("1").unwrap()));
    }
}
