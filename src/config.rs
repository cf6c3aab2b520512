//! Configuration file lookup and argument resolution.
//!
//! Invocation parameters may be supplied explicitly or fall back to an
//! optional JSON configuration file. A parameter that is neither supplied
//! nor configured is a startup error, raised before any phase runs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::phase::InvalidPhaseToken;
use crate::session::SessionArgs;

/// Conventional configuration file name, looked up in the working
/// directory unless overridden.
pub const DEFAULT_CONFIG_FILE: &str = "graphweld.json";

/// Errors from configuration handling. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON for this schema.
    #[error("config file {path} is not a valid configuration: {source}")]
    Parse {
        /// Path of the offending file.
        path: String,
        /// Underlying decode error.
        source: serde_json::Error,
    },
    /// A required parameter was neither supplied nor configured.
    #[error("required parameter {name} was neither supplied nor found in configuration")]
    MissingParameter {
        /// Parameter name as the operator supplies it.
        name: &'static str,
    },
    /// A requested phase token did not parse.
    #[error(transparent)]
    BadPhaseToken(#[from] InvalidPhaseToken),
}

/// Optional values from the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Default microblog export directory.
    #[serde(default)]
    pub microblog_dpath: Option<PathBuf>,
    /// Default crawl directory.
    #[serde(default)]
    pub crawl_dpath: Option<PathBuf>,
    /// Default output directory.
    #[serde(default)]
    pub output_dpath: Option<PathBuf>,
}

impl FileConfig {
    /// Load the configuration file at `path`. A missing file is not an
    /// error; it reads as an empty configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let body = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&body).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl SessionArgs {
    /// Resolve invocation arguments: an explicitly supplied value wins,
    /// then the configuration file, and a value found in neither is fatal.
    pub fn resolve(
        microblog: Option<PathBuf>,
        crawl: Option<PathBuf>,
        output: Option<PathBuf>,
        config: &FileConfig,
    ) -> Result<Self, ConfigError> {
        let pick = |explicit: Option<PathBuf>,
                    configured: &Option<PathBuf>,
                    name: &'static str| {
            explicit
                .or_else(|| configured.clone())
                .ok_or(ConfigError::MissingParameter { name })
        };
        Ok(Self {
            microblog_dpath: pick(microblog, &config.microblog_dpath, "--microblog")?,
            crawl_dpath: pick(crawl, &config.crawl_dpath, "--crawl")?,
            output_dpath: pick(output, &config.output_dpath, "--output")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_value_wins_over_config() {
        let config = FileConfig {
            microblog_dpath: Some(PathBuf::from("/cfg/microblog")),
            crawl_dpath: Some(PathBuf::from("/cfg/crawl")),
            output_dpath: Some(PathBuf::from("/cfg/out")),
        };
        let args = SessionArgs::resolve(
            Some(PathBuf::from("/cli/microblog")),
            None,
            None,
            &config,
        )
        .unwrap();
        assert_eq!(args.microblog_dpath, PathBuf::from("/cli/microblog"));
        assert_eq!(args.crawl_dpath, PathBuf::from("/cfg/crawl"));
        assert_eq!(args.output_dpath, PathBuf::from("/cfg/out"));
    }

    #[test]
    fn test_missing_parameter_is_fatal() {
        let err = SessionArgs::resolve(
            Some(PathBuf::from("/cli/microblog")),
            Some(PathBuf::from("/cli/crawl")),
            None,
            &FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingParameter { name: "--output" }
        ));
    }

    #[test]
    fn test_missing_config_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphweld.json");
        std::fs::write(
            &path,
            r#"{"crawl_dpath": "/data/crawl", "output_dpath": "/data/out"}"#,
        )
        .unwrap();

        let config = FileConfig::load(&path).unwrap();
        assert_eq!(config.microblog_dpath, None);
        assert_eq!(config.crawl_dpath, Some(PathBuf::from("/data/crawl")));
    }

    #[test]
    fn test_malformed_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graphweld.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
