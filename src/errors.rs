// src/errors.rs

//! Crate-wide error aliases and helpers.
//!
//! Two families live here:
//! - [`NacRunnerError`]: ordinary fallible APIs (config, archive, HTTP).
//! - [`ExecutionFailure`]: the typed "execution failed" outcome of a single
//!   job. The supervisor returns it; it never escapes as a panic or aborts
//!   the rest of a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::exec::StreamSummary;

#[derive(Error, Debug)]
pub enum NacRunnerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for NacRunnerError {
    fn from(e: reqwest::Error) -> Self {
        NacRunnerError::HttpError(e.to_string())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, NacRunnerError>;

/// Why a job is reported as an execution failure rather than a test result.
///
/// Exit code 1 (content failures) is *not* represented here; the runner
/// finished and its archive is trusted.
#[derive(Error, Debug)]
pub enum ExecutionFailure {
    #[error("failed to prepare working directory {path:?}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn runner '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("runner exited with code {code}")]
    ExitCode { code: i32, stream: StreamSummary },

    #[error("runner terminated by signal")]
    Signal { stream: StreamSummary },

    #[error("job cancelled")]
    Cancelled,

    #[error("IO error while supervising runner: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionFailure {
    /// Numeric exit code of the runner, when it got far enough to have one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecutionFailure::ExitCode { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Stream statistics for failures that happened after the stream was read.
    pub fn stream(&self) -> Option<&StreamSummary> {
        match self {
            ExecutionFailure::ExitCode { stream, .. } | ExecutionFailure::Signal { stream } => {
                Some(stream)
            }
            _ => None,
        }
    }
}
