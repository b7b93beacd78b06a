//! Error surface for a single discovery cycle.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Everything that can go wrong between fetching a payload and acting on it.
///
/// All variants are recoverable from the poll loop's point of view: the
/// cycle is logged and dropped, and the next tick proceeds. Script failures
/// are the exception when fail-fast mode is enabled, see
/// [`ConfdError::is_script_failure`].
#[derive(Debug, Error)]
pub enum ConfdError {
    #[error("discovery request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode discovery payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid discovery payload: {0}")]
    Validation(String),

    #[error("template I/O error at {path}: {source}")]
    TemplateIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notification script {path} does not exist")]
    ScriptMissing {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("failed to run notification script {path}: {source}")]
    ScriptSpawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notification script {path} exited with {status}: {output}")]
    ScriptExecution {
        path: PathBuf,
        status: ExitStatus,
        output: String,
    },
}

impl ConfdError {
    /// True for failures of the script itself, as opposed to a missing script.
    pub fn is_script_failure(&self) -> bool {
        matches!(
            self,
            ConfdError::ScriptSpawn { .. } | ConfdError::ScriptExecution { .. }
        )
    }
}

pub(crate) fn template_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfdError {
    ConfdError::TemplateIo {
        path: path.into(),
        source,
    }
}
