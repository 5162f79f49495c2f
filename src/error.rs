use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Why a detection pass produced nothing. Providers log these and fall back
/// to an empty task list; none of them reach the host.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit {
        program: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },

    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    /// The tool ran but its stdout was not a task list. Stderr was already
    /// reported with the successful run, so only stdout is kept.
    #[error("failed to decode task list: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        stdout: String,
    },
}

impl DetectError {
    /// Output captured before the failure as `(stdout, stderr)`, if any.
    pub fn captured(&self) -> Option<(&str, &str)> {
        match self {
            DetectError::Exit { stdout, stderr, .. } => Some((stdout.as_str(), stderr.as_str())),
            DetectError::Decode { stdout, .. } => Some((stdout.as_str(), "")),
            DetectError::Spawn { .. } | DetectError::Timeout { .. } => None,
        }
    }

    /// Short label for the diagnostic log.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::Spawn { .. } | DetectError::Exit { .. } => "invocation",
            DetectError::Timeout { .. } => "timeout",
            DetectError::Decode { .. } => "decode",
        }
    }
}
