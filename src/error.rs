//! Typed failure kinds.
//!
//! Per-job errors (`AnalysisError`) are always recovered at the worker
//! boundary. `ConfigError` is fatal before any job runs. `QueueError::Closed`
//! is how a clean shutdown is observed, not a failure.

use thiserror::Error;

/// Failure while analyzing a single job.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The database package or query pack could not be unpacked.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Database or query metadata was missing or malformed.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// The query tool could not be launched or exited unsuccessfully.
    #[error("`{command}` failed: {reason}\nOutput: {output}")]
    Execution {
        command: String,
        reason: String,
        output: String,
    },

    /// The result archive could not be produced.
    #[error("packaging failed: {0}")]
    Packaging(String),

    /// The archive or query pack store rejected the request.
    #[error("storage error: {0}")]
    Storage(String),

    /// The job was aborted by a cancellation signal.
    #[error("analysis cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn execution(command: &[String], reason: impl Into<String>, output: &[u8]) -> Self {
        Self::Execution {
            command: command.join(" "),
            reason: reason.into(),
            output: String::from_utf8_lossy(output).trim_end().to_string(),
        }
    }
}

/// Startup configuration failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("CODEQL_CLI_PATH is not set and no engine path is configured")]
    EngineLocationUnset,

    #[error("engine not found at {0}")]
    EngineNotFound(String),

    #[error("unsupported mode '{0}' (this build provides: standalone)")]
    UnsupportedMode(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Queue hand-off failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue is full")]
    Full,
}

/// A session's repository sets do not partition its repository list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("repository {0} has no eligibility outcome")]
    Unclassified(String),

    #[error("repository {0} was classified but is not part of the session")]
    UnknownRepository(String),

    #[error("repository {0} appears more than once")]
    Duplicate(String),
}

/// Rejected status write.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("no status recorded for {0}")]
    Unknown(String),

    #[error("{repo}: illegal transition {from} -> {to}")]
    IllegalTransition {
        repo: String,
        from: crate::models::Status,
        to: crate::models::Status,
    },
}
