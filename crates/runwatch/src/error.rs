//! Error types for runwatch

use runwatch_domain::{RunId, SnapshotError};
use thiserror::Error;

/// Errors raised while fetching, recording or replaying run status.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Network, authentication or HTTP failure talking to the provider.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with JSON that does not fit the status schema.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(#[from] SnapshotError),

    /// Capture file recorded for a different run than the one requested.
    #[error("capture mismatch: expected run {expected}, capture holds run {found}")]
    CaptureMismatch { expected: RunId, found: RunId },

    /// Every recorded snapshot was consumed without the run completing.
    #[error("replay exhausted after {consumed} snapshots without a completed run")]
    ReplayExhausted { consumed: usize },

    /// Capture file could not be understood.
    #[error("invalid capture file: {0}")]
    InvalidCapture(String),

    /// No run matched the requested commit.
    #[error("no workflow run found for commit {0}")]
    RunNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    /// Whether the poll loop may try the same fetch again.
    ///
    /// Transport failures and malformed snapshots are transient; everything
    /// else points at a bad fixture, misuse or configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WatchError::Transport(_) | WatchError::MalformedSnapshot(_)
        )
    }
}

impl From<reqwest::Error> for WatchError {
    fn from(err: reqwest::Error) -> Self {
        WatchError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
