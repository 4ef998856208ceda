//! Error types shared by every Planet crate.

use std::path::PathBuf;
use uuid::Uuid;

/// Result type for Planet operations
pub type Result<T> = std::result::Result<T, PlanetError>;

/// Errors that can occur while authoring, publishing or following planets
#[derive(Debug, thiserror::Error)]
pub enum PlanetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record on disk is malformed or does not match the identity it is
    /// filed under.
    #[error("Persistence error at {path:?}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    /// A daemon subprocess exited with a non-zero status.
    #[error("Command `{command}` failed with status {status}: {stderr}")]
    Process {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Repository migration finished with {errors} error(s)")]
    Migration { errors: usize },

    /// A publish, update or commit is already running for this planet.
    #[error("Planet {0} is busy with another operation")]
    Busy(Uuid),

    /// An attachment step failed mid-commit. Steps applied before it are not
    /// rolled back and the draft is kept for another attempt.
    #[error("Commit stopped at attachment '{attachment}': {source}")]
    PartialCommit {
        attachment: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    Invalid(String),

    /// Transport or protocol failure talking to the daemon.
    #[error("Node error: {0}")]
    Node(String),
}

impl PlanetError {
    pub fn persistence(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is the non-queueing rejection of a concurrent request.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}
