//! Error types for watcher construction.

use std::path::PathBuf;
use thiserror::Error;

/// Which side of a rule's filter a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Include,
    Exclude,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::Include => f.write_str("include"),
            PatternKind::Exclude => f.write_str("exclude"),
        }
    }
}

/// Errors from watcher operations.
///
/// Every variant is fatal to the `start` request that produced it: no
/// watcher is registered when construction fails.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid {kind} pattern '{pattern}': {reason}")]
    InvalidPattern {
        kind: PatternKind,
        pattern: String,
        reason: String,
    },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
