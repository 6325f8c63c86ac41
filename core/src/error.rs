//! Error taxonomy surfaced by the public scheduler API.

use thiserror::Error;

/// Errors raised by [`crate::scheduler::Scheduler`] operations.
///
/// All variants are caller-facing: a `Result::Err` always leaves the
/// scheduler's observable state untouched (strong exception safety).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("bad task: {0}")]
    BadTask(String),

    #[error("task '{0}' is already registered")]
    DuplicateName(String),

    #[error("task '{0}' not found")]
    NotFound(String),

    #[error("self loop on task '{0}' is not allowed")]
    SelfLoop(String),

    #[error("adding edge would close a cycle: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("bad gate id '{id}' for kind '{kind}': {reason}")]
    BadGateId {
        kind: String,
        id: String,
        reason: String,
    },

    #[error("unknown gate kind '{0}'")]
    UnknownGateKind(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
