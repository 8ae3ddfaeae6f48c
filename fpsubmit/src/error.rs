//! Error types for the run orchestrator
//!
//! Component errors (scan, analysis, transport, log) live next to their
//! components; this type only covers failures of the run itself.

use thiserror::Error;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

/// Run-level error
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `start` called on a run that already left Idle
    #[error("Run already started")]
    AlreadyStarted,

    /// Configuration limits under which the run could never be scheduled
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Control task is gone (run finished or crashed)
    #[error("Control channel closed")]
    ControlChannelClosed,

    /// Control task panicked or was aborted
    #[error("Control task failed: {0}")]
    TaskFailed(String),
}
