//! Run session: lifecycle phase, flags and counters
//!
//! The session stores the *phase* the run is in. Observers see a derived
//! state that layers the finished/cancelled/paused flags on top of it, see
//! [`RunSession::displayed_state`].

use chrono::{DateTime, Utc};
use fpsubmit_common::events::RunState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: RunState,
    pub new_state: RunState,
    pub transitioned_at: DateTime<Utc>,
}

/// Why a run stopped submitting before its queues drained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HaltReason {
    Authentication,
    Network(String),
}

/// How a finished run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every discovered file was analyzed and every record resolved
    Completed,
    /// Discovery produced nothing
    NoFiles,
    Cancelled,
    AuthenticationFailed,
    NetworkFailed(String),
}

/// End-of-run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub total_files: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub submitted: usize,
    /// Records lost to non-authentication rejections
    pub rejected: usize,
    pub elapsed_seconds: u64,
}

/// In-memory run state owned by the control task
#[derive(Debug, Clone)]
pub struct RunSession {
    pub run_id: Uuid,
    /// One of Idle, DiscoveringFiles, Fingerprinting, Finished
    pub phase: RunState,
    pub paused: bool,
    pub cancelled: bool,
    pub halted: Option<HaltReason>,
    /// Files handed over by discovery
    pub total_files: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub submitted: usize,
    pub rejected: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl RunSession {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: RunState::Idle,
            paused: false,
            cancelled: false,
            halted: None,
            total_files: 0,
            analyzed: 0,
            failed: 0,
            submitted: 0,
            rejected: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to a new phase
    pub fn transition_to(&mut self, new_state: RunState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.phase,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.phase = new_state;

        if new_state == RunState::Finished {
            self.ended_at = Some(Utc::now());
        }

        transition
    }

    pub fn is_finished(&self) -> bool {
        self.phase == RunState::Finished
    }

    /// New jobs and submissions may start
    pub fn is_running(&self) -> bool {
        !self.paused && !self.cancelled && self.halted.is_none() && !self.is_finished()
    }

    /// State shown to observers
    ///
    /// `analysis_idle` is true when no file is pending or being analyzed; a
    /// Fingerprinting run in that situation is only submitting.
    pub fn displayed_state(&self, analysis_idle: bool) -> RunState {
        if self.is_finished() {
            RunState::Finished
        } else if self.cancelled {
            RunState::Cancelled
        } else if self.paused {
            RunState::Paused
        } else if self.phase == RunState::Fingerprinting && analysis_idle {
            RunState::Submitting
        } else {
            self.phase
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0) as u64
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.cancelled {
            RunOutcome::Cancelled
        } else if let Some(reason) = &self.halted {
            match reason {
                HaltReason::Authentication => RunOutcome::AuthenticationFailed,
                HaltReason::Network(msg) => RunOutcome::NetworkFailed(msg.clone()),
            }
        } else if self.total_files == 0 {
            RunOutcome::NoFiles
        } else {
            RunOutcome::Completed
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            outcome: self.outcome(),
            total_files: self.total_files,
            analyzed: self.analyzed,
            failed: self.failed,
            submitted: self.submitted,
            rejected: self.rejected,
            elapsed_seconds: self.elapsed_seconds(),
        }
    }
}

impl Default for RunSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_displayed_state_precedence() {
        let mut session = RunSession::new();
        session.transition_to(RunState::Fingerprinting);
        assert_eq!(session.displayed_state(false), RunState::Fingerprinting);
        assert_eq!(session.displayed_state(true), RunState::Submitting);

        session.paused = true;
        assert_eq!(session.displayed_state(false), RunState::Paused);

        session.cancelled = true;
        assert_eq!(session.displayed_state(false), RunState::Cancelled);

        session.transition_to(RunState::Finished);
        assert_eq!(session.displayed_state(false), RunState::Finished);
    }

    #[test]
    fn test_running_predicate() {
        let mut session = RunSession::new();
        assert!(session.is_running());

        session.halted = Some(HaltReason::Authentication);
        assert!(!session.is_running());
        assert_eq!(session.outcome(), RunOutcome::AuthenticationFailed);
    }

    #[test]
    fn test_finish_sets_end_time() {
        let mut session = RunSession::new();
        let transition = session.transition_to(RunState::Finished);
        assert_eq!(transition.old_state, RunState::Idle);
        assert!(session.ended_at.is_some());
        assert_eq!(session.outcome(), RunOutcome::NoFiles);
    }
}
