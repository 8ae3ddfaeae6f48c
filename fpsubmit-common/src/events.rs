//! Event types for the fpsubmit event system
//!
//! The orchestrator is the only producer. Consumers (CLI renderer, tests)
//! subscribe through [`EventBus`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Run lifecycle state as displayed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, not started
    Idle,
    /// File list is being built
    DiscoveringFiles,
    /// Files are being analyzed (submissions may run alongside)
    Fingerprinting,
    /// Analysis is done, remaining records are being submitted
    Submitting,
    /// No new jobs or submissions start until resumed
    Paused,
    /// Cancel requested, waiting for in-flight work to settle
    Cancelled,
    /// Terminal
    Finished,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "Idle",
            RunState::DiscoveringFiles => "Discovering files",
            RunState::Fingerprinting => "Fingerprinting",
            RunState::Submitting => "Submitting",
            RunState::Paused => "Paused",
            RunState::Cancelled => "Cancelled",
            RunState::Finished => "Finished",
        };
        f.write_str(s)
    }
}

/// fpsubmit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SubmitEvent {
    /// Displayed run state changed
    StateChanged {
        old_state: RunState,
        new_state: RunState,
    },

    /// File discovery began
    DiscoveryStarted { directories: Vec<PathBuf> },

    /// Directory being scanned, or file handed to an analysis job
    CurrentPathChanged { path: PathBuf },

    /// Discovery produced a non-empty file list
    AnalysisStarted { file_count: usize },

    /// One more file finished analysis (success or failure)
    Progress { analyzed: usize, total: usize },

    /// Analysis failed for one file; the file is skipped
    FileFailed { path: PathBuf, reason: String },

    /// A batch was handed to the transport
    SubmissionStarted { batch_size: usize },

    /// A batch was accepted by the server
    BatchSubmitted {
        batch_size: usize,
        submitted_total: usize,
    },

    /// Server rejected a batch for a reason other than authentication
    SubmissionRejected { message: String },

    /// Transport failure; the run stops submitting
    NetworkError { message: String },

    /// API key rejected; the run stops submitting
    AuthenticationError,

    /// Discovery found nothing to do
    NoFilesError,

    /// Run reached its terminal state
    Finished {
        submitted: usize,
        analyzed: usize,
        elapsed_seconds: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SubmitEvent {
    /// Short event name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            SubmitEvent::StateChanged { .. } => "StateChanged",
            SubmitEvent::DiscoveryStarted { .. } => "DiscoveryStarted",
            SubmitEvent::CurrentPathChanged { .. } => "CurrentPathChanged",
            SubmitEvent::AnalysisStarted { .. } => "AnalysisStarted",
            SubmitEvent::Progress { .. } => "Progress",
            SubmitEvent::FileFailed { .. } => "FileFailed",
            SubmitEvent::SubmissionStarted { .. } => "SubmissionStarted",
            SubmitEvent::BatchSubmitted { .. } => "BatchSubmitted",
            SubmitEvent::SubmissionRejected { .. } => "SubmissionRejected",
            SubmitEvent::NetworkError { .. } => "NetworkError",
            SubmitEvent::AuthenticationError => "AuthenticationError",
            SubmitEvent::NoFilesError => "NoFilesError",
            SubmitEvent::Finished { .. } => "Finished",
        }
    }
}

/// Broadcast bus for [`SubmitEvent`]s
///
/// Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SubmitEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SubmitEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SubmitEvent,
    ) -> Result<usize, broadcast::error::SendError<SubmitEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SubmitEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
