//! Synchronous run state machine
//!
//! [`RunCore`] owns every queue and counter of a run. Each method consumes
//! one input (a user command or a completion) and returns the [`Effect`]s the
//! async driver has to carry out. No I/O happens here, which keeps the
//! scheduling rules testable without timing.
//!
//! Invariants maintained after every call:
//! - at most `max_active_files` paths are being analyzed
//! - at most one submission is in flight
//! - a record is either queued, in flight, or gone; never two at once

use super::batch::{encode_batch, BatchPolicy, SubmissionPayload};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{AnalyzedRecord, HaltReason, RunSession, RunSummary};
use crate::types::{AnalysisError, RejectionKind, ScanError, SubmitOutcome};
use fpsubmit_common::events::{RunState, SubmitEvent};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Default number of files analyzed concurrently
pub const DEFAULT_MAX_ACTIVE_FILES: usize = 3;

/// Client key registered for this application
pub const DEFAULT_CLIENT_KEY: &str = "cvJ31mD0";

/// Scheduling and payload parameters of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_active_files: usize,
    pub batch: BatchPolicy,
    pub api_key: String,
    pub client_key: String,
}

impl OrchestratorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            max_active_files: DEFAULT_MAX_ACTIVE_FILES,
            batch: BatchPolicy::default(),
            api_key: api_key.into(),
            client_key: DEFAULT_CLIENT_KEY.to_string(),
        }
    }

    /// Reject limits under which jobs or submissions could never be scheduled
    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.max_active_files == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_active_files must be at least 1".to_string(),
            ));
        }
        if self.batch.max_batch == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_batch must be at least 1".to_string(),
            ));
        }
        if self.batch.min_batch > self.batch.max_batch {
            return Err(OrchestratorError::InvalidConfig(format!(
                "min_batch ({}) exceeds max_batch ({})",
                self.batch.min_batch, self.batch.max_batch
            )));
        }
        Ok(())
    }
}

/// Work the driver performs on behalf of the core
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run file discovery for these roots
    Discover(Vec<PathBuf>),
    /// Start an analysis job
    Analyze(PathBuf),
    /// Hand a batch to the transport
    Submit(SubmissionPayload),
    /// Drop the in-flight submission
    AbortSubmission,
    /// Persist accepted paths
    AppendLog(Vec<PathBuf>),
    Emit(SubmitEvent),
}

/// How the in-flight submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Completed(SubmitOutcome),
    /// Dropped after cancel before the transport answered
    Aborted,
}

/// Run state machine
#[derive(Debug)]
pub struct RunCore {
    config: OrchestratorConfig,
    session: RunSession,
    pending: VecDeque<PathBuf>,
    active: HashSet<PathBuf>,
    queue: VecDeque<AnalyzedRecord>,
    in_flight: Option<Vec<PathBuf>>,
    last_displayed: RunState,
}

impl RunCore {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            session: RunSession::new(),
            pending: VecDeque::new(),
            active: HashSet::new(),
            queue: VecDeque::new(),
            in_flight: None,
            last_displayed: RunState::Idle,
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn state(&self) -> RunState {
        self.session.displayed_state(self.analysis_idle())
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    pub fn summary(&self) -> RunSummary {
        self.session.summary()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Paths of the in-flight submission, if any
    pub fn in_flight(&self) -> Option<&[PathBuf]> {
        self.in_flight.as_deref()
    }

    fn analysis_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Begin discovery; only valid once, from Idle
    pub fn start(&mut self, directories: Vec<PathBuf>) -> OrchestratorResult<Vec<Effect>> {
        if self.session.phase != RunState::Idle || self.session.cancelled {
            return Err(OrchestratorError::AlreadyStarted);
        }
        self.config.validate()?;

        let mut effects = Vec::new();
        self.enter_phase(RunState::DiscoveringFiles);
        info!(run_id = %self.session.run_id, directories = directories.len(), "Starting run");
        effects.push(Effect::Emit(SubmitEvent::DiscoveryStarted {
            directories: directories.clone(),
        }));
        effects.push(Effect::Discover(directories));
        self.sync_state(&mut effects);
        Ok(effects)
    }

    /// Stop starting jobs and submissions; idempotent
    pub fn pause(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.session.is_finished() || self.session.cancelled || self.session.paused {
            return effects;
        }

        self.session.paused = true;
        info!("Run paused");
        self.sync_state(&mut effects);
        effects
    }

    pub fn resume(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.session.paused || self.session.is_finished() {
            return effects;
        }

        self.session.paused = false;
        info!("Run resumed");
        if self.session.is_running() {
            self.fill_jobs(&mut effects);
            let drain = self.analysis_started() && self.analysis_idle();
            self.evaluate_submission(drain, &mut effects);
        }
        self.sync_state(&mut effects);
        effects
    }

    /// Cancel the run; terminal
    ///
    /// Queued work is dropped immediately. The run finishes once running jobs
    /// and the in-flight submission have reported back.
    pub fn cancel(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.session.is_finished() || self.session.cancelled {
            return effects;
        }

        self.session.cancelled = true;
        info!(
            pending = self.pending.len(),
            queued = self.queue.len(),
            active = self.active.len(),
            "Run cancelled"
        );
        self.pending.clear();
        self.queue.clear();
        if self.in_flight.is_some() {
            effects.push(Effect::AbortSubmission);
        }

        if !self.analysis_started() {
            // Discovery result will be ignored
            self.finish(&mut effects);
        } else {
            self.check_completion(&mut effects);
        }
        self.sync_state(&mut effects);
        effects
    }

    // ========================================================================
    // Completions
    // ========================================================================

    /// File discovery finished
    ///
    /// A discovery error counts as an empty result.
    pub fn files_discovered(&mut self, result: Result<Vec<PathBuf>, ScanError>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.session.phase != RunState::DiscoveringFiles {
            debug!("Ignoring file list delivered outside discovery");
            return effects;
        }

        let files = match result {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "File discovery failed");
                Vec::new()
            }
        };

        let mut seen = HashSet::with_capacity(files.len());
        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| seen.insert(path.clone()))
            .collect();

        if files.is_empty() {
            info!("No files to fingerprint");
            effects.push(Effect::Emit(SubmitEvent::NoFilesError));
            self.finish(&mut effects);
            return effects;
        }

        info!(file_count = files.len(), "Analysis started");
        self.session.total_files = files.len();
        self.enter_phase(RunState::Fingerprinting);
        effects.push(Effect::Emit(SubmitEvent::AnalysisStarted {
            file_count: files.len(),
        }));
        self.pending = files.into();
        self.fill_jobs(&mut effects);
        self.sync_state(&mut effects);
        effects
    }

    /// One analysis job reported back
    pub fn job_finished(
        &mut self,
        path: PathBuf,
        result: Result<AnalyzedRecord, AnalysisError>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.active.remove(&path) {
            warn!(path = %path.display(), "Completion for a file that is not being analyzed");
            return effects;
        }

        self.session.analyzed += 1;
        effects.push(Effect::Emit(SubmitEvent::Progress {
            analyzed: self.session.analyzed,
            total: self.session.total_files,
        }));

        if self.session.cancelled || self.session.halted.is_some() {
            debug!(path = %path.display(), "Discarding late analysis result");
        } else {
            match result {
                Ok(record) => {
                    debug!(path = %path.display(), "File analyzed");
                    self.queue.push_back(record);
                    self.evaluate_submission(false, &mut effects);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Analysis failed, skipping file");
                    self.session.failed += 1;
                    effects.push(Effect::Emit(SubmitEvent::FileFailed {
                        path,
                        reason: e.to_string(),
                    }));
                }
            }
        }

        self.fill_jobs(&mut effects);
        self.check_completion(&mut effects);
        self.sync_state(&mut effects);
        effects
    }

    /// The in-flight submission resolved
    pub fn submission_finished(&mut self, result: SubmissionResult) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(paths) = self.in_flight.take() else {
            warn!("Submission result without a submission in flight");
            return effects;
        };
        let batch_size = paths.len();

        match result {
            SubmissionResult::Aborted => {
                debug!(batch_size, "Submission aborted");
            }
            SubmissionResult::Completed(SubmitOutcome::Accepted) => {
                self.session.submitted += batch_size;
                info!(
                    batch_size,
                    submitted_total = self.session.submitted,
                    "Batch submitted"
                );
                effects.push(Effect::AppendLog(paths));
                effects.push(Effect::Emit(SubmitEvent::BatchSubmitted {
                    batch_size,
                    submitted_total: self.session.submitted,
                }));
            }
            SubmissionResult::Completed(SubmitOutcome::Rejected {
                kind: RejectionKind::Authentication,
                message,
            }) => {
                if self.session.cancelled {
                    debug!(%message, "Authentication rejection after cancel");
                } else {
                    warn!(%message, "API key rejected, stopping submissions");
                    effects.push(Effect::Emit(SubmitEvent::AuthenticationError));
                    self.halt(HaltReason::Authentication);
                }
            }
            SubmissionResult::Completed(SubmitOutcome::Rejected {
                kind: RejectionKind::Other,
                message,
            }) => {
                self.session.rejected += batch_size;
                warn!(batch_size, %message, "Batch rejected, records dropped");
                effects.push(Effect::Emit(SubmitEvent::SubmissionRejected { message }));
            }
            SubmissionResult::Completed(SubmitOutcome::TransportError(message)) => {
                if self.session.cancelled {
                    debug!(%message, "Transport error after cancel");
                } else {
                    warn!(%message, "Submission failed, stopping submissions");
                    effects.push(Effect::Emit(SubmitEvent::NetworkError {
                        message: message.clone(),
                    }));
                    self.halt(HaltReason::Network(message));
                }
            }
        }

        let drain = self.analysis_idle();
        self.evaluate_submission(drain, &mut effects);
        self.check_completion(&mut effects);
        self.sync_state(&mut effects);
        effects
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn analysis_started(&self) -> bool {
        matches!(self.session.phase, RunState::Fingerprinting | RunState::Finished)
    }

    /// Start jobs until the active set is full or nothing is pending
    fn fill_jobs(&mut self, effects: &mut Vec<Effect>) {
        while self.session.is_running() && self.active.len() < self.config.max_active_files {
            let Some(path) = self.pending.pop_front() else {
                break;
            };
            self.active.insert(path.clone());
            effects.push(Effect::Emit(SubmitEvent::CurrentPathChanged { path: path.clone() }));
            effects.push(Effect::Analyze(path));
        }
    }

    /// Start a submission if the policy allows one
    fn evaluate_submission(&mut self, drain: bool, effects: &mut Vec<Effect>) {
        if !self.session.is_running() || self.in_flight.is_some() {
            return;
        }

        let size = self.config.batch.batch_size(self.queue.len(), drain);
        if size == 0 {
            return;
        }

        let records: Vec<AnalyzedRecord> = self.queue.drain(..size).collect();
        let payload = encode_batch(&records, &self.config.api_key, &self.config.client_key);
        debug!(batch_size = size, remaining = self.queue.len(), "Submitting batch");
        self.in_flight = Some(payload.paths.clone());
        effects.push(Effect::Emit(SubmitEvent::SubmissionStarted { batch_size: size }));
        effects.push(Effect::Submit(payload));
    }

    /// Finish when all work is resolved, otherwise force a drain submission
    fn check_completion(&mut self, effects: &mut Vec<Effect>) {
        if self.session.is_finished()
            || self.session.phase != RunState::Fingerprinting
            || !self.analysis_idle()
            || self.in_flight.is_some()
        {
            return;
        }

        if self.queue.is_empty() {
            self.finish(effects);
        } else {
            self.evaluate_submission(true, effects);
        }
    }

    fn enter_phase(&mut self, phase: RunState) {
        let transition = self.session.transition_to(phase);
        debug!(
            run_id = %transition.run_id,
            from = %transition.old_state,
            to = %transition.new_state,
            "Phase transition"
        );
    }

    fn halt(&mut self, reason: HaltReason) {
        self.session.halted = Some(reason);
        self.pending.clear();
        self.queue.clear();
    }

    fn finish(&mut self, effects: &mut Vec<Effect>) {
        self.enter_phase(RunState::Finished);
        self.sync_state(effects);

        let summary = self.session.summary();
        info!(
            run_id = %summary.run_id,
            outcome = ?summary.outcome,
            analyzed = summary.analyzed,
            failed = summary.failed,
            submitted = summary.submitted,
            rejected = summary.rejected,
            elapsed_seconds = summary.elapsed_seconds,
            "Run finished"
        );
        effects.push(Effect::Emit(SubmitEvent::Finished {
            submitted: summary.submitted,
            analyzed: summary.analyzed,
            elapsed_seconds: summary.elapsed_seconds,
            timestamp: chrono::Utc::now(),
        }));
    }

    /// Emit a state change if the displayed state moved
    fn sync_state(&mut self, effects: &mut Vec<Effect>) {
        let current = self.state();
        if current != self.last_displayed {
            effects.push(Effect::Emit(SubmitEvent::StateChanged {
                old_state: self.last_displayed,
                new_state: current,
            }));
            self.last_displayed = current;
        }
    }
}
