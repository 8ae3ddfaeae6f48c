//! Run orchestrator
//!
//! # Architecture
//! A single control task owns the [`RunCore`] state machine and consumes one
//! channel of [`ControlMessage`]s: user commands from [`RunHandle`] and
//! completions posted by the tasks it spawned (discovery, analysis jobs, the
//! submission). The core returns [`Effect`]s; this module turns them into
//! tasks, cancellation signals, log writes and events.
//!
//! Spawned tasks never touch run state. Each posts exactly one completion,
//! including when the work inside it panicked.

mod batch;
mod run_core;

pub use self::batch::{
    encode_batch, BatchPolicy, SubmissionPayload, DEFAULT_MAX_BATCH, DEFAULT_MIN_BATCH,
};
pub use self::run_core::{
    Effect, OrchestratorConfig, RunCore, SubmissionResult, DEFAULT_CLIENT_KEY,
    DEFAULT_MAX_ACTIVE_FILES,
};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::models::{AnalyzedRecord, RunSummary};
use crate::types::{
    AnalysisError, AnalysisWorker, FileSource, LogWriter, ScanError, SubmissionTransport,
    SubmitOutcome,
};
use fpsubmit_common::events::{EventBus, RunState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Message consumed by the control task
#[derive(Debug)]
enum ControlMessage {
    Pause,
    Resume,
    Cancel,
    FilesDiscovered(Result<Vec<PathBuf>, ScanError>),
    JobFinished {
        path: PathBuf,
        result: Result<AnalyzedRecord, AnalysisError>,
    },
    SubmissionFinished(SubmissionResult),
}

/// Run orchestrator with its collaborators
pub struct Orchestrator {
    config: OrchestratorConfig,
    file_source: Arc<dyn FileSource>,
    worker: Arc<dyn AnalysisWorker>,
    transport: Arc<dyn SubmissionTransport>,
    log_writer: Arc<dyn LogWriter>,
    event_bus: EventBus,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        file_source: Arc<dyn FileSource>,
        worker: Arc<dyn AnalysisWorker>,
        transport: Arc<dyn SubmissionTransport>,
        log_writer: Arc<dyn LogWriter>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            file_source,
            worker,
            transport,
            log_writer,
            event_bus,
        }
    }

    /// Start a run over `directories` on a new control task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, directories: Vec<PathBuf>) -> RunHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(RunState::Idle);

        let task_tx = tx.clone();
        let join = tokio::spawn(async move {
            ControlTask::new(self, task_tx, state_tx)
                .run(directories, rx)
                .await
        });

        RunHandle {
            tx,
            state_rx,
            join,
        }
    }
}

/// Control surface of a running run
pub struct RunHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
    state_rx: watch::Receiver<RunState>,
    join: JoinHandle<OrchestratorResult<RunSummary>>,
}

impl RunHandle {
    pub fn pause(&self) -> OrchestratorResult<()> {
        self.send(ControlMessage::Pause)
    }

    pub fn resume(&self) -> OrchestratorResult<()> {
        self.send(ControlMessage::Resume)
    }

    pub fn cancel(&self) -> OrchestratorResult<()> {
        self.send(ControlMessage::Cancel)
    }

    /// Latest displayed state
    pub fn state(&self) -> RunState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every displayed state change
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state_rx.clone()
    }

    /// Cloneable command sender for use from other tasks
    pub fn controller(&self) -> RunController {
        RunController {
            tx: self.tx.clone(),
        }
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> OrchestratorResult<RunSummary> {
        self.join
            .await
            .map_err(|e| OrchestratorError::TaskFailed(e.to_string()))?
    }

    fn send(&self, message: ControlMessage) -> OrchestratorResult<()> {
        self.tx
            .send(message)
            .map_err(|_| OrchestratorError::ControlChannelClosed)
    }
}

/// Detached pause/resume/cancel sender
#[derive(Clone)]
pub struct RunController {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl RunController {
    pub fn pause(&self) -> OrchestratorResult<()> {
        self.send(ControlMessage::Pause)
    }

    pub fn resume(&self) -> OrchestratorResult<()> {
        self.send(ControlMessage::Resume)
    }

    pub fn cancel(&self) -> OrchestratorResult<()> {
        self.send(ControlMessage::Cancel)
    }

    fn send(&self, message: ControlMessage) -> OrchestratorResult<()> {
        self.tx
            .send(message)
            .map_err(|_| OrchestratorError::ControlChannelClosed)
    }
}

/// State owned by the control task
struct ControlTask {
    core: RunCore,
    file_source: Arc<dyn FileSource>,
    worker: Arc<dyn AnalysisWorker>,
    transport: Arc<dyn SubmissionTransport>,
    log_writer: Arc<dyn LogWriter>,
    event_bus: EventBus,
    tx: mpsc::UnboundedSender<ControlMessage>,
    state_tx: watch::Sender<RunState>,
    submission_token: Option<CancellationToken>,
    log_writes: JoinSet<()>,
}

impl ControlTask {
    fn new(
        orchestrator: Orchestrator,
        tx: mpsc::UnboundedSender<ControlMessage>,
        state_tx: watch::Sender<RunState>,
    ) -> Self {
        Self {
            core: RunCore::new(orchestrator.config),
            file_source: orchestrator.file_source,
            worker: orchestrator.worker,
            transport: orchestrator.transport,
            log_writer: orchestrator.log_writer,
            event_bus: orchestrator.event_bus,
            tx,
            state_tx,
            submission_token: None,
            log_writes: JoinSet::new(),
        }
    }

    async fn run(
        mut self,
        directories: Vec<PathBuf>,
        mut rx: mpsc::UnboundedReceiver<ControlMessage>,
    ) -> OrchestratorResult<RunSummary> {
        let effects = self.core.start(directories)?;
        self.apply(effects);

        while !self.core.is_finished() {
            // The task holds a sender itself, so recv only ends with the runtime
            let Some(message) = rx.recv().await else {
                break;
            };
            trace!(?message, "Control message");

            let effects = match message {
                ControlMessage::Pause => self.core.pause(),
                ControlMessage::Resume => self.core.resume(),
                ControlMessage::Cancel => self.core.cancel(),
                ControlMessage::FilesDiscovered(result) => self.core.files_discovered(result),
                ControlMessage::JobFinished { path, result } => {
                    self.core.job_finished(path, result)
                }
                ControlMessage::SubmissionFinished(result) => {
                    self.submission_token = None;
                    self.core.submission_finished(result)
                }
            };
            self.apply(effects);
        }

        // Accepted paths must reach the log before the run reports back
        while let Some(joined) = self.log_writes.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Submission log task failed");
            }
        }

        Ok(self.core.summary())
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Discover(roots) => self.spawn_discovery(roots),
                Effect::Analyze(path) => self.spawn_job(path),
                Effect::Submit(payload) => self.spawn_submission(payload),
                Effect::AbortSubmission => {
                    if let Some(token) = &self.submission_token {
                        debug!("Aborting in-flight submission");
                        token.cancel();
                    }
                }
                Effect::AppendLog(paths) => {
                    let writer = Arc::clone(&self.log_writer);
                    self.log_writes.spawn(async move {
                        if let Err(e) = writer.append(&paths).await {
                            error!(error = %e, count = paths.len(), "Failed to update submission log");
                        }
                    });
                }
                Effect::Emit(event) => {
                    trace!(event_type = event.event_type(), "Emitting event");
                    self.event_bus.emit_lossy(event);
                }
            }
        }
        self.state_tx.send_replace(self.core.state());
    }

    fn spawn_discovery(&self, roots: Vec<PathBuf>) {
        let source = Arc::clone(&self.file_source);
        let events = self.event_bus.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let inner = tokio::spawn(async move { source.discover(&roots, &events).await });
            let result = match inner.await {
                Ok(result) => result,
                Err(e) => Err(ScanError::Internal(e.to_string())),
            };
            let _ = tx.send(ControlMessage::FilesDiscovered(result));
        });
    }

    fn spawn_job(&self, path: PathBuf) {
        let worker = Arc::clone(&self.worker);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let job_path = path.clone();
            let inner = tokio::spawn(async move { worker.analyze(&job_path).await });
            let result = match inner.await {
                Ok(result) => result,
                Err(e) => Err(AnalysisError::Internal(e.to_string())),
            };
            let _ = tx.send(ControlMessage::JobFinished { path, result });
        });
    }

    fn spawn_submission(&mut self, payload: SubmissionPayload) {
        let transport = Arc::clone(&self.transport);
        let tx = self.tx.clone();
        let token = CancellationToken::new();
        self.submission_token = Some(token.clone());

        tokio::spawn(async move {
            let mut inner = tokio::spawn(async move { transport.submit(&payload).await });
            let result = tokio::select! {
                _ = token.cancelled() => {
                    inner.abort();
                    SubmissionResult::Aborted
                }
                joined = &mut inner => match joined {
                    Ok(outcome) => SubmissionResult::Completed(outcome),
                    Err(e) => SubmissionResult::Completed(SubmitOutcome::TransportError(
                        format!("submission task failed: {e}"),
                    )),
                },
            };
            let _ = tx.send(ControlMessage::SubmissionFinished(result));
        });
    }
}
