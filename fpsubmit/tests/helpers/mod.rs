//! In-memory collaborators for orchestrator integration tests
//!
//! - StaticFileSource: fixed file list, optional discovery delay
//! - MockWorker: synthetic records, scripted failures, optional gate
//! - MockTransport: records payloads, replays scripted outcomes
//! - MemoryLog: collects appended paths

#![allow(dead_code)]

use async_trait::async_trait;
use fpsubmit::models::{AnalyzedRecord, TrackTags};
use fpsubmit::orchestrator::SubmissionPayload;
use fpsubmit::services::fingerprinter::FingerprintError;
use fpsubmit::types::{
    AnalysisError, AnalysisWorker, FileSource, LogError, LogWriter, ScanError,
    SubmissionTransport, SubmitOutcome,
};
use fpsubmit::{Orchestrator, OrchestratorConfig};
use fpsubmit_common::events::{EventBus, SubmitEvent};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

pub const TEST_API_KEY: &str = "test-user-key";

/// `count` fake track paths under /music
pub fn track_paths(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| PathBuf::from(format!("/music/track_{i:03}.flac")))
        .collect()
}

/// Record a successful analysis of `path` would produce
pub fn record_for(path: &Path) -> AnalyzedRecord {
    AnalyzedRecord {
        path: path.to_path_buf(),
        fingerprint: format!("AQAA{}", path.display()),
        duration_seconds: 240,
        bitrate: Some(320),
        tags: TrackTags {
            track: Some("Track".to_string()),
            artist: Some("Artist".to_string()),
            mbid: Some("a0b1c2d3-e4f5-4a6b-8c7d-9e0f1a2b3c4d".to_string()),
            ..Default::default()
        },
    }
}

pub fn config(max_active_files: usize, min_batch: usize, max_batch: usize) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::new(TEST_API_KEY);
    config.max_active_files = max_active_files;
    config.batch.min_batch = min_batch;
    config.batch.max_batch = max_batch;
    config
}

// ============================================================================
// FileSource
// ============================================================================

pub struct StaticFileSource {
    files: Vec<PathBuf>,
    delay: Duration,
}

impl StaticFileSource {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self {
            files,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl FileSource for StaticFileSource {
    async fn discover(
        &self,
        _roots: &[PathBuf],
        _events: &EventBus,
    ) -> Result<Vec<PathBuf>, ScanError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.files.clone())
    }
}

// ============================================================================
// AnalysisWorker
// ============================================================================

#[derive(Default)]
pub struct MockWorker {
    failing: HashSet<PathBuf>,
    delay: Duration,
    /// When set, every job waits for one permit before answering
    gate: Option<Arc<Semaphore>>,
    started: Mutex<Vec<PathBuf>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl MockWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.failing.extend(paths);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Paths handed to the worker so far, in start order
    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().unwrap().clone()
    }

    /// Highest number of jobs that ran at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisWorker for MockWorker {
    async fn analyze(&self, path: &Path) -> Result<AnalyzedRecord, AnalysisError> {
        self.started.lock().unwrap().push(path.to_path_buf());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(path) {
            return Err(AnalysisError::Fingerprint(FingerprintError::Empty));
        }
        Ok(record_for(path))
    }
}

// ============================================================================
// SubmissionTransport
// ============================================================================

#[derive(Default)]
pub struct MockTransport {
    /// Replayed in order; `Accepted` once exhausted
    outcomes: Mutex<VecDeque<SubmitOutcome>>,
    payloads: Mutex<Vec<SubmissionPayload>>,
    delay: Duration,
    /// Never answer
    hang: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = SubmitOutcome>) -> Self {
        self.outcomes.lock().unwrap().extend(outcomes);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn payloads(&self) -> Vec<SubmissionPayload> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.payloads().iter().map(|p| p.len()).collect()
    }
}

#[async_trait]
impl SubmissionTransport for MockTransport {
    async fn submit(&self, payload: &SubmissionPayload) -> SubmitOutcome {
        self.payloads.lock().unwrap().push(payload.clone());

        if self.hang {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitOutcome::Accepted)
    }
}

// ============================================================================
// LogWriter
// ============================================================================

#[derive(Default)]
pub struct MemoryLog {
    paths: Mutex<Vec<PathBuf>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogWriter for MemoryLog {
    async fn append(&self, paths: &[PathBuf]) -> Result<(), LogError> {
        self.paths.lock().unwrap().extend_from_slice(paths);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Collaborators of one test run, kept for inspection after the run
pub struct TestRun {
    pub worker: Arc<MockWorker>,
    pub transport: Arc<MockTransport>,
    pub log: Arc<MemoryLog>,
    pub events: broadcast::Receiver<SubmitEvent>,
    pub orchestrator: Orchestrator,
}

impl TestRun {
    pub fn new(
        config: OrchestratorConfig,
        source: StaticFileSource,
        worker: MockWorker,
        transport: MockTransport,
    ) -> Self {
        let worker = Arc::new(worker);
        let transport = Arc::new(transport);
        let log = Arc::new(MemoryLog::new());
        let event_bus = EventBus::new(10_000);
        let events = event_bus.subscribe();

        let orchestrator = Orchestrator::new(
            config,
            Arc::new(source),
            worker.clone(),
            transport.clone(),
            log.clone(),
            event_bus,
        );

        Self {
            worker,
            transport,
            log,
            events,
            orchestrator,
        }
    }
}

/// Every event still buffered in `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<SubmitEvent>) -> Vec<SubmitEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
