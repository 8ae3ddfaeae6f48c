//! Collaborator traits and the tagged results they produce
//!
//! The orchestrator talks to the outside world only through these four
//! seams. Each has a default implementation under [`crate::services`];
//! tests substitute in-memory mocks.

use crate::models::AnalyzedRecord;
use crate::orchestrator::SubmissionPayload;
use crate::services::fingerprinter::FingerprintError;
use crate::services::metadata_extractor::MetadataError;
use async_trait::async_trait;
use fpsubmit_common::events::EventBus;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// File discovery failure
#[derive(Debug, Error)]
pub enum ScanError {
    /// Root directory missing or unreadable
    #[error("Cannot scan {path}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Submission log could not be read
    #[error("Submission log error: {0}")]
    Log(#[from] LogError),

    /// Blocking scan task failed
    #[error("Scan task failed: {0}")]
    Internal(String),
}

/// Per-file analysis failure; the file is skipped
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("couldn't read metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("couldn't calculate fingerprint: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// Worker task panicked or was cancelled
    #[error("analysis task failed: {0}")]
    Internal(String),
}

/// Submission log read/write failure
#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Submission outcome
// ============================================================================

/// Why the server refused a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The user API key was refused; fatal to the run
    Authentication,
    /// Anything else; the batch is dropped and the run continues
    Other,
}

/// Result of one submission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    Rejected { kind: RejectionKind, message: String },
    /// No usable answer from the server (connection, timeout, 5xx)
    TransportError(String),
}

// ============================================================================
// Traits
// ============================================================================

/// Produces the ordered list of files a run should analyze
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Discover candidate files below `roots`
    ///
    /// Implementations may report directory progress on `events`.
    async fn discover(
        &self,
        roots: &[PathBuf],
        events: &EventBus,
    ) -> Result<Vec<PathBuf>, ScanError>;
}

/// Turns one file into a submittable record
#[async_trait]
pub trait AnalysisWorker: Send + Sync {
    async fn analyze(&self, path: &Path) -> Result<AnalyzedRecord, AnalysisError>;
}

/// Delivers one encoded batch to the remote service
///
/// Abort is expressed by dropping the returned future.
#[async_trait]
pub trait SubmissionTransport: Send + Sync {
    async fn submit(&self, payload: &SubmissionPayload) -> SubmitOutcome;
}

/// Persists paths that were accepted by the server
#[async_trait]
pub trait LogWriter: Send + Sync {
    async fn append(&self, paths: &[PathBuf]) -> Result<(), LogError>;
}
