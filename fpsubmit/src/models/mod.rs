//! Data models

pub mod record;
pub mod run_session;

pub use record::{AnalyzedRecord, TrackTags};
pub use run_session::{HaltReason, RunOutcome, RunSession, RunSummary, StateTransition};
