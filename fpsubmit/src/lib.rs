//! fpsubmit library interface
//!
//! The binary is a thin shell around [`orchestrator::Orchestrator`]; everything
//! else is exposed for integration testing and alternative front ends.

pub mod config;
pub mod error;
#[cfg(feature = "chromaprint")]
pub mod ffi;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod types;
#[cfg(feature = "chromaprint")]
pub mod utils;

pub use crate::error::{OrchestratorError, OrchestratorResult};
pub use crate::orchestrator::{Orchestrator, OrchestratorConfig, RunController, RunHandle};

/// Version string reported in the User-Agent and the startup banner
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git hash captured by the build script
pub const GIT_HASH: &str = env!("GIT_HASH");
