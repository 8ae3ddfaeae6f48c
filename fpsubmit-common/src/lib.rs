//! # fpsubmit Common Library
//!
//! Shared code for the fpsubmit workspace:
//! - Event types (SubmitEvent enum) and the broadcast EventBus
//! - Configuration file loading and platform paths
//! - Common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
