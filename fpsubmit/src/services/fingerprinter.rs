//! Audio fingerprinting
//!
//! Two backends compute the same Chromaprint fingerprint:
//! - default: the `fpcalc` tool from the Chromaprint distribution, run as a
//!   subprocess with JSON output
//! - feature `chromaprint`: symphonia decoding fed into libchromaprint
//!
//! Only the first `length_seconds` of audio are fingerprinted.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Seconds of audio fingerprinted per file
pub const DEFAULT_FINGERPRINT_LENGTH: u32 = 120;

/// Fingerprinting errors
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    #[error("Chromaprint error: {0}")]
    ChromaprintError(String),

    #[error("fpcalc not found at {0}")]
    ToolNotFound(PathBuf),

    #[error("fpcalc failed: {0}")]
    ToolFailed(String),

    #[error("Empty fingerprint")]
    Empty,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// `fpcalc -json` output
#[derive(Debug, Deserialize)]
struct FpcalcOutput {
    fingerprint: String,
}

/// Audio fingerprinter
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    length_seconds: u32,
    fpcalc_path: PathBuf,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self {
            length_seconds: DEFAULT_FINGERPRINT_LENGTH,
            fpcalc_path: PathBuf::from("fpcalc"),
        }
    }

    /// Set fingerprint length in seconds
    pub fn with_length(mut self, seconds: u32) -> Self {
        self.length_seconds = seconds;
        self
    }

    /// Use a specific `fpcalc` binary
    pub fn with_fpcalc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fpcalc_path = path.into();
        self
    }

    pub fn length_seconds(&self) -> u32 {
        self.length_seconds
    }

    /// Compute the compressed fingerprint of `audio_path`
    ///
    /// Blocking; run inside `spawn_blocking`.
    pub fn fingerprint_file(&self, audio_path: &Path) -> Result<String, FingerprintError> {
        #[cfg(feature = "chromaprint")]
        let fingerprint = self.fingerprint_with_library(audio_path)?;
        #[cfg(not(feature = "chromaprint"))]
        let fingerprint = self.fingerprint_with_fpcalc(audio_path)?;

        if fingerprint.is_empty() {
            return Err(FingerprintError::Empty);
        }
        Ok(fingerprint)
    }

    #[cfg(feature = "chromaprint")]
    fn fingerprint_with_library(&self, audio_path: &Path) -> Result<String, FingerprintError> {
        use crate::ffi::chromaprint::ChromaprintContext;
        use crate::utils::decode_audio_file;

        let decoded = decode_audio_file(audio_path, Some(self.length_seconds))
            .map_err(|e| FingerprintError::DecodeError(e.to_string()))?;

        let mut ctx = ChromaprintContext::new()
            .map_err(|e| FingerprintError::ChromaprintError(e.to_string()))?;
        ctx.fingerprint(&decoded.samples, decoded.sample_rate)
            .map_err(|e| FingerprintError::ChromaprintError(e.to_string()))
    }

    #[cfg_attr(feature = "chromaprint", allow(dead_code))]
    fn fingerprint_with_fpcalc(&self, audio_path: &Path) -> Result<String, FingerprintError> {
        let output = std::process::Command::new(&self.fpcalc_path)
            .arg("-json")
            .arg("-length")
            .arg(self.length_seconds.to_string())
            .arg(audio_path)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    FingerprintError::ToolNotFound(self.fpcalc_path.clone())
                }
                _ => FingerprintError::IoError(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FingerprintError::ToolFailed(stderr.trim().to_string()));
        }

        parse_fpcalc_output(&output.stdout)
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_fpcalc_output(stdout: &[u8]) -> Result<String, FingerprintError> {
    let parsed: FpcalcOutput = serde_json::from_slice(stdout)
        .map_err(|e| FingerprintError::ToolFailed(format!("unreadable output: {}", e)))?;
    Ok(parsed.fingerprint)
}
