//! Configuration file loading and platform path resolution
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! This module owns tiers 3 and 4; the binary layers tiers 1 and 2 on top.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application directory name used under the platform config/cache dirs
pub const APP_DIR_NAME: &str = "fpsubmit";

/// Name of the persisted "already submitted" log file
pub const SUBMISSION_LOG_FILE_NAME: &str = "acoustid-fingerprinter.log";

/// Logging section of the TOML config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default tracing filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Contents of `config.toml`
///
/// Every field is optional; absent values fall through to the compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TomlConfig {
    /// AcoustID user API key
    pub api_key: Option<String>,
    /// Submission endpoint
    pub submit_url: Option<String>,
    /// AcoustID client (application) key
    pub client_key: Option<String>,
    /// Maximum number of files analyzed concurrently
    pub max_active_files: Option<usize>,
    /// Smallest batch submitted outside drain mode
    pub min_batch_size: Option<usize>,
    /// Largest batch submitted in one request
    pub max_batch_size: Option<usize>,
    /// Seconds of audio used for fingerprinting
    pub fingerprint_length: Option<u32>,
    /// Skip files without a MusicBrainz recording id
    pub require_mbid: Option<bool>,
    /// Persisted submission log location
    pub log_file: Option<PathBuf>,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Get default configuration file path for the platform
///
/// `~/.config/fpsubmit/config.toml` on Linux, the equivalent per-user config
/// directory elsewhere.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME).join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Get default location of the persisted submission log
///
/// Falls back to the working directory when the platform has no cache dir.
pub fn default_submission_log_path() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(SUBMISSION_LOG_FILE_NAME)
}

/// Load TOML config from `path`
///
/// A missing file is not an error and yields the defaults.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    tracing::info!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Write TOML config atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = TomlConfig {
            api_key: Some("user-key".to_string()),
            max_active_files: Some(4),
            log_file: Some(PathBuf::from("/tmp/submitted.log")),
            ..Default::default()
        };
        write_toml_config(&config, &path).unwrap();

        let loaded = load_toml_config(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "min_batch_size = 10\n[logging]\nlevel = \"debug\"\n").unwrap();

        let loaded = load_toml_config(&path).unwrap();
        assert_eq!(loaded.min_batch_size, Some(10));
        assert_eq!(loaded.api_key, None);
        assert_eq!(loaded.logging.level, "debug");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "max_active_files = \"three\"").unwrap();

        match load_toml_config(&path) {
            Err(Error::Config(msg)) => assert!(msg.contains("Parse")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_log_path_file_name() {
        let path = default_submission_log_path();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some(SUBMISSION_LOG_FILE_NAME)
        );
    }
}
