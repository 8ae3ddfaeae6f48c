//! Run settings resolution
//!
//! Each setting is taken from the first source that provides it:
//! 1. Command-line argument, or its environment variable (clap `env`)
//! 2. TOML config file
//! 3. Compiled default

use crate::orchestrator::{
    BatchPolicy, OrchestratorConfig, DEFAULT_CLIENT_KEY, DEFAULT_MAX_ACTIVE_FILES,
    DEFAULT_MAX_BATCH, DEFAULT_MIN_BATCH,
};
use crate::services::acoustid_client::DEFAULT_SUBMIT_URL;
use crate::services::fingerprinter::DEFAULT_FINGERPRINT_LENGTH;
use fpsubmit_common::config::{default_submission_log_path, TomlConfig};
use fpsubmit_common::{Error, Result};
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment variable holding the user API key
pub const API_KEY_ENV: &str = "FPSUBMIT_API_KEY";

/// Where users obtain an API key
pub const API_KEY_URL: &str = "https://acoustid.org/api-key";

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub submit_url: Option<String>,
    pub max_active_files: Option<usize>,
    pub min_batch_size: Option<usize>,
    pub max_batch_size: Option<usize>,
    pub log_file: Option<PathBuf>,
    pub require_mbid: Option<bool>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: String,
    pub submit_url: String,
    pub client_key: String,
    pub max_active_files: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub fingerprint_length: u32,
    pub require_mbid: bool,
    pub log_file: PathBuf,
    pub log_level: String,
}

impl Settings {
    /// Merge CLI/env values over the TOML file and defaults, then validate
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let settings = Self {
            api_key: resolve_api_key(cli, toml)?,
            submit_url: cli
                .submit_url
                .clone()
                .or_else(|| toml.submit_url.clone())
                .unwrap_or_else(|| DEFAULT_SUBMIT_URL.to_string()),
            client_key: toml
                .client_key
                .clone()
                .unwrap_or_else(|| DEFAULT_CLIENT_KEY.to_string()),
            max_active_files: cli
                .max_active_files
                .or(toml.max_active_files)
                .unwrap_or(DEFAULT_MAX_ACTIVE_FILES),
            min_batch_size: cli
                .min_batch_size
                .or(toml.min_batch_size)
                .unwrap_or(DEFAULT_MIN_BATCH),
            max_batch_size: cli
                .max_batch_size
                .or(toml.max_batch_size)
                .unwrap_or(DEFAULT_MAX_BATCH),
            fingerprint_length: toml.fingerprint_length.unwrap_or(DEFAULT_FINGERPRINT_LENGTH),
            require_mbid: cli.require_mbid.or(toml.require_mbid).unwrap_or(true),
            log_file: cli
                .log_file
                .clone()
                .or_else(|| toml.log_file.clone())
                .unwrap_or_else(default_submission_log_path),
            log_level: toml.logging.level.clone(),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_key(&self.api_key) {
            return Err(Error::Config("API key is empty".to_string()));
        }
        if self.max_active_files == 0 {
            return Err(Error::Config("max_active_files must be at least 1".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(Error::Config("max_batch_size must be at least 1".to_string()));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(Error::Config(format!(
                "min_batch_size ({}) exceeds max_batch_size ({})",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if self.fingerprint_length == 0 {
            return Err(Error::Config("fingerprint_length must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_active_files: self.max_active_files,
            batch: BatchPolicy {
                min_batch: self.min_batch_size,
                max_batch: self.max_batch_size,
            },
            api_key: self.api_key.clone(),
            client_key: self.client_key.clone(),
        }
    }
}

/// API key from CLI/env, falling back to TOML
fn resolve_api_key(cli: &CliOverrides, toml: &TomlConfig) -> Result<String> {
    let cli_key = cli.api_key.as_deref().filter(|k| is_valid_key(k));
    let toml_key = toml.api_key.as_deref().filter(|k| is_valid_key(k));

    if cli_key.is_some() && toml_key.is_some() {
        warn!("API key found on the command line/environment and in the TOML config. Using command line/environment.");
    }

    if let Some(key) = cli_key {
        info!("API key loaded from command line or environment");
        return Ok(key.trim().to_string());
    }
    if let Some(key) = toml_key {
        info!("API key loaded from TOML config");
        return Ok(key.trim().to_string());
    }

    Err(Error::Config(format!(
        "API key not configured. Provide one of:\n\
         1. Command line: --api-key <key>\n\
         2. Environment: {API_KEY_ENV}=<key>\n\
         3. TOML config: api_key = \"<key>\"\n\
         \n\
         Obtain an API key at: {API_KEY_URL}"
    )))
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
