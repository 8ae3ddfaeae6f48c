//! Persisted log of submitted files
//!
//! Plain UTF-8 text, one absolute path per line, append-only. Paths listed
//! here are skipped by later scans.

use crate::types::{LogError, LogWriter};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Submission log at a fixed location
#[derive(Debug, Clone)]
pub struct SubmissionLog {
    path: PathBuf,
}

impl SubmissionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every logged path
    ///
    /// A missing or unreadable log is treated as empty and logged at warn level.
    pub fn read_paths(&self) -> HashSet<PathBuf> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => content
                .lines()
                .filter(|line| !line.is_empty())
                .map(PathBuf::from)
                .collect(),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Couldn't open submission log for reading"
                );
                HashSet::new()
            }
        }
    }
}

#[async_trait]
impl LogWriter for SubmissionLog {
    async fn append(&self, paths: &[PathBuf]) -> Result<(), LogError> {
        if paths.is_empty() {
            return Ok(());
        }

        let io_err = |source: std::io::Error| LogError::Io {
            path: self.path.clone(),
            source,
        };

        // One write per batch so concurrent appends never interleave lines
        let mut buffer = String::new();
        for path in paths {
            // A lossy line would never match on the next scan
            let Some(line) = path.to_str() else {
                tracing::warn!(
                    path = %path.display(),
                    "Path is not valid UTF-8, not recording it in the submission log"
                );
                continue;
            };
            buffer.push_str(line);
            buffer.push('\n');
        }
        if buffer.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(buffer.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), count = paths.len(), "Updated submission log");
        Ok(())
    }
}
