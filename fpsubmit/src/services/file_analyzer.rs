//! Default analysis worker: tags, then fingerprint

use crate::models::AnalyzedRecord;
use crate::services::fingerprinter::Fingerprinter;
use crate::services::metadata_extractor::MetadataExtractor;
use crate::types::{AnalysisError, AnalysisWorker};
use async_trait::async_trait;
use std::path::Path;

/// Reads tags and computes the fingerprint of one file on the blocking pool
#[derive(Debug, Clone)]
pub struct FileAnalyzer {
    metadata: MetadataExtractor,
    fingerprinter: Fingerprinter,
}

impl FileAnalyzer {
    pub fn new(metadata: MetadataExtractor, fingerprinter: Fingerprinter) -> Self {
        Self {
            metadata,
            fingerprinter,
        }
    }

    /// Blocking analysis
    ///
    /// Tags are checked first so files without usable metadata are never decoded.
    pub fn analyze_blocking(&self, path: &Path) -> Result<AnalyzedRecord, AnalysisError> {
        let meta = self.metadata.extract(path)?;
        let fingerprint = self.fingerprinter.fingerprint_file(path)?;

        Ok(AnalyzedRecord {
            path: path.to_path_buf(),
            fingerprint,
            duration_seconds: meta.duration_seconds,
            bitrate: meta.bitrate,
            tags: meta.tags,
        })
    }
}

#[async_trait]
impl AnalysisWorker for FileAnalyzer {
    async fn analyze(&self, path: &Path) -> Result<AnalyzedRecord, AnalysisError> {
        let analyzer = self.clone();
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || analyzer.analyze_blocking(&path))
            .await
            .map_err(|e| AnalysisError::Internal(e.to_string()))?
    }
}
