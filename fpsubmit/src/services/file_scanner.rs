//! Audio file discovery
//!
//! Walks the selected directories, keeps files with a supported extension and
//! drops anything already recorded in the submission log. Nested or repeated
//! roots are collapsed first so no file is listed twice.

use crate::services::submission_log::SubmissionLog;
use crate::types::{FileSource, ScanError};
use async_trait::async_trait;
use fpsubmit_common::events::{EventBus, SubmitEvent};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions accepted for fingerprinting, compared uppercased
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "MP3", "MP4", "M4A", "FLAC", "OGG", "OGA", "APE", "OGGFLAC", "TTA", "WV", "MPC", "WMA",
];

/// Recursive audio file scanner
#[derive(Debug, Clone)]
pub struct FileScanner {
    ignore_patterns: Vec<String>,
    submission_log: Option<SubmissionLog>,
}

impl FileScanner {
    /// Scanner that skips version-control and OS metadata entries
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
            submission_log: None,
        }
    }

    /// Exclude paths recorded in `log`
    pub fn with_submission_log(mut self, log: SubmissionLog) -> Self {
        self.submission_log = Some(log);
        self
    }

    /// Canonicalize, sort and drop roots nested under another root
    ///
    /// Roots that cannot be resolved are skipped with a warning. Fails only
    /// when no root is usable.
    pub fn remove_duplicate_directories(
        directories: &[PathBuf],
    ) -> Result<Vec<PathBuf>, ScanError> {
        let mut canonical = Vec::with_capacity(directories.len());
        let mut first_error = None;
        for dir in directories {
            let resolved = dir.canonicalize().and_then(|path| {
                if path.is_dir() {
                    Ok(path)
                } else {
                    Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"))
                }
            });
            match resolved {
                Ok(path) => canonical.push(path),
                Err(source) => {
                    tracing::warn!(path = %dir.display(), error = %source, "Skipping unusable directory");
                    if first_error.is_none() {
                        first_error = Some(ScanError::Root {
                            path: dir.clone(),
                            source,
                        });
                    }
                }
            }
        }
        if canonical.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        canonical.sort();

        let mut result: Vec<PathBuf> = Vec::with_capacity(canonical.len());
        for path in canonical {
            // Path::starts_with compares whole components, so /a/bc is not under /a/b
            if !result.last().is_some_and(|kept| path.starts_with(kept)) {
                result.push(path);
            }
        }
        Ok(result)
    }

    /// Extension check, case-insensitive
    pub fn is_supported_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                let upper = ext.to_uppercase();
                SUPPORTED_EXTENSIONS.contains(&upper.as_str())
            })
            .unwrap_or(false)
    }

    /// Scan `roots` synchronously
    ///
    /// `on_directory` is called for every directory entered. Unreadable
    /// entries below a root are logged and skipped.
    pub fn scan<F>(&self, roots: &[PathBuf], mut on_directory: F) -> Result<Vec<PathBuf>, ScanError>
    where
        F: FnMut(&Path),
    {
        let roots = Self::remove_duplicate_directories(roots)?;
        let logged: HashSet<PathBuf> = self
            .submission_log
            .as_ref()
            .map(|log| log.read_paths())
            .unwrap_or_default();

        let mut files = Vec::new();
        let mut skipped_logged = 0usize;

        for root in &roots {
            let walker = WalkDir::new(root)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| !self.is_ignored(e));

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!("Error accessing entry: {}", e);
                        continue;
                    }
                };

                let path = entry.path();
                if entry.file_type().is_dir() {
                    on_directory(path);
                } else if entry.file_type().is_file() && Self::is_supported_file(path) {
                    if logged.contains(path) {
                        skipped_logged += 1;
                    } else {
                        files.push(path.to_path_buf());
                    }
                }
            }
        }

        tracing::info!(
            roots = roots.len(),
            files = files.len(),
            already_submitted = skipped_logged,
            "File scan complete"
        );
        Ok(files)
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.ignore_patterns.iter().any(|pattern| name == pattern.as_str())
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSource for FileScanner {
    async fn discover(
        &self,
        roots: &[PathBuf],
        events: &EventBus,
    ) -> Result<Vec<PathBuf>, ScanError> {
        let scanner = self.clone();
        let roots = roots.to_vec();
        let events = events.clone();

        tokio::task::spawn_blocking(move || {
            scanner.scan(&roots, |dir| {
                events.emit_lossy(SubmitEvent::CurrentPathChanged {
                    path: dir.to_path_buf(),
                });
            })
        })
        .await
        .map_err(|e| ScanError::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_supported_extensions() {
        assert!(FileScanner::is_supported_file(Path::new("a.mp3")));
        assert!(FileScanner::is_supported_file(Path::new("a.FLAC")));
        assert!(FileScanner::is_supported_file(Path::new("a.OggFlac")));
        assert!(FileScanner::is_supported_file(Path::new("dir/a.wv")));
        assert!(!FileScanner::is_supported_file(Path::new("a.wav")));
        assert!(!FileScanner::is_supported_file(Path::new("a.txt")));
        assert!(!FileScanner::is_supported_file(Path::new("mp3")));
    }

    #[test]
    fn test_remove_duplicate_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("music/rock")).unwrap();
        fs::create_dir_all(root.join("music2")).unwrap();

        let dirs = vec![
            root.join("music/rock"),
            root.join("music2"),
            root.join("music"),
            root.join("music/"),
        ];
        let result = FileScanner::remove_duplicate_directories(&dirs).unwrap();
        assert_eq!(result, vec![root.join("music"), root.join("music2")]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let result =
            FileScanner::remove_duplicate_directories(&[PathBuf::from("/nonexistent/fpsubmit")]);
        assert!(matches!(result, Err(ScanError::Root { .. })));
    }

    #[test]
    fn test_unusable_root_skipped_when_others_remain() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("music")).unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();

        let dirs = vec![
            root.join("absent"),
            root.join("music"),
            root.join("notes.txt"),
        ];
        let result = FileScanner::remove_duplicate_directories(&dirs).unwrap();
        assert_eq!(result, vec![root.join("music")]);
    }

    #[test]
    fn test_scan_filters_and_reports_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("album")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("album/01.flac"), b"x").unwrap();
        fs::write(root.join("album/02.MP3"), b"x").unwrap();
        fs::write(root.join("album/cover.jpg"), b"x").unwrap();
        fs::write(root.join(".git/hook.mp3"), b"x").unwrap();

        let mut dirs = Vec::new();
        let files = FileScanner::new()
            .scan(&[root.clone()], |d| dirs.push(d.to_path_buf()))
            .unwrap();

        assert_eq!(files, vec![root.join("album/01.flac"), root.join("album/02.MP3")]);
        assert_eq!(dirs, vec![root.clone(), root.join("album")]);
    }

    #[test]
    fn test_scan_excludes_logged_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::write(root.join("a.mp3"), b"x").unwrap();
        fs::write(root.join("b.mp3"), b"x").unwrap();

        let log_path = root.join("submitted.log");
        fs::write(&log_path, format!("{}\n", root.join("a.mp3").display())).unwrap();

        let scanner = FileScanner::new().with_submission_log(SubmissionLog::new(log_path));
        let files = scanner.scan(&[root.clone()], |_| {}).unwrap();
        assert_eq!(files, vec![root.join("b.mp3")]);
    }

    #[tokio::test]
    async fn test_discover_emits_directory_events() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        fs::write(root.join("a.ogg"), b"x").unwrap();

        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let files = FileScanner::new().discover(&[root.clone()], &bus).await.unwrap();

        assert_eq!(files, vec![root.join("a.ogg")]);
        assert_eq!(
            rx.recv().await.unwrap(),
            SubmitEvent::CurrentPathChanged { path: root }
        );
    }
}
