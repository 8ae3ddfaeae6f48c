//! Analyzed file record

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tag values carried into a submission
///
/// Numeric fields use `None` for "not tagged"; zero is treated the same way
/// when encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    pub track: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// MusicBrainz recording id
    pub mbid: Option<String>,
}

/// Successful analysis of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedRecord {
    pub path: PathBuf,
    /// Compressed, base64-style fingerprint string
    pub fingerprint: String,
    /// Track length in whole seconds
    pub duration_seconds: u32,
    /// Audio bitrate in kbps
    pub bitrate: Option<u32>,
    pub tags: TrackTags,
}

impl AnalyzedRecord {
    /// Uppercased file extension, e.g. `FLAC`
    pub fn file_format(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> AnalyzedRecord {
        AnalyzedRecord {
            path: PathBuf::from(path),
            fingerprint: "AQAA".to_string(),
            duration_seconds: 1,
            bitrate: None,
            tags: TrackTags::default(),
        }
    }

    #[test]
    fn test_file_format_uppercased() {
        assert_eq!(record("/music/a.flac").file_format().as_deref(), Some("FLAC"));
        assert_eq!(record("/music/b.Mp3").file_format().as_deref(), Some("MP3"));
    }

    #[test]
    fn test_file_format_missing_extension() {
        assert_eq!(record("/music/README").file_format(), None);
        assert_eq!(record("/music/trailing.").file_format(), None);
    }
}
