//! Tag and audio property extraction using lofty
//!
//! A file is only usable for submission when it carries a tag block, has a
//! non-zero length and, unless disabled, a MusicBrainz recording id.

use crate::models::TrackTags;
use lofty::file::{FileType, TaggedFileExt};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use std::path::Path;
use thiserror::Error;

/// UFID owner used by MusicBrainz Picard in ID3v2 tags
const MUSICBRAINZ_UFID_OWNER: &str = "http://musicbrainz.org";

/// Length of a hyphenated MusicBrainz id
const MBID_LENGTH: usize = 36;

/// Metadata extraction errors
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Failed to read file: {0}")]
    ReadError(String),

    #[error("No tags found")]
    NoTags,

    #[error("Zero length audio")]
    ZeroLength,

    #[error("No valid MusicBrainz recording id")]
    MissingMbid,
}

/// What analysis needs from the tags and audio properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetadata {
    /// Whole seconds
    pub duration_seconds: u32,
    /// kbps
    pub bitrate: Option<u32>,
    pub tags: TrackTags,
}

/// Metadata extractor service
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    require_mbid: bool,
}

impl MetadataExtractor {
    pub fn new(require_mbid: bool) -> Self {
        Self { require_mbid }
    }

    /// Extract metadata from an audio file
    pub fn extract(&self, file_path: &Path) -> Result<ExtractedMetadata, MetadataError> {
        let tagged_file = Probe::open(file_path)
            .map_err(|e| MetadataError::ReadError(e.to_string()))?
            .read()
            .map_err(|e| MetadataError::ReadError(e.to_string()))?;

        let properties = tagged_file.properties();
        let duration_seconds = properties.duration().as_secs() as u32;
        let bitrate = properties.audio_bitrate();

        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .ok_or(MetadataError::NoTags)?;

        let mut mbid = tag
            .get_string(&ItemKey::MusicBrainzRecordingId)
            .map(|s| s.trim().to_string());
        if mbid.is_none() && tagged_file.file_type() == FileType::Mpeg {
            mbid = mbid_from_ufid(file_path);
        }

        let tags = TrackTags {
            track: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            album_artist: tag.get_string(&ItemKey::AlbumArtist).map(|s| s.to_string()),
            year: tag.year(),
            track_number: tag.track(),
            disc_number: tag.disk(),
            mbid,
        };

        check_requirements(duration_seconds, tags.mbid.as_deref(), self.require_mbid)?;

        tracing::debug!(
            file = %file_path.display(),
            artist = ?tags.artist,
            title = ?tags.track,
            duration_s = duration_seconds,
            mbid = ?tags.mbid,
            "Extracted metadata"
        );

        Ok(ExtractedMetadata {
            duration_seconds,
            bitrate,
            tags,
        })
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

fn check_requirements(
    duration_seconds: u32,
    mbid: Option<&str>,
    require_mbid: bool,
) -> Result<(), MetadataError> {
    if duration_seconds == 0 {
        return Err(MetadataError::ZeroLength);
    }
    if require_mbid && mbid.map(str::len) != Some(MBID_LENGTH) {
        return Err(MetadataError::MissingMbid);
    }
    Ok(())
}

/// Read the MusicBrainz UFID frame that lofty does not map
fn mbid_from_ufid(file_path: &Path) -> Option<String> {
    let tag = id3::Tag::read_from_path(file_path).ok()?;
    let found = tag.frames().find_map(|frame| match frame.content() {
        id3::Content::UniqueFileIdentifier(ufid)
            if ufid.owner_identifier == MUSICBRAINZ_UFID_OWNER =>
        {
            String::from_utf8(ufid.identifier.clone())
                .ok()
                .map(|id| id.trim_end_matches('\0').to_string())
        }
        _ => None,
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use id3::TagLike;

    const MBID: &str = "b1a9c0e9-d987-4042-ae91-78d6a3267d69";

    #[test]
    fn test_extract_nonexistent_file() {
        let extractor = MetadataExtractor::new(true);
        let result = extractor.extract(Path::new("/nonexistent/file.mp3"));
        assert!(matches!(result, Err(MetadataError::ReadError(_))));
    }

    #[test]
    fn test_requirements() {
        assert!(check_requirements(200, Some(MBID), true).is_ok());
        assert!(matches!(
            check_requirements(0, Some(MBID), true),
            Err(MetadataError::ZeroLength)
        ));
        assert!(matches!(
            check_requirements(200, None, true),
            Err(MetadataError::MissingMbid)
        ));
        assert!(matches!(
            check_requirements(200, Some("not-an-id"), true),
            Err(MetadataError::MissingMbid)
        ));
        assert!(check_requirements(200, None, false).is_ok());
    }

    #[test]
    fn test_mbid_read_from_ufid_frame() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("track.mp3");
        std::fs::write(&path, b"").unwrap();

        let mut tag = id3::Tag::new();
        tag.add_frame(id3::Frame::with_content(
            "UFID",
            id3::Content::UniqueFileIdentifier(id3::frame::UniqueFileIdentifier {
                owner_identifier: MUSICBRAINZ_UFID_OWNER.to_string(),
                identifier: MBID.as_bytes().to_vec(),
            }),
        ));
        tag.write_to_path(&path, id3::Version::Id3v24).unwrap();

        assert_eq!(mbid_from_ufid(&path).as_deref(), Some(MBID));
        assert_eq!(mbid_from_ufid(&temp_dir.path().join("absent.mp3")), None);
    }

    #[test]
    fn test_untagged_wav_rejected() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..16000 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let result = MetadataExtractor::new(false).extract(&path);
        assert!(matches!(result, Err(MetadataError::NoTags)));
    }
}
