//! Submission batching policy and payload encoding

use crate::models::AnalyzedRecord;
use std::path::PathBuf;
use url::form_urlencoded;

/// Default smallest batch submitted while analysis is still producing records
pub const DEFAULT_MIN_BATCH: usize = 50;

/// Default largest batch submitted in one request
pub const DEFAULT_MAX_BATCH: usize = 100;

/// Decides how many queued records go into the next submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub min_batch: usize,
    pub max_batch: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            min_batch: DEFAULT_MIN_BATCH,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

impl BatchPolicy {
    /// Number of records to submit now, or 0 to wait
    ///
    /// `drain` is set when no more records will arrive; any non-empty queue
    /// is then submitted.
    pub fn batch_size(&self, queued: usize, drain: bool) -> usize {
        let size = queued.min(self.max_batch);
        if size == 0 {
            0
        } else if size >= self.min_batch || drain {
            size
        } else {
            0
        }
    }
}

/// Encoded request body plus the paths it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPayload {
    /// `application/x-www-form-urlencoded` body, uncompressed
    pub body: String,
    pub paths: Vec<PathBuf>,
}

impl SubmissionPayload {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Build the form body for `records`
///
/// Field order per record follows the service's documented parameter list;
/// empty strings and zero numbers are left out.
pub fn encode_batch(
    records: &[AnalyzedRecord],
    api_key: &str,
    client_key: &str,
) -> SubmissionPayload {
    let mut form = form_urlencoded::Serializer::new(String::new());
    form.append_pair("user", api_key);
    form.append_pair("client", client_key);

    for (i, record) in records.iter().enumerate() {
        let tags = &record.tags;
        form.append_pair(&format!("duration.{i}"), &record.duration_seconds.to_string());

        let text_fields = [
            ("mbid", &tags.mbid),
            ("track", &tags.track),
            ("artist", &tags.artist),
            ("album", &tags.album),
            ("albumartist", &tags.album_artist),
        ];
        for (key, value) in text_fields {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                form.append_pair(&format!("{key}.{i}"), value);
            }
        }

        let number_fields = [
            ("year", tags.year),
            ("trackno", tags.track_number),
            ("discno", tags.disc_number),
        ];
        for (key, value) in number_fields {
            if let Some(value) = value.filter(|v| *v != 0) {
                form.append_pair(&format!("{key}.{i}"), &value.to_string());
            }
        }

        form.append_pair(&format!("fingerprint.{i}"), &record.fingerprint);
        if let Some(format) = record.file_format() {
            form.append_pair(&format!("fileformat.{i}"), &format);
        }
        if let Some(bitrate) = record.bitrate.filter(|b| *b != 0) {
            form.append_pair(&format!("bitrate.{i}"), &bitrate.to_string());
        }
    }

    SubmissionPayload {
        body: form.finish(),
        paths: records.iter().map(|r| r.path.clone()).collect(),
    }
}
