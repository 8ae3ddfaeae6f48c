//! AcoustID submission client
//!
//! Posts an encoded batch to the `submit` endpoint. The form body is
//! gzip-compressed and sent with `Content-Encoding: gzip`. Proxy settings
//! come from the standard `http_proxy`/`https_proxy` environment variables.

use crate::orchestrator::SubmissionPayload;
use crate::types::{RejectionKind, SubmissionTransport, SubmitOutcome};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Deserialize;
use std::io::Write;
use std::time::Duration;
use thiserror::Error;

/// Default submission endpoint
pub const DEFAULT_SUBMIT_URL: &str = "http://api.acoustid.org/submit";

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Text the service puts in its reply when the user key is unknown
const UNKNOWN_USER_KEY_MARKER: &str = "User with the API key";

/// AcoustID error code for an invalid user API key
const ERROR_CODE_INVALID_USER_KEY: i64 = 6;

/// Client setup and request encoding failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Failed to compress request body: {0}")]
    Compression(#[from] std::io::Error),
}

/// JSON reply of the submit endpoint
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    status: String,
    error: Option<SubmitResponseError>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponseError {
    code: Option<i64>,
    message: Option<String>,
}

/// AcoustID submission client
pub struct AcoustIdClient {
    http_client: reqwest::Client,
    submit_url: String,
}

impl AcoustIdClient {
    pub fn new(submit_url: impl Into<String>) -> Result<Self, TransportError> {
        let user_agent = format!("fpsubmit/{}", crate::VERSION);
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http_client,
            submit_url: submit_url.into(),
        })
    }

    pub fn submit_url(&self) -> &str {
        &self.submit_url
    }

    async fn post(&self, payload: &SubmissionPayload) -> SubmitOutcome {
        let body = match gzip_compress(payload.body.as_bytes()) {
            Ok(body) => body,
            Err(e) => return SubmitOutcome::TransportError(e.to_string()),
        };

        tracing::debug!(
            url = %self.submit_url,
            records = payload.len(),
            raw_bytes = payload.body.len(),
            compressed_bytes = body.len(),
            "Posting submission"
        );

        let response = match self
            .http_client
            .post(&self.submit_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SubmitOutcome::TransportError(e.to_string()),
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return SubmitOutcome::TransportError(e.to_string()),
        };

        classify_response(status, &text)
    }
}

#[async_trait]
impl SubmissionTransport for AcoustIdClient {
    async fn submit(&self, payload: &SubmissionPayload) -> SubmitOutcome {
        let outcome = self.post(payload).await;
        match &outcome {
            SubmitOutcome::Accepted => {
                tracing::debug!(records = payload.len(), "Submission accepted")
            }
            SubmitOutcome::Rejected { kind, message } => {
                tracing::warn!(?kind, %message, "Submission rejected")
            }
            SubmitOutcome::TransportError(message) => {
                tracing::warn!(%message, "Submission transport error")
            }
        }
        outcome
    }
}

/// Map an HTTP reply to a submission outcome
///
/// - 2xx with `"status": "ok"` (or a non-JSON body) is accepted
/// - 401, the unknown-user-key text, or error code 6 is an authentication rejection
/// - other 4xx, or 2xx with `"status": "error"`, is a plain rejection
/// - 5xx and anything else is a transport error
pub fn classify_response(status: u16, body: &str) -> SubmitOutcome {
    let parsed: Option<SubmitResponse> = serde_json::from_str(body).ok();
    let is_success = (200..300).contains(&status);

    if is_success && parsed.as_ref().map_or(true, |r| r.status != "error") {
        return SubmitOutcome::Accepted;
    }

    if (500..600).contains(&status) {
        return SubmitOutcome::TransportError(format!("HTTP {}: {}", status, summarize(body)));
    }

    if !is_success && !(400..500).contains(&status) {
        return SubmitOutcome::TransportError(format!("Unexpected HTTP status {}", status));
    }

    let error = parsed.as_ref().and_then(|r| r.error.as_ref());
    let message = error
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| summarize(body));

    let is_auth = status == 401
        || body.contains(UNKNOWN_USER_KEY_MARKER)
        || error.and_then(|e| e.code) == Some(ERROR_CODE_INVALID_USER_KEY)
        || message.to_lowercase().contains("invalid user api key");

    let kind = if is_auth {
        RejectionKind::Authentication
    } else {
        RejectionKind::Other
    };
    SubmitOutcome::Rejected { kind, message }
}

fn summarize(body: &str) -> String {
    const MAX_LEN: usize = 200;
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

fn gzip_compress(data: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
