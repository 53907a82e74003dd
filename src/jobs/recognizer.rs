//! Recognition service client.
//!
//! The face search itself happens in an external service. The executor only
//! sees the [`Recognizer`] trait; [`HttpRecognizer`] speaks the service's
//! JSON protocol over reqwest.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::payload::ImagePayload;
use crate::error::UpstreamError;

/// Longest slice of an unparsable body quoted back in diagnostics.
const SNIPPET_LEN: usize = 120;

/// A ranked candidate returned by the recognition service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedMatch {
    /// Displayable thumbnail (usually a data URI). Matches without one are skipped.
    #[serde(default, alias = "data")]
    pub data_uri: Option<String>,
    pub score: f64,
    /// Reference to the source photo.
    #[serde(default)]
    pub original: String,
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    matches: Vec<RecognizedMatch>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    image: &'a str,
    mime: &'static str,
    top_k: usize,
}

/// Something that can rank faces similar to a selfie.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn search(
        &self,
        image: &ImagePayload,
        top_k: usize,
    ) -> Result<Vec<RecognizedMatch>, UpstreamError>;
}

/// Recognition service reached over HTTP.
pub struct HttpRecognizer {
    url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpRecognizer {
    pub fn new(url: impl Into<String>, token: Option<SecretString>) -> Self {
        Self {
            url: url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    async fn search(
        &self,
        image: &ImagePayload,
        top_k: usize,
    ) -> Result<Vec<RecognizedMatch>, UpstreamError> {
        let encoded = image.to_base64();
        let mut request = self.client.post(&self.url).json(&SearchRequest {
            image: &encoded,
            mime: image.format.mime(),
            top_k,
        });
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        parse_reply(&body)
    }
}

/// Parse a search reply. Anything that isn't the expected JSON shape (raw
/// text from a misbehaving service, HTML error pages) is an upstream error.
pub fn parse_reply(body: &str) -> Result<Vec<RecognizedMatch>, UpstreamError> {
    serde_json::from_str::<SearchReply>(body)
        .map(|reply| reply.matches)
        .map_err(|e| {
            tracing::debug!(error = %e, "Recognition reply did not parse");
            UpstreamError::InvalidResponse(snippet(body))
        })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| snippet(body))
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > SNIPPET_LEN {
        let cut: String = trimmed.chars().take(SNIPPET_LEN).collect();
        format!("{cut}…")
    } else {
        trimmed.to_string()
    }
}
