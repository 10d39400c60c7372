//! Response synthesis client
//!
//! Sends recognized text to the remote response endpoint and receives
//! synthesized audio plus a display label. The label travels in a response
//! header — plain for ASCII, base64 for anything else — and is decoded
//! defensively: a bad label degrades to a placeholder, never fails the cycle.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::HeaderMap;

use crate::{Error, Result};

/// Header carrying the plain-text reply label
const LABEL_HEADER: &str = "x-reply-text";

/// Header carrying the base64-encoded reply label (wins when present)
const LABEL_HEADER_B64: &str = "x-reply-text-b64";

/// Placeholder shown when the label cannot be decoded
const LABEL_FALLBACK: &str = "[voice reply]";

/// Synthesized audio plus its display label
#[derive(Debug)]
pub struct SynthesizedReply {
    /// Audio bytes (MP3 or WAV)
    pub audio: Vec<u8>,
    /// Decoded display text, or the placeholder
    pub text: String,
}

/// Request body for the response endpoint
#[derive(serde::Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Sends recognized text to the remote response-synthesis service
pub struct ResponseClient {
    client: reqwest::Client,
    base_url: String,
}

impl ResponseClient {
    /// Create a new response client
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Request a synthesized reply for the recognized text
    ///
    /// # Errors
    ///
    /// Returns `Error::Transmission` on non-success status or network failure
    pub async fn respond(&self, text: &str) -> Result<SynthesizedReply> {
        tracing::debug!(chars = text.len(), "requesting response");

        let response = self
            .client
            .post(format!("{}/speak", self.base_url))
            .json(&SpeakRequest { text })
            .send()
            .await
            .map_err(|e| Error::Transmission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "response service error");
            return Err(Error::Transmission(format!("speak error {status}: {body}")));
        }

        let label = decode_label(response.headers());
        let audio = response.bytes().await?.to_vec();

        tracing::info!(audio_bytes = audio.len(), label = %label, "response received");
        Ok(SynthesizedReply { audio, text: label })
    }
}

/// Decode the reply label from response headers
///
/// Prefers the base64 header (headers cannot carry raw non-ASCII); falls back
/// to the plain header; any decode failure yields the placeholder.
fn decode_label(headers: &HeaderMap) -> String {
    if let Some(value) = headers.get(LABEL_HEADER_B64) {
        let decoded = value
            .to_str()
            .ok()
            .and_then(|raw| BASE64.decode(raw.trim()).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok());
        return match decoded {
            Some(text) => text,
            None => {
                tracing::debug!("reply label base64 decode failed, using placeholder");
                LABEL_FALLBACK.to_string()
            }
        };
    }

    if let Some(value) = headers.get(LABEL_HEADER) {
        return match value.to_str() {
            Ok(text) => text.to_string(),
            Err(_) => {
                tracing::debug!("reply label not valid header text, using placeholder");
                LABEL_FALLBACK.to_string()
            }
        };
    }

    LABEL_FALLBACK.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn plain_label_decodes() {
        let mut headers = HeaderMap::new();
        headers.insert(LABEL_HEADER, HeaderValue::from_static("all good"));
        assert_eq!(decode_label(&headers), "all good");
    }

    #[test]
    fn base64_label_wins_and_survives_non_ascii() {
        let mut headers = HeaderMap::new();
        headers.insert(LABEL_HEADER, HeaderValue::from_static("plain"));
        let encoded = BASE64.encode("הכל טוב".as_bytes());
        headers.insert(LABEL_HEADER_B64, HeaderValue::from_str(&encoded).unwrap());

        assert_eq!(decode_label(&headers), "הכל טוב");
    }

    #[test]
    fn bad_base64_degrades_to_placeholder() {
        let mut headers = HeaderMap::new();
        headers.insert(LABEL_HEADER_B64, HeaderValue::from_static("!!not-base64!!"));
        assert_eq!(decode_label(&headers), LABEL_FALLBACK);
    }

    #[test]
    fn invalid_utf8_degrades_to_placeholder() {
        let mut headers = HeaderMap::new();
        let encoded = BASE64.encode([0xff, 0xfe, 0xfd]);
        headers.insert(LABEL_HEADER_B64, HeaderValue::from_str(&encoded).unwrap());
        assert_eq!(decode_label(&headers), LABEL_FALLBACK);
    }

    #[test]
    fn missing_label_degrades_to_placeholder() {
        assert_eq!(decode_label(&HeaderMap::new()), LABEL_FALLBACK);
    }
}
