//! Transcription client
//!
//! Ships a finished utterance segment to the remote transcription endpoint
//! and returns the recognized text. An empty transcription is a valid result
//! (no speech), not a failure.

use crate::{Error, Result};

use super::capture::AudioSegment;

/// Response from the transcription endpoint
#[derive(serde::Deserialize)]
struct TranscribeResponse {
    transcription: String,
}

/// Sends utterance audio to the remote transcription service
pub struct TranscriptionClient {
    client: reqwest::Client,
    base_url: String,
}

impl TranscriptionClient {
    /// Create a new transcription client
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Transcribe a captured segment to text
    ///
    /// The segment is consumed; it is not retained after the call.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transmission` on non-success status or network failure
    pub async fn transcribe(&self, segment: AudioSegment) -> Result<String> {
        tracing::debug!(audio_bytes = segment.bytes.len(), "starting transcription");

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(segment.bytes)
                .file_name("utterance.wav")
                .mime_str(segment.mime)
                .map_err(|e| Error::Transmission(e.to_string()))?,
        );

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Transmission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription service error");
            return Err(Error::Transmission(format!(
                "transcribe error {status}: {body}"
            )));
        }

        let result: TranscribeResponse = response.json().await?;

        tracing::info!(transcript = %result.transcription, "transcription complete");
        Ok(result.transcription)
    }
}
