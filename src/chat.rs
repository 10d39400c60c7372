//! Text-submit chat path
//!
//! The plain (non-voice) way to talk to the remote service. Out of scope for
//! the voice loop itself; this client exists so both paths share one
//! transcript and one service boundary.

use futures::StreamExt;

use crate::{Error, Result};

/// Request body for the text endpoint
#[derive(serde::Serialize)]
struct TextRequest<'a> {
    prompt: &'a str,
}

/// Response from the text endpoint
#[derive(serde::Deserialize)]
struct TextResponse {
    reply: String,
}

/// Client for the text-submit path
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    /// Create a new chat client
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Send a prompt and return the full reply
    ///
    /// # Errors
    ///
    /// Returns `Error::Transmission` on non-success status or network failure
    pub async fn send(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/text", self.base_url))
            .json(&TextRequest { prompt })
            .send()
            .await
            .map_err(|e| Error::Transmission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transmission(format!("text error {status}: {body}")));
        }

        let result: TextResponse = response.json().await?;
        Ok(result.reply)
    }

    /// Send a prompt and stream the reply, invoking `on_chunk` for each
    /// decoded piece. Returns the accumulated reply.
    ///
    /// Chunks are decoded incrementally; a multi-byte UTF-8 sequence split
    /// across chunk boundaries is carried over to the next chunk.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transmission` on non-success status or stream failure
    pub async fn send_streaming(
        &self,
        prompt: &str,
        mut on_chunk: impl FnMut(&str),
    ) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/text/stream", self.base_url))
            .json(&TextRequest { prompt })
            .send()
            .await
            .map_err(|e| Error::Transmission(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transmission(format!(
                "text stream error {status}: {body}"
            )));
        }

        let mut reply = String::new();
        let mut carry: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Transmission(e.to_string()))?;
            carry.extend_from_slice(&chunk);
            let decoded = take_utf8_prefix(&mut carry);
            if !decoded.is_empty() {
                on_chunk(&decoded);
                reply.push_str(&decoded);
            }
        }

        // Anything left over is a truncated sequence; decode it lossily
        if !carry.is_empty() {
            let tail = String::from_utf8_lossy(&carry).into_owned();
            on_chunk(&tail);
            reply.push_str(&tail);
        }

        Ok(reply)
    }
}

/// Split off the longest valid UTF-8 prefix of `buf`, leaving any trailing
/// incomplete sequence in place
fn take_utf8_prefix(buf: &mut Vec<u8>) -> String {
    match std::str::from_utf8(buf) {
        Ok(s) => {
            let s = s.to_string();
            buf.clear();
            s
        }
        Err(e) => {
            let valid = e.valid_up_to();
            let s = String::from_utf8_lossy(&buf[..valid]).into_owned();
            buf.drain(..valid);
            s
        }
    }
}
