//! voxloop - client-side voice interaction loop for AI assistants
//!
//! Continuously captures spoken audio, detects the end of each utterance,
//! ships it to a remote transcription service, forwards the recognized text
//! to a remote response-synthesis service, plays the returned audio, and
//! repeats until deactivated.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  VoiceLoop (orchestrator)             │
//! │   Listening  │  Processing  │  Playing  │  backoff   │
//! └──────┬───────────────┬────────────┬─────────────────┘
//!        │               │            │
//!   AudioCapture    Transcription  Playback
//!   + silence VAD   + Response     (settlement race)
//!   (cpal)          (HTTP)         (cpal)
//! ```
//!
//! Speech recognition and synthesis happen remotely; this crate only moves
//! audio and text across that boundary. Conversation history lives in an
//! in-memory transcript shared with the plain text-submit path.

pub mod chat;
pub mod config;
pub mod error;
pub mod transcript;
pub mod voice;

pub use chat::ChatClient;
pub use config::{Config, PlaybackTimings, VoiceConfig};
pub use error::{Error, Result};
pub use transcript::{ConversationMessage, Sender, SharedTranscript, Transcript};
pub use voice::{
    MicListener, PlaybackController, ResponseClient, TranscriptionClient, VoiceLoop, VoiceSwitch,
};
