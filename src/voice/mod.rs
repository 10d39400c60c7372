//! Voice interaction loop
//!
//! Capture -> silence-bounded utterance -> remote transcription -> remote
//! response synthesis -> playback, repeated until deactivated. See
//! `orchestrator` for the state machine that ties the stages together.

mod capture;
mod orchestrator;
mod playback;
mod policy;
mod respond;
mod session;
mod transcribe;
mod vad;

pub use capture::{AudioCapture, AudioSegment, SAMPLE_RATE, peak_deviation, samples_to_wav};
pub use orchestrator::{Captured, Listener, MicListener, Player, Responder, Transcriber, VoiceLoop};
pub use playback::{PlaybackController, Settled};
pub use policy::{ErrorPolicy, FailureKind};
pub use respond::{ResponseClient, SynthesizedReply};
pub use session::{Phase, VoiceSession, VoiceSwitch};
pub use transcribe::TranscriptionClient;
pub use vad::{SilenceTracker, VadOutcome, watch_for_boundary};
