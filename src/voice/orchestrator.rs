//! Voice loop orchestration
//!
//! One top-level scheduler loop drives the iteration state machine
//! (`Idle -> Listening -> Processing -> Playing -> Idle`), re-reading the
//! active flag before every transition. Stages sit behind trait seams so the
//! loop can be exercised with in-memory fakes; production impls wire the
//! microphone listener, the two HTTP clients, and the cpal playback
//! controller.
//!
//! Stages are awaited strictly sequentially, so single-flight (never two
//! live captures or playbacks) is structural rather than flag-guarded.
//! Resource release is likewise structural: each stage owns its device
//! stream and releases it on every exit path, including cancellation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::config::VoiceConfig;
use crate::transcript::SharedTranscript;
use crate::{Error, Result};

use super::capture::{AudioCapture, AudioSegment};
use super::playback::{PlaybackController, Settled};
use super::policy::ErrorPolicy;
use super::respond::{ResponseClient, SynthesizedReply};
use super::session::{Phase, VoiceSession, VoiceSwitch};
use super::transcribe::TranscriptionClient;
use super::vad::{self, VadOutcome};

/// Apology appended to the transcript on a recoverable failure
const APOLOGY_MESSAGE: &str = "Sorry, something went wrong. Let me try that again.";

/// Terminal message appended when the loop gives up
const ABORT_MESSAGE: &str =
    "I keep running into errors, so I'm switching voice mode off for now.";

/// Outcome of the listening stage
#[derive(Debug)]
pub enum Captured {
    /// A finished utterance segment
    Utterance(AudioSegment),
    /// Voice mode was switched off mid-capture
    Cancelled,
}

/// Listening stage: acquire the device, record until the utterance ends
#[async_trait(?Send)]
pub trait Listener {
    /// Capture one silence-bounded utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::Acquisition` if the device cannot be acquired
    async fn capture_utterance(&mut self, active: &mut watch::Receiver<bool>)
    -> Result<Captured>;
}

/// Transcription stage
#[async_trait]
pub trait Transcriber {
    /// Recognize text from a finished segment; blank text means no speech
    async fn transcribe(&self, segment: AudioSegment) -> Result<String>;
}

/// Response-synthesis stage
#[async_trait]
pub trait Responder {
    /// Fetch synthesized audio and a display label for recognized text
    async fn respond(&self, text: &str) -> Result<SynthesizedReply>;
}

/// Playback stage
#[async_trait(?Send)]
pub trait Player {
    /// Play synthesized audio; always settles, never rejects
    async fn play(&mut self, audio: &[u8], active: &mut watch::Receiver<bool>) -> Settled;
}

/// Production listening stage: cpal capture plus the silence sampler
pub struct MicListener {
    config: VoiceConfig,
}

impl MicListener {
    /// Create a listener with the given tuning
    #[must_use]
    pub const fn new(config: VoiceConfig) -> Self {
        Self { config }
    }
}

#[async_trait(?Send)]
impl Listener for MicListener {
    async fn capture_utterance(
        &mut self,
        active: &mut watch::Receiver<bool>,
    ) -> Result<Captured> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;

        match vad::watch_for_boundary(&capture, &self.config, active).await {
            VadOutcome::Deactivated => {
                capture.stop();
                Ok(Captured::Cancelled)
            }
            VadOutcome::Boundary => match capture.finish()? {
                Some(segment) => Ok(Captured::Utterance(segment)),
                None => Ok(Captured::Cancelled),
            },
        }
    }
}

#[async_trait]
impl Transcriber for TranscriptionClient {
    async fn transcribe(&self, segment: AudioSegment) -> Result<String> {
        Self::transcribe(self, segment).await
    }
}

#[async_trait]
impl Responder for ResponseClient {
    async fn respond(&self, text: &str) -> Result<SynthesizedReply> {
        Self::respond(self, text).await
    }
}

#[async_trait(?Send)]
impl Player for PlaybackController {
    async fn play(&mut self, audio: &[u8], active: &mut watch::Receiver<bool>) -> Settled {
        Self::play(self, audio, active).await
    }
}

/// How one iteration resolved
#[derive(Debug)]
enum Iteration {
    /// Full cycle: utterance heard, reply played
    Completed,
    /// Transcription came back blank; not a failure
    NoSpeech,
    /// Voice mode went off mid-iteration
    Cancelled,
    /// A stage surfaced a classified failure
    Failed(Error),
}

/// The repeating voice interaction loop
pub struct VoiceLoop<L, T, R, P> {
    session: VoiceSession,
    switch: VoiceSwitch,
    listener: L,
    transcriber: T,
    responder: R,
    player: P,
    transcript: SharedTranscript,
    policy: ErrorPolicy,
    resume_pause: Duration,
}

impl<L, T, R, P> VoiceLoop<L, T, R, P>
where
    L: Listener,
    T: Transcriber,
    R: Responder,
    P: Player,
{
    /// Build an active loop and the switch that toggles it off
    pub fn new(
        listener: L,
        transcriber: T,
        responder: R,
        player: P,
        transcript: SharedTranscript,
        config: &VoiceConfig,
    ) -> (Self, VoiceSwitch) {
        let (session, switch) = VoiceSession::new();
        let voice_loop = Self {
            session,
            switch: switch.clone(),
            listener,
            transcriber,
            responder,
            player,
            transcript,
            policy: ErrorPolicy::from_config(config),
            resume_pause: config.resume_pause,
        };
        (voice_loop, switch)
    }

    /// Run iterations until voice mode is deactivated or the error threshold
    /// is exceeded
    #[allow(clippy::future_not_send)] // capture/playback streams are not Send
    pub async fn run(mut self) {
        let mut active = self.session.active_flag();

        loop {
            if !self.session.is_active() {
                break;
            }

            // Abort check on entry: past the threshold the microphone is
            // never re-acquired
            if self.policy.should_abort(self.session.consecutive_errors) {
                tracing::warn!(
                    consecutive = self.session.consecutive_errors,
                    "error threshold exceeded, deactivating voice mode"
                );
                self.push_bot(ABORT_MESSAGE);
                self.switch.deactivate();
                break;
            }

            match self.run_iteration(&mut active).await {
                Iteration::Completed => {
                    self.session.consecutive_errors = 0;
                    self.pause(self.resume_pause, &mut active).await;
                }
                Iteration::NoSpeech => {
                    tracing::debug!("no speech detected, resuming listening");
                    self.pause(self.resume_pause, &mut active).await;
                }
                Iteration::Cancelled => break,
                Iteration::Failed(error) => {
                    self.session.consecutive_errors += 1;
                    let kind = ErrorPolicy::classify(&error);
                    tracing::warn!(
                        error = %error,
                        ?kind,
                        consecutive = self.session.consecutive_errors,
                        "voice cycle failed"
                    );
                    self.push_bot(APOLOGY_MESSAGE);
                    let delay = self.policy.backoff(self.session.consecutive_errors);
                    self.pause(delay, &mut active).await;
                }
            }
        }

        self.teardown();
    }

    /// One pass through the iteration state machine
    async fn run_iteration(&mut self, active: &mut watch::Receiver<bool>) -> Iteration {
        self.session.phase = Phase::Listening;
        let segment = match self.listener.capture_utterance(active).await {
            Ok(Captured::Utterance(segment)) => segment,
            Ok(Captured::Cancelled) => return Iteration::Cancelled,
            Err(error) => return self.fail(error),
        };

        if !self.session.is_active() {
            return Iteration::Cancelled;
        }

        self.session.phase = Phase::Processing;
        let text = match self.transcriber.transcribe(segment).await {
            Ok(text) => text,
            Err(error) => return self.fail(error),
        };

        if !self.session.is_active() {
            return Iteration::Cancelled;
        }

        let text = text.trim();
        if text.is_empty() {
            self.session.phase = Phase::Idle;
            return Iteration::NoSpeech;
        }
        self.push_user(text);

        let reply = match self.responder.respond(text).await {
            Ok(reply) => reply,
            Err(error) => return self.fail(error),
        };

        if !self.session.is_active() {
            return Iteration::Cancelled;
        }

        self.push_bot(&reply.text);

        self.session.phase = Phase::Playing;
        let settled = self.player.play(&reply.audio, active).await;
        self.session.phase = Phase::Idle;

        match settled {
            Settled::Cancelled => Iteration::Cancelled,
            Settled::Failed(reason) => Iteration::Failed(Error::Playback(reason)),
            _ => {
                if self.session.is_active() {
                    Iteration::Completed
                } else {
                    Iteration::Cancelled
                }
            }
        }
    }

    /// Mark the iteration failed; the phase returns to idle so the backoff
    /// pause never dwells in a mid-cycle phase
    fn fail(&mut self, error: Error) -> Iteration {
        self.session.phase = Phase::Idle;
        Iteration::Failed(error)
    }

    /// Sleep that wakes early on deactivation
    async fn pause(&self, duration: Duration, active: &mut watch::Receiver<bool>) {
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            _ = active.changed() => {}
        }
    }

    /// Cancellation epilogue: device streams are already released by their
    /// owning stages; what remains is resetting session state. Idempotent.
    fn teardown(&mut self) {
        self.session.reset();
        tracing::debug!("voice loop stopped");
    }

    fn push_user(&self, text: &str) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push_user(text);
        }
    }

    fn push_bot(&self, text: &str) {
        if let Ok(mut transcript) = self.transcript.lock() {
            transcript.push_bot(text);
        }
    }
}
