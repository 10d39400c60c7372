//! Voice loop integration tests
//!
//! Exercise the orchestrator against in-memory stage fakes, without audio
//! hardware or a network. Each fake counts its calls through a shared handle
//! so the assertions survive `run` consuming the loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use voxloop::voice::{
    AudioSegment, Captured, Listener, Player, Responder, Settled, SynthesizedReply, Transcriber,
    VoiceLoop,
};
use voxloop::{Error, Result, Sender, SharedTranscript, Transcript, VoiceConfig, VoiceSwitch};

/// Default tuning with sub-millisecond pauses so tests run fast
fn fast_config() -> VoiceConfig {
    VoiceConfig {
        resume_pause: Duration::from_millis(1),
        backoff_step: Duration::from_millis(1),
        backoff_cap: Duration::from_millis(3),
        ..VoiceConfig::default()
    }
}

fn segment() -> AudioSegment {
    AudioSegment {
        bytes: vec![0u8; 16],
        mime: "audio/wav",
    }
}

fn texts(transcript: &SharedTranscript) -> Vec<(Sender, String)> {
    transcript
        .lock()
        .unwrap()
        .messages()
        .iter()
        .map(|m| (m.sender, m.text.clone()))
        .collect()
}

/// Listener serving a fixed number of utterances, then reporting cancellation
/// (standing in for the user toggling voice mode off mid-capture)
struct ScriptedListener {
    remaining: usize,
    acquisitions: Arc<AtomicUsize>,
}

impl ScriptedListener {
    fn new(utterances: usize) -> (Self, Arc<AtomicUsize>) {
        let acquisitions = Arc::new(AtomicUsize::new(0));
        (
            Self {
                remaining: utterances,
                acquisitions: Arc::clone(&acquisitions),
            },
            acquisitions,
        )
    }
}

#[async_trait(?Send)]
impl Listener for ScriptedListener {
    async fn capture_utterance(
        &mut self,
        _active: &mut watch::Receiver<bool>,
    ) -> Result<Captured> {
        if self.remaining == 0 {
            return Ok(Captured::Cancelled);
        }
        self.remaining -= 1;
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(Captured::Utterance(segment()))
    }
}

/// Listener that blocks until deactivation, like a mic hearing only silence
struct WaitingListener;

#[async_trait(?Send)]
impl Listener for WaitingListener {
    async fn capture_utterance(
        &mut self,
        active: &mut watch::Receiver<bool>,
    ) -> Result<Captured> {
        loop {
            if !*active.borrow() {
                return Ok(Captured::Cancelled);
            }
            if active.changed().await.is_err() {
                return Ok(Captured::Cancelled);
            }
        }
    }
}

/// Transcriber returning the same text for every segment
struct FixedTranscriber(String);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _segment: AudioSegment) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Transcriber whose every round-trip fails
struct FailingTranscriber;

#[async_trait]
impl Transcriber for FailingTranscriber {
    async fn transcribe(&self, _segment: AudioSegment) -> Result<String> {
        Err(Error::Transmission("transcribe: 500".to_string()))
    }
}

/// Slot for a switch that only exists once the loop is built
type SwitchSlot = Arc<Mutex<Option<VoiceSwitch>>>;

/// Transcriber that deactivates voice mode before returning its result,
/// simulating a toggle-off landing mid-round-trip
struct DeactivatingTranscriber {
    slot: SwitchSlot,
}

#[async_trait]
impl Transcriber for DeactivatingTranscriber {
    async fn transcribe(&self, _segment: AudioSegment) -> Result<String> {
        if let Some(switch) = self.slot.lock().unwrap().as_ref() {
            switch.deactivate();
        }
        Ok("too late".to_string())
    }
}

/// Responder returning fixed audio and label
struct FixedResponder {
    text: String,
    calls: Arc<AtomicUsize>,
}

impl FixedResponder {
    fn new(text: &str) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                text: text.to_string(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl Responder for FixedResponder {
    async fn respond(&self, _text: &str) -> Result<SynthesizedReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SynthesizedReply {
            audio: vec![1u8; 8],
            text: self.text.clone(),
        })
    }
}

/// Responder whose every round-trip fails
struct FailingResponder;

#[async_trait]
impl Responder for FailingResponder {
    async fn respond(&self, _text: &str) -> Result<SynthesizedReply> {
        Err(Error::Transmission("speak: 500".to_string()))
    }
}

/// Player settling every attempt with a fixed outcome
struct ScriptedPlayer {
    outcome: Settled,
    plays: Arc<AtomicUsize>,
}

impl ScriptedPlayer {
    fn new(outcome: Settled) -> (Self, Arc<AtomicUsize>) {
        let plays = Arc::new(AtomicUsize::new(0));
        (
            Self {
                outcome,
                plays: Arc::clone(&plays),
            },
            plays,
        )
    }
}

#[async_trait(?Send)]
impl Player for ScriptedPlayer {
    async fn play(&mut self, _audio: &[u8], _active: &mut watch::Receiver<bool>) -> Settled {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

#[tokio::test]
async fn full_cycle_logs_both_sides_and_plays_once() {
    let transcript = Transcript::shared();
    let (listener, _acquisitions) = ScriptedListener::new(1);
    let (responder, _calls) = FixedResponder::new("הכל טוב");
    let (player, plays) = ScriptedPlayer::new(Settled::Ended);

    let (voice_loop, _switch) = VoiceLoop::new(
        listener,
        FixedTranscriber("שלום".to_string()),
        responder,
        player,
        transcript.clone(),
        &fast_config(),
    );
    voice_loop.run().await;

    let messages = texts(&transcript);
    assert_eq!(
        messages,
        vec![
            (Sender::User, "שלום".to_string()),
            (Sender::Bot, "הכל טוב".to_string()),
        ]
    );
    assert_eq!(plays.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blank_transcription_is_skipped_without_penalty() {
    let transcript = Transcript::shared();
    // more blank cycles than the error threshold allows: if blanks were
    // counted as failures, the loop would have appended an abort message
    let (listener, acquisitions) = ScriptedListener::new(5);
    let (responder, calls) = FixedResponder::new("unused");
    let (player, plays) = ScriptedPlayer::new(Settled::Ended);

    let (voice_loop, _switch) = VoiceLoop::new(
        listener,
        FixedTranscriber("   ".to_string()),
        responder,
        player,
        transcript.clone(),
        &fast_config(),
    );
    voice_loop.run().await;

    assert_eq!(acquisitions.load(Ordering::SeqCst), 5);
    assert!(transcript.lock().unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(plays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn response_failure_appends_apology_after_user_text() {
    let transcript = Transcript::shared();
    let (listener, _acquisitions) = ScriptedListener::new(1);
    let (player, plays) = ScriptedPlayer::new(Settled::Ended);

    let (voice_loop, _switch) = VoiceLoop::new(
        listener,
        FixedTranscriber("hello".to_string()),
        FailingResponder,
        player,
        transcript.clone(),
        &fast_config(),
    );
    voice_loop.run().await;

    let messages = texts(&transcript);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], (Sender::User, "hello".to_string()));
    assert_eq!(messages[1].0, Sender::Bot);
    assert!(messages[1].1.contains("Sorry"));
    assert_eq!(plays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn loop_aborts_after_error_threshold_without_reacquiring() {
    let transcript = Transcript::shared();
    let (listener, acquisitions) = ScriptedListener::new(usize::MAX);
    let (responder, _calls) = FixedResponder::new("unused");
    let (player, _plays) = ScriptedPlayer::new(Settled::Ended);

    let (voice_loop, switch) = VoiceLoop::new(
        listener,
        FailingTranscriber,
        responder,
        player,
        transcript.clone(),
        &fast_config(),
    );
    voice_loop.run().await;

    // four failed attempts, then the fifth entry aborts before touching
    // the microphone again
    assert_eq!(acquisitions.load(Ordering::SeqCst), 4);
    assert!(!switch.is_active());

    let messages = texts(&transcript);
    assert_eq!(messages.len(), 5);
    for (sender, text) in &messages[..4] {
        assert_eq!(*sender, Sender::Bot);
        assert!(text.contains("Sorry"));
    }
    assert!(messages[4].1.contains("voice mode off"));
}

#[tokio::test]
async fn playback_failure_counts_as_a_failed_cycle() {
    let transcript = Transcript::shared();
    let (listener, _acquisitions) = ScriptedListener::new(1);
    let (responder, _calls) = FixedResponder::new("reply");
    let (player, plays) = ScriptedPlayer::new(Settled::Failed("device lost".to_string()));

    let (voice_loop, _switch) = VoiceLoop::new(
        listener,
        FixedTranscriber("hello".to_string()),
        responder,
        player,
        transcript.clone(),
        &fast_config(),
    );
    voice_loop.run().await;

    let messages = texts(&transcript);
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1], (Sender::Bot, "reply".to_string()));
    assert!(messages[2].1.contains("Sorry"));
    assert_eq!(plays.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn playback_cancellation_exits_without_apology() {
    let transcript = Transcript::shared();
    let (listener, acquisitions) = ScriptedListener::new(usize::MAX);
    let (responder, _calls) = FixedResponder::new("reply");
    let (player, _plays) = ScriptedPlayer::new(Settled::Cancelled);

    let (voice_loop, _switch) = VoiceLoop::new(
        listener,
        FixedTranscriber("hello".to_string()),
        responder,
        player,
        transcript.clone(),
        &fast_config(),
    );
    voice_loop.run().await;

    // no further capture after the cancelled playback, and no apology
    assert_eq!(acquisitions.load(Ordering::SeqCst), 1);
    let messages = texts(&transcript);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1], (Sender::Bot, "reply".to_string()));
}

#[tokio::test]
async fn deactivation_while_listening_stops_the_loop() {
    let transcript = Transcript::shared();
    let (responder, calls) = FixedResponder::new("unused");
    let (player, plays) = ScriptedPlayer::new(Settled::Ended);

    let (voice_loop, switch) = VoiceLoop::new(
        WaitingListener,
        FixedTranscriber("unused".to_string()),
        responder,
        player,
        transcript.clone(),
        &fast_config(),
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        switch.deactivate();
    });

    voice_loop.run().await;

    assert!(transcript.lock().unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(plays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn deactivation_mid_roundtrip_drops_the_result() {
    let transcript = Transcript::shared();
    let (listener, _acquisitions) = ScriptedListener::new(usize::MAX);
    let (responder, calls) = FixedResponder::new("unused");
    let (player, plays) = ScriptedPlayer::new(Settled::Ended);
    let slot: SwitchSlot = Arc::new(Mutex::new(None));

    let (voice_loop, switch) = VoiceLoop::new(
        listener,
        DeactivatingTranscriber {
            slot: Arc::clone(&slot),
        },
        responder,
        player,
        transcript.clone(),
        &fast_config(),
    );
    *slot.lock().unwrap() = Some(switch);

    voice_loop.run().await;

    // the recognized text arrived after deactivation and was discarded
    assert!(transcript.lock().unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(plays.load(Ordering::SeqCst), 0);
}
