//! Voice session state
//!
//! The [`VoiceSession`] is the single owner of loop state. The active flag is
//! backed by a watch channel so deactivation from outside (a UI toggle, the
//! Ctrl-C handler) wakes every suspended stage; all other fields are mutated
//! only by the orchestrator.

use tokio::sync::watch;

/// Phase of the current loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Between iterations
    #[default]
    Idle,
    /// Capture and silence detection are live
    Listening,
    /// Transcription and response round-trips are in flight
    Processing,
    /// Synthesized audio is playing
    Playing,
}

/// External handle that toggles voice mode off
///
/// Cloneable; deactivation is idempotent.
#[derive(Debug, Clone)]
pub struct VoiceSwitch {
    tx: watch::Sender<bool>,
}

impl VoiceSwitch {
    /// Switch voice mode off, waking every suspended stage
    pub fn deactivate(&self) {
        let _ = self.tx.send(false);
    }

    /// Whether voice mode is currently on
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Loop state owned by the orchestrator
#[derive(Debug)]
pub struct VoiceSession {
    /// Current phase of the iteration state machine
    pub phase: Phase,
    /// Classified failures since the last fully successful cycle
    pub consecutive_errors: u32,
    active: watch::Receiver<bool>,
}

impl VoiceSession {
    /// Create an active session and its external switch
    #[must_use]
    pub fn new() -> (Self, VoiceSwitch) {
        let (tx, rx) = watch::channel(true);
        (
            Self {
                phase: Phase::Idle,
                consecutive_errors: 0,
                active: rx,
            },
            VoiceSwitch { tx },
        )
    }

    /// Re-read the active flag (checked before every state transition)
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.active.borrow()
    }

    /// A fresh receiver for stages that select on deactivation
    #[must_use]
    pub fn active_flag(&self) -> watch::Receiver<bool> {
        self.active.clone()
    }

    /// Reset per-session counters and phase (part of the cancellation
    /// sequence; idempotent)
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.consecutive_errors = 0;
    }
}
