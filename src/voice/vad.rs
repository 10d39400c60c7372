//! Utterance boundary detection
//!
//! Amplitude-threshold silence detection: an utterance ends once the peak
//! deviation stays below the threshold for a continuous quiet window. The
//! policy core is pure ([`SilenceTracker`]); [`watch_for_boundary`] wraps it
//! in a cancellable periodic sampler.

use std::time::{Duration, Instant};

use tokio::sync::watch;

use super::capture::AudioCapture;
use crate::config::VoiceConfig;

/// Why the sampler returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadOutcome {
    /// Continuous quiet for the configured window: the utterance is over
    Boundary,
    /// Voice mode was switched off mid-utterance
    Deactivated,
}

/// Pure silence-window policy
///
/// Feed it `(elapsed, level)` observations; it reports the boundary exactly
/// once per utterance.
#[derive(Debug)]
pub struct SilenceTracker {
    threshold: u8,
    quiet_window: Duration,
    silence_started: Option<Duration>,
    done: bool,
}

impl SilenceTracker {
    /// Create a tracker with the given threshold (0-127 scale) and quiet window
    #[must_use]
    pub const fn new(threshold: u8, quiet_window: Duration) -> Self {
        Self {
            threshold,
            quiet_window,
            silence_started: None,
            done: false,
        }
    }

    /// Observe one amplitude sample at `elapsed` since capture start.
    /// Returns true exactly once, when the quiet window completes.
    pub fn observe(&mut self, elapsed: Duration, level: u8) -> bool {
        if self.done {
            return false;
        }

        if level >= self.threshold {
            // utterance still ongoing
            self.silence_started = None;
            return false;
        }

        let started = *self.silence_started.get_or_insert(elapsed);
        if elapsed.saturating_sub(started) >= self.quiet_window {
            self.done = true;
            return true;
        }

        false
    }
}

/// Sample the capture's amplitude tap until the utterance ends or voice mode
/// is deactivated
///
/// Cadence comes from `config.sample_interval`. Deactivation wins over an
/// in-flight quiet window: the sampler returns immediately with no boundary
/// reported.
pub async fn watch_for_boundary(
    capture: &AudioCapture,
    config: &VoiceConfig,
    active: &mut watch::Receiver<bool>,
) -> VadOutcome {
    let mut tracker = SilenceTracker::new(config.silence_threshold, config.quiet_window);
    let started = Instant::now();
    let mut ticker = tokio::time::interval(config.sample_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            changed = active.changed() => {
                if changed.is_err() || !*active.borrow() {
                    return VadOutcome::Deactivated;
                }
            }
            _ = ticker.tick() => {
                if !*active.borrow() {
                    return VadOutcome::Deactivated;
                }
                let level = capture.peak_level();
                if tracker.observe(started.elapsed(), level) {
                    tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "utterance boundary");
                    return VadOutcome::Boundary;
                }
            }
        }
    }
}
