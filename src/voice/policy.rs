//! Failure classification and backoff policy
//!
//! Every surfaced stage failure is recoverable; the loop is the sole
//! recovery mechanism. Backoff grows linearly per consecutive failure and is
//! capped; exceeding the consecutive-failure threshold aborts the whole
//! voice mode.

use std::time::Duration;

use crate::Error;
use crate::config::VoiceConfig;

/// Recoverable failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Device or permission unavailable
    Acquisition,
    /// Remote call failed
    Transmission,
    /// Audio resource failed to play
    Playback,
    /// Anything else that surfaced from a stage
    Internal,
}

/// Backoff and abort policy for the voice loop
#[derive(Debug, Clone)]
pub struct ErrorPolicy {
    max_consecutive: u32,
    backoff_step: Duration,
    backoff_cap: Duration,
}

impl ErrorPolicy {
    /// Build the policy from voice configuration
    #[must_use]
    pub const fn from_config(config: &VoiceConfig) -> Self {
        Self {
            max_consecutive: config.max_consecutive_errors,
            backoff_step: config.backoff_step,
            backoff_cap: config.backoff_cap,
        }
    }

    /// Classify a surfaced error
    #[must_use]
    pub const fn classify(error: &Error) -> FailureKind {
        match error {
            Error::Acquisition(_) => FailureKind::Acquisition,
            Error::Transmission(_) | Error::Http(_) | Error::Serialization(_) => {
                FailureKind::Transmission
            }
            Error::Playback(_) => FailureKind::Playback,
            _ => FailureKind::Internal,
        }
    }

    /// Delay before the next iteration after `consecutive` failures
    #[must_use]
    pub fn backoff(&self, consecutive: u32) -> Duration {
        self.backoff_step
            .saturating_mul(consecutive)
            .min(self.backoff_cap)
    }

    /// Whether the loop must abort instead of starting another iteration
    #[must_use]
    pub const fn should_abort(&self, consecutive: u32) -> bool {
        consecutive > self.max_consecutive
    }
}
