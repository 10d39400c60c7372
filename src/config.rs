//! Configuration management for voxloop
//!
//! Defaults, overlaid by an optional `config.toml` in the platform config
//! directory, overlaid by environment variables. All file fields are
//! optional — the file is a partial overlay on top of defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Environment variable overriding the server base URL
const SERVER_ENV: &str = "VOXLOOP_SERVER";

/// voxloop configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote transcription/response service
    pub server_url: String,

    /// Voice loop tuning
    pub voice: VoiceConfig,
}

/// Voice loop tuning knobs
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Amplitude threshold on the 0-127 peak-deviation scale below which a
    /// sample counts as silence
    pub silence_threshold: u8,

    /// Continuous quiet time that ends an utterance
    pub quiet_window: Duration,

    /// Cadence of the amplitude sampler (must not be coarser than 50ms)
    pub sample_interval: Duration,

    /// Pause before re-listening after a completed cycle or an empty
    /// transcription
    pub resume_pause: Duration,

    /// Consecutive failures tolerated before the loop aborts
    pub max_consecutive_errors: u32,

    /// Backoff added per consecutive failure
    pub backoff_step: Duration,

    /// Backoff ceiling
    pub backoff_cap: Duration,

    /// Playback settlement timing
    pub playback: PlaybackTimings,
}

/// Timing knobs for the playback settlement race
#[derive(Debug, Clone)]
pub struct PlaybackTimings {
    /// Position poll counts playback as done within this many ms of the
    /// total duration
    pub tail_window_ms: u64,

    /// Padding added to the duration-derived timer
    pub duration_pad_ms: u64,

    /// Floor for the duration-derived timer
    pub min_duration_timer_ms: u64,

    /// Absolute ceiling independent of duration metadata
    pub ceiling_ms: u64,

    /// Position poll cadence
    pub poll_interval_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 5,
            quiet_window: Duration::from_millis(2000),
            sample_interval: Duration::from_millis(33),
            resume_pause: Duration::from_millis(500),
            max_consecutive_errors: 3,
            backoff_step: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(5000),
            playback: PlaybackTimings::default(),
        }
    }
}

impl Default for PlaybackTimings {
    fn default() -> Self {
        Self {
            tail_window_ms: 100,
            duration_pad_ms: 500,
            min_duration_timer_ms: 3000,
            ceiling_ms: 12_000,
            poll_interval_ms: 50,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5174".to_string(),
            voice: VoiceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration: defaults -> config file -> environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file exists but cannot be parsed
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = config_file_path() {
            if path.exists() {
                let raw = std::fs::read_to_string(&path)?;
                let file: ConfigFile = toml::from_str(&raw)?;
                config.apply_file(file);
                tracing::debug!(path = %path.display(), "loaded config file");
            }
        }

        if let Ok(url) = std::env::var(SERVER_ENV) {
            config.server_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlay a parsed config file onto the current values
    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(url) = file.server_url {
            self.server_url = url;
        }

        let v = file.voice;
        if let Some(t) = v.silence_threshold {
            self.voice.silence_threshold = t;
        }
        if let Some(ms) = v.quiet_window_ms {
            self.voice.quiet_window = Duration::from_millis(ms);
        }
        if let Some(ms) = v.sample_interval_ms {
            self.voice.sample_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = v.resume_pause_ms {
            self.voice.resume_pause = Duration::from_millis(ms);
        }
        if let Some(n) = v.max_consecutive_errors {
            self.voice.max_consecutive_errors = n;
        }
        if let Some(ms) = v.backoff_step_ms {
            self.voice.backoff_step = Duration::from_millis(ms);
        }
        if let Some(ms) = v.backoff_cap_ms {
            self.voice.backoff_cap = Duration::from_millis(ms);
        }
        if let Some(ms) = v.playback_ceiling_ms {
            self.voice.playback.ceiling_ms = ms;
        }
    }

    /// Check cross-field constraints
    fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(Error::Config("server_url must not be empty".to_string()));
        }
        if self.voice.sample_interval > Duration::from_millis(50) {
            return Err(Error::Config(
                "voice.sample_interval_ms must be 50ms or finer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform config file location (`~/.config/omni/voxloop/config.toml` on Linux)
fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "omni", "voxloop")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    /// Remote service base URL
    server_url: Option<String>,

    /// Voice loop tuning
    #[serde(default)]
    voice: VoiceFileConfig,
}

/// Voice tuning overlay
#[derive(Debug, Default, Deserialize)]
struct VoiceFileConfig {
    silence_threshold: Option<u8>,
    quiet_window_ms: Option<u64>,
    sample_interval_ms: Option<u64>,
    resume_pause_ms: Option<u64>,
    max_consecutive_errors: Option<u32>,
    backoff_step_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
    playback_ceiling_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_loop_contract() {
        let config = Config::default();
        assert_eq!(config.voice.silence_threshold, 5);
        assert_eq!(config.voice.quiet_window, Duration::from_millis(2000));
        assert_eq!(config.voice.max_consecutive_errors, 3);
        assert_eq!(config.voice.backoff_cap, Duration::from_millis(5000));
    }

    #[test]
    fn file_overlay_is_partial() {
        let file: ConfigFile = toml::from_str(
            r#"
            server_url = "http://voice.local:9000"

            [voice]
            quiet_window_ms = 1500
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.apply_file(file);

        assert_eq!(config.server_url, "http://voice.local:9000");
        assert_eq!(config.voice.quiet_window, Duration::from_millis(1500));
        // untouched fields keep their defaults
        assert_eq!(config.voice.silence_threshold, 5);
    }

    #[test]
    fn sampler_cadence_is_validated() {
        let mut config = Config::default();
        config.voice.sample_interval = Duration::from_millis(80);
        assert!(config.validate().is_err());
    }
}
