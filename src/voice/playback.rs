//! Audio playback to speakers
//!
//! Playback completion is settled by a race over independent signals: no
//! single completion notification is reliably delivered across audio
//! backends and durations, so the controller combines the stream's own
//! end-of-samples notification, a position poll, a duration-derived timer,
//! an absolute ceiling, and the error path. The race resolves exactly once
//! and the output stream is released exactly once, whichever signal wins.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio::sync::{oneshot, watch};

use crate::config::PlaybackTimings;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// How a playback attempt settled
///
/// `play` always resolves to one of these; it never hangs and never
/// "rejects". Only `Failed` counts as a classified failure upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    /// The output callback delivered the final sample
    Ended,
    /// The position poll observed playback within the tail window of the
    /// total duration
    PositionReached,
    /// The duration-derived timer elapsed first
    DurationTimer,
    /// The absolute ceiling elapsed with no other signal
    Ceiling,
    /// Voice mode was switched off mid-playback
    Cancelled,
    /// The audio resource failed to decode or play
    Failed(String),
}

impl Settled {
    /// Whether this settlement completes a cycle successfully
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Ended | Self::PositionReached | Self::DurationTimer | Self::Ceiling
        )
    }
}

/// Plays synthesized audio to the default output device
pub struct PlaybackController {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    timings: PlaybackTimings,
}

impl PlaybackController {
    /// Create a new playback controller
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if no suitable output device is available
    pub fn new(timings: PlaybackTimings) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Playback(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Playback("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device,
            config,
            timings,
        })
    }

    /// Play synthesized audio and settle exactly once
    ///
    /// Decode and device failures settle as [`Settled::Failed`] rather than
    /// erroring; deactivation mid-playback settles as [`Settled::Cancelled`].
    /// The transient output stream is dropped before this returns.
    #[allow(clippy::future_not_send)] // cpal streams are not Send
    pub async fn play(&mut self, audio: &[u8], active: &mut watch::Receiver<bool>) -> Settled {
        let samples = match decode_audio(audio) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "audio decode failed");
                return Settled::Failed(e.to_string());
            }
        };

        if samples.is_empty() {
            return Settled::Ended;
        }

        let total_samples = samples.len();
        let position = Arc::new(AtomicUsize::new(0));
        let (ended_tx, ended_rx) = oneshot::channel::<()>();
        let (failed_tx, failed_rx) = oneshot::channel::<String>();

        let stream = {
            let host = cpal::default_host();
            let device = match host.default_output_device() {
                Some(d) => d,
                None => return Settled::Failed("no output device".to_string()),
            };

            let config = self.config.clone();
            let channels = config.channels as usize;
            let samples = Arc::new(samples);
            let position = Arc::clone(&position);
            let ended_tx = Arc::new(Mutex::new(Some(ended_tx)));
            let failed_tx = Arc::new(Mutex::new(Some(failed_tx)));
            let failed_cb = Arc::clone(&failed_tx);

            let built = device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);

                    for frame in data.chunks_mut(channels) {
                        let sample = if pos < samples.len() {
                            let s = samples[pos];
                            pos += 1;
                            s
                        } else {
                            0.0
                        };
                        for out in frame.iter_mut() {
                            *out = sample;
                        }
                    }

                    position.store(pos, Ordering::Relaxed);

                    if pos >= samples.len() {
                        if let Ok(mut guard) = ended_tx.lock() {
                            if let Some(tx) = guard.take() {
                                let _ = tx.send(());
                            }
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio playback error");
                    if let Ok(mut guard) = failed_cb.lock() {
                        if let Some(tx) = guard.take() {
                            let _ = tx.send(err.to_string());
                        }
                    }
                },
                None,
            );

            match built {
                Ok(stream) => match stream.play() {
                    Ok(()) => stream,
                    Err(e) => return Settled::Failed(e.to_string()),
                },
                Err(e) => return Settled::Failed(e.to_string()),
            }
        };

        let settled = await_settlement(
            ended_rx,
            failed_rx,
            position,
            total_samples,
            PLAYBACK_SAMPLE_RATE,
            &self.timings,
            active,
        )
        .await;

        // Exactly-once resource release, on every settlement path
        drop(stream);
        tracing::debug!(?settled, samples = total_samples, "playback settled");

        settled
    }
}

/// Race the independent completion signals to a single settlement
///
/// Settles on the first of: end-of-samples notification, position within the
/// tail window of the duration, the duration-derived timer
/// (`max(duration + pad, min_duration_timer)`), the absolute ceiling, a
/// playback error, or deactivation of voice mode.
pub(crate) async fn await_settlement(
    ended: oneshot::Receiver<()>,
    failed: oneshot::Receiver<String>,
    position: Arc<AtomicUsize>,
    total_samples: usize,
    sample_rate: u32,
    timings: &PlaybackTimings,
    active: &mut watch::Receiver<bool>,
) -> Settled {
    let duration_ms = samples_to_ms(total_samples, sample_rate);

    let duration_timer = tokio::time::sleep(Duration::from_millis(
        (duration_ms + timings.duration_pad_ms).max(timings.min_duration_timer_ms),
    ));
    let ceiling = tokio::time::sleep(Duration::from_millis(timings.ceiling_ms));

    let mut poll = tokio::time::interval(Duration::from_millis(timings.poll_interval_ms));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // first tick fires immediately; skip it so a fresh stream isn't measured at position 0
    poll.tick().await;

    // A dropped sender must leave its branch pending, not spin the race
    let ended = async move {
        if ended.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let failed = async move {
        match failed.await {
            Ok(msg) => msg,
            Err(_) => std::future::pending().await,
        }
    };

    tokio::pin!(duration_timer, ceiling, ended, failed);

    loop {
        tokio::select! {
            () = &mut ended => return Settled::Ended,
            msg = &mut failed => return Settled::Failed(msg),
            () = &mut duration_timer => return Settled::DurationTimer,
            () = &mut ceiling => return Settled::Ceiling,
            changed = active.changed() => {
                if changed.is_err() || !*active.borrow() {
                    return Settled::Cancelled;
                }
            }
            _ = poll.tick() => {
                let played_ms = samples_to_ms(position.load(Ordering::Relaxed), sample_rate);
                if played_ms + timings.tail_window_ms >= duration_ms {
                    return Settled::PositionReached;
                }
            }
        }
    }
}

/// Convert a sample count at the given rate to milliseconds
const fn samples_to_ms(samples: usize, sample_rate: u32) -> u64 {
    (samples as u64).saturating_mul(1000) / sample_rate as u64
}

/// Decode synthesized audio bytes to mono f32 samples
///
/// Accepts WAV (RIFF header) or MP3.
fn decode_audio(data: &[u8]) -> Result<Vec<f32>> {
    if data.starts_with(b"RIFF") {
        decode_wav(data)
    } else {
        decode_mp3(data)
    }
}

/// Decode WAV bytes to mono f32 samples
fn decode_wav(data: &[u8]) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = f32::from(i16::MAX);
            reader
                .samples::<i16>()
                .map(|s| s.map(|v| f32::from(v) / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?,
    };

    if spec.channels == 2 {
        // Stereo: average channels
        Ok(samples
            .chunks(2)
            .map(|pair| f32::midpoint(pair[0], *pair.get(1).unwrap_or(&pair[0])))
            .collect())
    } else {
        Ok(samples)
    }
}

/// Decode MP3 bytes to mono f32 samples
fn decode_mp3(mp3_data: &[u8]) -> Result<Vec<f32>> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let frame_samples: Vec<f32> = if frame.channels == 2 {
                    // Stereo: average channels
                    frame
                        .data
                        .chunks(2)
                        .map(|chunk| {
                            let left = f32::from(chunk[0]) / 32768.0;
                            let right =
                                f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                            f32::midpoint(left, right)
                        })
                        .collect()
                } else {
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect()
                };

                samples.extend(frame_samples);
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        }
    }

    // minimp3 skips undecodable bytes until EOF; no frames means broken audio
    if samples.is_empty() {
        return Err(Error::Playback("no decodable audio frames".to_string()));
    }

    Ok(samples)
}
