//! Audio capture from microphone

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// MIME tag attached to finalized segments
const SEGMENT_MIME: &str = "audio/wav";

/// One finished utterance's audio, ready for the transcription service
#[derive(Debug)]
pub struct AudioSegment {
    /// Encoded audio bytes
    pub bytes: Vec<u8>,
    /// Encoding tag
    pub mime: &'static str,
}

/// Captures audio from the default input device
///
/// While a stream is live, `peak_level` exposes an amplitude tap for the
/// silence detector. `finish` encodes the buffered samples into an
/// [`AudioSegment`] exactly once; `stop` releases the device without
/// producing a segment.
pub struct AudioCapture {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    tap: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns `Error::Acquisition` if no suitable input device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Acquisition("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Acquisition(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Acquisition("no suitable input config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            tap: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns `Error::Acquisition` if the stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let tap = Arc::clone(&self.tap);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Acquisition("no input device".to_string()))?;

        let config = self.config.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                    if let Ok(mut window) = tap.lock() {
                        window.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Acquisition(e.to_string()))?;

        stream.play().map_err(|e| Error::Acquisition(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Peak amplitude deviation seen since the previous poll, scaled to
    /// 0-127. Drains the tap window, so each call observes fresh samples.
    #[must_use]
    pub fn peak_level(&self) -> u8 {
        let samples = self
            .tap
            .lock()
            .map(|mut window| std::mem::take(&mut *window))
            .unwrap_or_default();
        peak_deviation(&samples)
    }

    /// Finalize the capture into an [`AudioSegment`]
    ///
    /// Releases the device stream. Idempotent: the first call returns the
    /// segment, later calls return `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if WAV encoding fails
    pub fn finish(&mut self) -> Result<Option<AudioSegment>> {
        let Some(stream) = self.stream.take() else {
            return Ok(None);
        };
        drop(stream);

        let samples = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        tracing::debug!(samples = samples.len(), "capture finalized");

        let bytes = samples_to_wav(&samples, SAMPLE_RATE)?;
        Ok(Some(AudioSegment {
            bytes,
            mime: SEGMENT_MIME,
        }))
    }

    /// Release the device stream and discard any buffered audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
        if let Ok(mut window) = self.tap.lock() {
            window.clear();
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Peak deviation of samples from the zero level, scaled to 0-127
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn peak_deviation(samples: &[f32]) -> u8 {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    (peak * 127.0).clamp(0.0, 127.0) as u8
}

/// Convert f32 samples to WAV bytes for the transcription service
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_deviation_scales_to_byte_range() {
        assert_eq!(peak_deviation(&[]), 0);
        assert_eq!(peak_deviation(&[0.0; 64]), 0);
        assert_eq!(peak_deviation(&[1.0]), 127);
        assert_eq!(peak_deviation(&[-1.0, 0.2]), 127);

        // threshold boundary: 5/127 ~= 0.0394
        assert!(peak_deviation(&[0.03]) < 5);
        assert!(peak_deviation(&[0.05]) >= 5);
    }

    #[test]
    fn wav_encoding_produces_riff_header() {
        let samples = vec![0.0f32, 0.5, -0.5, 0.25];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }
}
