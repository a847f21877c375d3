//! Narration audio - PCM decoding, output devices and the playback controller
//!
//! The speech service returns raw 16-bit PCM as base64. [`decoder`] turns it
//! into an [`AudioBuffer`], [`output`] puts a buffer on a device, and
//! [`playback`] sequences one narration session at a time.

pub mod decoder;
pub mod output;
pub mod playback;
pub mod tts;

use std::time::Duration;

use thiserror::Error;

/// Sample rate of synthesized narration
pub const NARRATION_SAMPLE_RATE: u32 = 24_000;

/// Channel count of synthesized narration
pub const NARRATION_CHANNELS: u16 = 1;

/// Why a narration session ended without (or before) playing
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NarrationError {
    #[error("audio decode failed: {0}")]
    Decode(String),
    #[error("speech service returned no audio")]
    NoAudio,
    #[error("speech synthesis failed: {0}")]
    Gateway(String),
    #[error("audio device error: {0}")]
    Device(String),
}

/// Decoded PCM, one `Vec<f32>` per channel, samples in [-1.0, 1.0)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Frame-interleaved samples (c0 c1 c0 c1 ...), as output devices expect
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel.get(i).copied().unwrap_or(0.0));
            }
        }
        out
    }
}

/// Encode a buffer as a 16-bit PCM WAV file
pub fn encode_wav(buffer: &AudioBuffer) -> Vec<u8> {
    let channels = buffer.channel_count().max(1);
    let samples = buffer.interleaved();
    let data_size = samples.len() * 2;
    let file_size = 36 + data_size;
    let block_align = channels * 2;

    let mut buf = Vec::with_capacity(44 + data_size);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(file_size as u32).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    buf.extend_from_slice(&(buffer.sample_rate * block_align as u32).to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&(data_size as u32).to_le_bytes());

    for sample in samples {
        let scaled = (sample * 32768.0)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32);
        buf.extend_from_slice(&(scaled as i16).to_le_bytes());
    }

    buf
}
