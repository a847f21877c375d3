//! Base64 16-bit PCM decoding
//!
//! The caller states the sample rate and channel count; the stream carries
//! no header, so neither is detected or validated against the data.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use super::{AudioBuffer, NarrationError};

/// Decode base64 little-endian signed 16-bit PCM into normalized samples.
///
/// Samples are de-interleaved per channel and divided by 32768, so every
/// value lies in [-1.0, 1.0). A trailing partial frame is dropped.
pub fn decode_pcm16(
    base64: &str,
    sample_rate: u32,
    channels: u16,
) -> Result<AudioBuffer, NarrationError> {
    if channels == 0 {
        return Err(NarrationError::Decode("channel count must be at least 1".into()));
    }

    let bytes = STANDARD
        .decode(base64.trim())
        .map_err(|e| NarrationError::Decode(format!("invalid base64: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(NarrationError::Decode(format!(
            "PCM byte length {} is not a multiple of 2",
            bytes.len()
        )));
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let channel_count = channels as usize;
    let frames = samples.len() / channel_count;
    let decoded = (0..channel_count)
        .map(|channel| {
            (0..frames)
                .map(|i| samples[i * channel_count + channel] as f32 / 32768.0)
                .collect()
        })
        .collect();

    Ok(AudioBuffer::new(sample_rate, decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{NARRATION_CHANNELS, NARRATION_SAMPLE_RATE};

    fn encode(samples: &[i16]) -> String {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        STANDARD.encode(bytes)
    }

    fn decode_mono(samples: &[i16]) -> Vec<f32> {
        let buffer = decode_pcm16(&encode(samples), NARRATION_SAMPLE_RATE, NARRATION_CHANNELS)
            .expect("valid pcm");
        buffer.channels.into_iter().next().unwrap()
    }

    #[test]
    fn test_extreme_values() {
        assert_eq!(decode_mono(&[32767]), vec![32767.0 / 32768.0]);
        assert_eq!(decode_mono(&[-32768]), vec![-1.0]);
        assert_eq!(decode_mono(&[0]), vec![0.0]);
    }

    #[test]
    fn test_max_sample_is_close_to_one() {
        let v = decode_mono(&[i16::MAX])[0];
        assert!((v - 0.999969).abs() < 1e-6);
        assert!(v < 1.0);
    }

    #[test]
    fn test_sample_count_and_range() {
        let input: Vec<i16> = (0..2000).map(|i| (i * 37 % 65536 - 32768) as i16).collect();
        let out = decode_mono(&input);
        assert_eq!(out.len(), input.len());
        assert!(out.iter().all(|s| (-1.0..1.0).contains(s)));
    }

    #[test]
    fn test_little_endian_order() {
        // 0x0100 = 256, stored as [0x00, 0x01]
        let buffer = decode_pcm16(&STANDARD.encode([0x00u8, 0x01]), 24_000, 1).unwrap();
        assert_eq!(buffer.channels[0], vec![256.0 / 32768.0]);
    }

    #[test]
    fn test_deinterleave_stereo() {
        let buffer = decode_pcm16(&encode(&[100, -100, 200, -200, 300]), 48_000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channels[0], vec![100.0 / 32768.0, 200.0 / 32768.0]);
        assert_eq!(buffer.channels[1], vec![-100.0 / 32768.0, -200.0 / 32768.0]);
        assert_eq!(buffer.sample_rate, 48_000);
    }

    #[test]
    fn test_empty_payload() {
        let buffer = decode_pcm16("", NARRATION_SAMPLE_RATE, 1).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_surrounding_whitespace_ignored() {
        let payload = format!("  {}\n", encode(&[1, 2, 3]));
        let buffer = decode_pcm16(&payload, NARRATION_SAMPLE_RATE, 1).unwrap();
        assert_eq!(buffer.frames(), 3);
    }

    #[test]
    fn test_invalid_base64() {
        let err = decode_pcm16("not base64!!", NARRATION_SAMPLE_RATE, 1).unwrap_err();
        assert!(matches!(err, NarrationError::Decode(_)));
    }

    #[test]
    fn test_odd_byte_length() {
        let err = decode_pcm16(&STANDARD.encode([1u8, 2, 3]), NARRATION_SAMPLE_RATE, 1).unwrap_err();
        assert!(matches!(err, NarrationError::Decode(_)));
    }

    #[test]
    fn test_zero_channels() {
        let err = decode_pcm16(&encode(&[1, 2]), NARRATION_SAMPLE_RATE, 0).unwrap_err();
        assert!(matches!(err, NarrationError::Decode(_)));
    }
}
