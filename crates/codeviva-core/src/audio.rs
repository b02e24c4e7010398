//! Decoded speech audio.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Sample rate of the speech models' raw PCM output.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Interleaved floating-point samples ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioClip {
    /// Decode base64 signed 16-bit little-endian PCM.
    pub fn from_pcm16_base64(data: &str, sample_rate: u32, channels: u16) -> Result<Self> {
        let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .context("speech payload is not valid base64")?;
        Ok(Self::from_pcm16_bytes(&bytes, sample_rate, channels))
    }

    /// Convert raw PCM16 LE bytes. A trailing odd byte is dropped.
    pub fn from_pcm16_bytes(bytes: &[u8], sample_rate: u32, channels: u16) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect();
        Self {
            sample_rate,
            channels: channels.max(1),
            samples,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pcm16() {
        // i16 values 0, 16384, -32768
        let bytes = [0x00, 0x00, 0x00, 0x40, 0x00, 0x80];
        let encoded = STANDARD.encode(bytes);
        let clip = AudioClip::from_pcm16_base64(&encoded, SPEECH_SAMPLE_RATE, 1).unwrap();
        assert_eq!(clip.samples, vec![0.0, 0.5, -1.0]);
        assert_eq!(clip.frame_count(), 3);
    }

    #[test]
    fn duration_from_frames() {
        let clip = AudioClip::from_pcm16_bytes(&vec![0u8; 48_000], SPEECH_SAMPLE_RATE, 1);
        assert_eq!(clip.duration(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(AudioClip::from_pcm16_base64("%%%", SPEECH_SAMPLE_RATE, 1).is_err());
    }
}
