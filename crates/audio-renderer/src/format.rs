//! Output wave format and byte/time conversions.
//!
//! The renderer only produces interleaved 16-bit little-endian stereo PCM.
//! Every size the renderer hands out (reads, skips, silence) is a whole number
//! of frames, so the helpers here round down to the frame size.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RendererError, Result};

/// Bits per sample the renderer supports.
pub const BITS_PER_SAMPLE: u16 = 16;
/// Channel count the renderer supports.
pub const CHANNELS: u16 = 2;

/// Declared output format handed to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl OutputFormat {
    /// Validate and build a format.
    ///
    /// Anything other than 16-bit stereo at a non-zero rate is rejected.
    pub fn new(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Result<Self> {
        if bits_per_sample != BITS_PER_SAMPLE {
            return Err(RendererError::Configuration(format!(
                "{bits_per_sample}-bit output (only {BITS_PER_SAMPLE}-bit is supported)"
            )));
        }
        if channels != CHANNELS {
            return Err(RendererError::Configuration(format!(
                "{channels}-channel output (only stereo is supported)"
            )));
        }
        if sample_rate == 0 {
            return Err(RendererError::Configuration(
                "sample rate must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            bits_per_sample,
            channels,
        })
    }

    /// 16-bit stereo at `sample_rate`.
    pub fn stereo16(sample_rate: u32) -> Result<Self> {
        Self::new(sample_rate, BITS_PER_SAMPLE, CHANNELS)
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes in one frame (one sample per channel).
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.frame_size()
    }

    /// Round `bytes` down to a whole number of frames.
    pub fn align(&self, bytes: usize) -> usize {
        bytes - bytes % self.frame_size()
    }

    /// Frame-aligned byte count covering `duration`.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let raw = duration.as_nanos() * self.bytes_per_second() as u128 / 1_000_000_000;
        self.align(usize::try_from(raw).unwrap_or(usize::MAX))
    }

    /// Frame-aligned byte count covering `millis` milliseconds.
    ///
    /// Negative or non-finite inputs yield zero.
    pub fn bytes_for_millis(&self, millis: f64) -> usize {
        if !millis.is_finite() || millis <= 0.0 {
            return 0;
        }
        let raw = (millis / 1000.0 * self.bytes_per_second() as f64) as usize;
        self.align(raw)
    }

    /// Playback duration of `bytes`, in milliseconds.
    pub fn millis_for(&self, bytes: usize) -> f64 {
        bytes as f64 * 1000.0 / self.bytes_per_second() as f64
    }

    /// Playback duration of `bytes`.
    pub fn duration_for(&self, bytes: usize) -> Duration {
        let nanos = bytes as u128 * 1_000_000_000 / self.bytes_per_second() as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_16_bit() {
        let err = OutputFormat::new(48_000, 24, 2).unwrap_err();
        assert!(matches!(err, RendererError::Configuration(_)));
    }

    #[test]
    fn rejects_non_stereo() {
        assert!(OutputFormat::new(48_000, 16, 1).is_err());
        assert!(OutputFormat::new(48_000, 16, 6).is_err());
    }

    #[test]
    fn rejects_zero_rate() {
        assert!(OutputFormat::new(0, 16, 2).is_err());
    }

    #[test]
    fn stereo16_sizes() {
        let f = OutputFormat::stereo16(48_000).unwrap();
        assert_eq!(f.frame_size(), 4);
        assert_eq!(f.bytes_per_second(), 192_000);
    }

    #[test]
    fn bytes_for_is_frame_aligned() {
        let f = OutputFormat::stereo16(44_100).unwrap();
        for ms in [0.1, 1.0, 7.3, 10.0, 33.3, 200.0] {
            assert_eq!(f.bytes_for_millis(ms) % 4, 0, "ms={ms}");
        }
        assert_eq!(f.bytes_for(Duration::from_millis(10)), 1764);
    }

    #[test]
    fn bytes_for_negative_is_zero() {
        let f = OutputFormat::stereo16(48_000).unwrap();
        assert_eq!(f.bytes_for_millis(-5.0), 0);
        assert_eq!(f.bytes_for_millis(f64::NAN), 0);
    }

    #[test]
    fn millis_for_inverts_bytes_for() {
        let f = OutputFormat::stereo16(48_000).unwrap();
        assert!((f.millis_for(f.bytes_for_millis(50.0)) - 50.0).abs() < 1e-9);
        assert_eq!(f.duration_for(192_000), Duration::from_secs(1));
    }
}
