use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::format::{BITS_PER_SAMPLE, CHANNELS, OutputFormat};
use crate::sync::SyncPolicy;

/// Renderer tuning parameters shared by ingestion, sync and the device.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output bit depth; only 16 is accepted.
    pub bits_per_sample: u16,
    /// Output channel count; only 2 is accepted.
    pub channels: u16,
    /// Target device latency in milliseconds.
    pub desired_latency_ms: u32,
    /// Number of device buffers the latency is split across.
    pub buffer_count: u32,
    /// Capacity (in blocks) of the upstream block buffer, used for ring sizing.
    pub block_capacity: u32,
    /// Initial volume, clamped to `[0, 1]`.
    pub volume: f32,
    /// Initial balance, clamped to `[-1, 1]`.
    pub balance: f32,
    /// Initial mute state.
    pub muted: bool,
}

impl Default for RendererConfig {
    /// Defaults match a 200 ms / 2-buffer device, about two seconds of ring.
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bits_per_sample: BITS_PER_SAMPLE,
            channels: CHANNELS,
            desired_latency_ms: 200,
            buffer_count: 2,
            block_capacity: 20,
            volume: 1.0,
            balance: 0.0,
            muted: false,
        }
    }
}

impl RendererConfig {
    /// Validated output format for this configuration.
    pub fn output_format(&self) -> Result<OutputFormat> {
        OutputFormat::new(self.sample_rate, self.bits_per_sample, self.channels)
    }

    pub fn desired_latency(&self) -> Duration {
        Duration::from_millis(u64::from(self.desired_latency_ms.max(1)))
    }

    /// Drift corrector for sessions opened with this configuration.
    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy::new(self.desired_latency())
    }

    /// Ring capacity: latency worth of bytes times half the block capacity.
    pub fn ring_capacity(&self, format: &OutputFormat) -> usize {
        let blocks = (self.block_capacity / 2).max(1) as usize;
        format
            .bytes_for(self.desired_latency())
            .saturating_mul(blocks)
            .max(format.frame_size())
    }

    /// Bytes the device is expected to pull per callback.
    pub fn device_buffer_bytes(&self, format: &OutputFormat) -> usize {
        let per_buffer = self.desired_latency() / self.buffer_count.max(1);
        format.bytes_for(per_buffer).max(format.frame_size())
    }
}
