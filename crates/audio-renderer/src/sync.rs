//! Dead-band drift corrector.
//!
//! Drift is `clock position − audio position`, in milliseconds, where the
//! audio position is the ring's write tag minus the duration of the bytes
//! still waiting to be played. Inside the dead-band nothing happens. Outside
//! it the correction is binary: drop the stale bytes in one go when audio is
//! behind, or emit silence for the whole pull when audio is ahead.

use std::time::Duration;

use crate::format::OutputFormat;

/// Corrective action for one device pull.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SyncAction {
    /// Drift within tolerance; read normally.
    PassThrough,
    /// Audio is behind the clock; discard `bytes` before reading.
    Skip { bytes: usize },
    /// Audio is ahead of the clock; emit silence and leave the ring alone.
    Wait,
}

/// Drift tolerance derived from the device's desired latency.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyncPolicy {
    pub desired_latency: Duration,
    pub threshold_ms: f64,
}

impl SyncPolicy {
    /// Threshold is 5% of `desired_latency`.
    pub fn new(desired_latency: Duration) -> Self {
        Self {
            desired_latency,
            threshold_ms: desired_latency.as_secs_f64() * 1000.0 * 0.05,
        }
    }

    /// Signed drift in milliseconds; positive means audio is behind.
    ///
    /// Returns `None` while nothing has been written.
    pub fn drift_ms(
        clock_position: Duration,
        write_tag: Option<Duration>,
        readable_bytes: usize,
        format: &OutputFormat,
    ) -> Option<f64> {
        let tag = write_tag?;
        let audio_position_ms = tag.as_secs_f64() * 1000.0 - format.millis_for(readable_bytes);
        Some(clock_position.as_secs_f64() * 1000.0 - audio_position_ms)
    }

    /// Decide the action for a measured drift.
    ///
    /// Skips are frame-aligned and never exceed `readable_bytes`.
    pub fn decide(&self, drift_ms: f64, readable_bytes: usize, format: &OutputFormat) -> SyncAction {
        if drift_ms > self.threshold_ms {
            let bytes = format
                .bytes_for_millis(drift_ms)
                .min(format.align(readable_bytes));
            SyncAction::Skip { bytes }
        } else if drift_ms < -self.threshold_ms {
            SyncAction::Wait
        } else {
            SyncAction::PassThrough
        }
    }
}
