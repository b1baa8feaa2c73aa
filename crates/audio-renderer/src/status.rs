use std::sync::atomic::Ordering;

use serde::Serialize;

use crate::gain::GainState;
use crate::session::Session;

/// Point-in-time view of the renderer, suitable for logs and APIs.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RendererStatus {
    /// Whether a session is open.
    pub initialized: bool,
    /// Bytes waiting in the ring.
    pub buffered_bytes: usize,
    /// Ring capacity in bytes.
    pub capacity_bytes: usize,
    /// Ring occupancy in `[0, 1]`.
    pub capacity_percent: f64,
    /// Device pulls served.
    pub pulls: u64,
    /// Pulls answered with pre-computed silence (stopped clock or underrun).
    pub silence_pulls: u64,
    /// Drift corrections that dropped audio.
    pub skip_events: u64,
    pub skipped_bytes: u64,
    /// Drift corrections that emitted silence to let the clock catch up.
    pub wait_events: u64,
    /// Bytes handed to the device from the ring.
    pub played_bytes: u64,
    /// Most recent drift measured by the sync stage.
    pub last_drift_ms: Option<f64>,
    pub volume: f32,
    pub balance: f32,
    pub muted: bool,
}

impl RendererStatus {
    pub(crate) fn idle(gain: &GainState) -> Self {
        Self {
            volume: gain.volume(),
            balance: gain.balance(),
            muted: gain.is_muted(),
            ..Self::default()
        }
    }

    pub(crate) fn from_session(session: &Session, gain: &GainState) -> Self {
        let ring = session.ring();
        let counters = &session.counters;
        Self {
            initialized: true,
            buffered_bytes: ring.readable_count(),
            capacity_bytes: ring.capacity(),
            capacity_percent: ring.capacity_percent(),
            pulls: counters.pulls.load(Ordering::Relaxed),
            silence_pulls: counters.silence_pulls.load(Ordering::Relaxed),
            skip_events: counters.skip_events.load(Ordering::Relaxed),
            skipped_bytes: counters.skipped_bytes.load(Ordering::Relaxed),
            wait_events: counters.wait_events.load(Ordering::Relaxed),
            played_bytes: counters.played_bytes.load(Ordering::Relaxed),
            last_drift_ms: counters.last_drift_ms(),
            ..Self::idle(gain)
        }
    }

    /// Milliseconds of audio waiting in the ring at `bytes_per_second`.
    pub fn buffered_ms(&self, bytes_per_second: usize) -> u64 {
        if bytes_per_second == 0 {
            return 0;
        }
        (self.buffered_bytes as u64).saturating_mul(1000) / bytes_per_second as u64
    }
}
