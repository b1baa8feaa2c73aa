//! Shared playback clock.
//!
//! The renderer never owns or advances the clock; it only reads the position,
//! the speed ratio and whether playback is running. [`WallClock`] is a
//! monotonic, speed-scaled implementation for hosts without their own clock,
//! and [`ManualClock`] is driven entirely by the host.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Upper bound for playback speed ratios.
pub const MAX_SPEED_RATIO: f64 = 8.0;

/// Read-only view of the playback clock.
pub trait ClockSource: Send + Sync {
    /// Current presentation time.
    fn position(&self) -> Duration;

    /// Playback rate multiplier (> 0).
    fn speed_ratio(&self) -> f64;

    /// Whether playback is active.
    fn is_running(&self) -> bool;
}

fn clamp_speed(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio.min(MAX_SPEED_RATIO)
    } else {
        1.0
    }
}

/// Clock whose position is set explicitly by the host.
///
/// All fields are atomics so the device thread can read while the host writes.
#[derive(Debug)]
pub struct ManualClock {
    position_ns: AtomicU64,
    speed_bits: AtomicU64,
    running: AtomicBool,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            position_ns: AtomicU64::new(0),
            speed_bits: AtomicU64::new(1.0f64.to_bits()),
            running: AtomicBool::new(false),
        }
    }

    pub fn set_position(&self, position: Duration) {
        let ns = u64::try_from(position.as_nanos()).unwrap_or(u64::MAX);
        self.position_ns.store(ns, Ordering::Relaxed);
    }

    /// Non-positive or non-finite ratios reset to 1.0.
    pub fn set_speed_ratio(&self, ratio: f64) {
        self.speed_bits
            .store(clamp_speed(ratio).to_bits(), Ordering::Relaxed);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for ManualClock {
    fn position(&self) -> Duration {
        Duration::from_nanos(self.position_ns.load(Ordering::Relaxed))
    }

    fn speed_ratio(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct WallState {
    /// Position at the last start/seek/speed change.
    base: Duration,
    /// When the clock last started running, if it is running.
    started_at: Option<Instant>,
    speed: f64,
}

impl WallState {
    fn position_at(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(t0) => self.base + now.saturating_duration_since(t0).mul_f64(self.speed),
            None => self.base,
        }
    }
}

/// Monotonic clock that advances at `speed_ratio` times real time while running.
#[derive(Debug)]
pub struct WallClock {
    state: Mutex<WallState>,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WallState {
                base: Duration::ZERO,
                started_at: None,
                speed: 1.0,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut WallState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn start(&self) {
        self.with_state(|st| {
            if st.started_at.is_none() {
                st.started_at = Some(Instant::now());
            }
        });
    }

    pub fn pause(&self) {
        self.with_state(|st| {
            let now = Instant::now();
            st.base = st.position_at(now);
            st.started_at = None;
        });
    }

    /// Jump to `position`, keeping the running state.
    pub fn seek(&self, position: Duration) {
        self.with_state(|st| {
            st.base = position;
            if st.started_at.is_some() {
                st.started_at = Some(Instant::now());
            }
        });
    }

    /// Change the rate without a position discontinuity.
    pub fn set_speed_ratio(&self, ratio: f64) {
        self.with_state(|st| {
            let now = Instant::now();
            st.base = st.position_at(now);
            if st.started_at.is_some() {
                st.started_at = Some(now);
            }
            st.speed = clamp_speed(ratio);
        });
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for WallClock {
    fn position(&self) -> Duration {
        self.with_state(|st| st.position_at(Instant::now()))
    }

    fn speed_ratio(&self) -> f64 {
        self.with_state(|st| st.speed)
    }

    fn is_running(&self) -> bool {
        self.with_state(|st| st.started_at.is_some())
    }
}
