//! One playback session: ring, gain, clock and format bound together.
//!
//! [`Session`] is shared between the producer (ingestion), the control plane
//! and the device. [`SessionReader`] is the consumer half handed to the
//! device; its [`SessionReader::read`] is the pull entry point the device
//! calls at its own cadence.
//!
//! ## Real-time constraints
//! `read` never blocks, never waits on another thread and does not allocate
//! once its scratch buffer has grown to the device's pull size. Starvation and
//! drift are handled in place (silence, skip, wait) and never reported as
//! errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::clock::{ClockSource, MAX_SPEED_RATIO};
use crate::format::OutputFormat;
use crate::gain::GainState;
use crate::ring::RingBuffer;
use crate::stretch;
use crate::sync::{SyncAction, SyncPolicy};

/// Which tracks the current media carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MediaTracks {
    pub has_audio: bool,
    pub has_video: bool,
}

/// Pull-path counters, updated by the device thread.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub(crate) pulls: AtomicU64,
    pub(crate) silence_pulls: AtomicU64,
    pub(crate) skip_events: AtomicU64,
    pub(crate) skipped_bytes: AtomicU64,
    pub(crate) wait_events: AtomicU64,
    pub(crate) played_bytes: AtomicU64,
    last_drift_bits: AtomicU64,
    has_drift: AtomicBool,
}

impl SessionCounters {
    fn record_drift(&self, drift_ms: f64) {
        self.last_drift_bits
            .store(drift_ms.to_bits(), Ordering::Relaxed);
        self.has_drift.store(true, Ordering::Relaxed);
    }

    pub(crate) fn last_drift_ms(&self) -> Option<f64> {
        if self.has_drift.load(Ordering::Relaxed) {
            Some(f64::from_bits(self.last_drift_bits.load(Ordering::Relaxed)))
        } else {
            None
        }
    }

    pub(crate) fn reset_drift(&self) {
        self.has_drift.store(false, Ordering::Relaxed);
    }
}

/// State shared by every party of one session.
pub struct Session {
    pub(crate) ring: RingBuffer,
    pub(crate) gain: Arc<GainState>,
    pub(crate) clock: Arc<dyn ClockSource>,
    pub(crate) format: OutputFormat,
    pub(crate) policy: SyncPolicy,
    pub(crate) tracks: MediaTracks,
    /// Pre-computed silence, one device buffer long.
    pub(crate) silence: Box<[u8]>,
    pub(crate) counters: SessionCounters,
}

impl Session {
    pub(crate) fn new(
        format: OutputFormat,
        ring_capacity: usize,
        device_buffer_bytes: usize,
        policy: SyncPolicy,
        tracks: MediaTracks,
        gain: Arc<GainState>,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        let ring_capacity = format.align(ring_capacity).max(format.frame_size());
        let silence_len = format.align(device_buffer_bytes).max(format.frame_size());
        Self {
            ring: RingBuffer::new(ring_capacity, format.bytes_per_second()),
            gain,
            clock,
            format,
            policy,
            tracks,
            silence: vec![0u8; silence_len].into_boxed_slice(),
            counters: SessionCounters::default(),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    pub fn tracks(&self) -> MediaTracks {
        self.tracks
    }

    /// Current drift against the clock in milliseconds (positive = behind).
    pub fn latency_ms(&self) -> Option<f64> {
        SyncPolicy::drift_ms(
            self.clock.position(),
            self.ring.write_tag(),
            self.ring.readable_count(),
            &self.format,
        )
    }

    /// Drift correction for one pull.
    ///
    /// Returns `false` when the pull has been answered with silence and the
    /// caller must not touch the ring.
    pub(crate) fn synchronize(&self, target: &mut [u8]) -> bool {
        let readable = self.ring.readable_count();
        let Some(drift_ms) = SyncPolicy::drift_ms(
            self.clock.position(),
            self.ring.write_tag(),
            readable,
            &self.format,
        ) else {
            return true;
        };
        self.counters.record_drift(drift_ms);

        match self.policy.decide(drift_ms, readable, &self.format) {
            SyncAction::PassThrough => true,
            SyncAction::Skip { bytes } => {
                let skipped = self.ring.skip(bytes);
                self.counters.skip_events.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .skipped_bytes
                    .fetch_add(skipped as u64, Ordering::Relaxed);
                tracing::warn!(drift_ms, skip_bytes = skipped, "sync skip: audio behind clock");
                true
            }
            SyncAction::Wait => {
                target.fill(0);
                self.counters.wait_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(drift_ms, "sync wait: audio ahead of clock");
                false
            }
        }
    }

    /// Zero up to one device buffer of `target` and count a silent pull.
    fn fill_silence(&self, target: &mut [u8]) -> usize {
        let n = target.len().min(self.silence.len());
        target[..n].copy_from_slice(&self.silence[..n]);
        self.counters.silence_pulls.fetch_add(1, Ordering::Relaxed);
        n
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("format", &self.format)
            .field("ring", &self.ring)
            .field("tracks", &self.tracks)
            .finish()
    }
}

/// Consumer half of a session, owned by the output device.
pub struct SessionReader {
    session: Arc<Session>,
    scratch: Vec<u8>,
}

impl SessionReader {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        let presize = scratch_len(session.silence.len());
        Self {
            session,
            scratch: vec![0u8; presize],
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.session.format
    }

    /// Bytes the device is expected to pull per callback.
    pub fn device_buffer_bytes(&self) -> usize {
        self.session.silence.len()
    }

    /// Fill `target[offset..offset + requested]` and return bytes written.
    ///
    /// The return value is always a whole number of frames. A return shorter
    /// than `requested` means "silence, try again on the next pull".
    pub fn read(&mut self, target: &mut [u8], offset: usize, requested: usize) -> usize {
        let session = &*self.session;
        let format = &session.format;
        let offset = offset.min(target.len());
        let requested = format.align(requested.min(target.len() - offset));
        let target = &mut target[offset..offset + requested];
        session.counters.pulls.fetch_add(1, Ordering::Relaxed);

        if !session.clock.is_running()
            || !session.tracks.has_audio
            || session.ring.readable_count() == 0
        {
            return session.fill_silence(target);
        }

        let needed = scratch_len(requested);
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0);
        }

        if session.tracks.has_video && !session.synchronize(target) {
            return requested;
        }

        let speed_ratio = session.clock.speed_ratio();
        let produced = if speed_ratio < 1.0 {
            let (out, raw) = self.scratch.split_at_mut(requested);
            stretch::read_slow_down(&session.ring, out, raw, speed_ratio, format)
        } else if speed_ratio > 1.0 {
            stretch::read_fast_forward(&session.ring, &mut self.scratch[..requested], format)
        } else {
            stretch::read_straight(&session.ring, &mut self.scratch[..requested], format)
        };

        // A skip can drain the ring; never hand back an untouched buffer.
        if produced == 0 {
            return session.fill_silence(target);
        }

        session.gain.apply(&mut self.scratch[..produced]);
        target[..produced].copy_from_slice(&self.scratch[..produced]);
        session
            .counters
            .played_bytes
            .fetch_add(produced as u64, Ordering::Relaxed);
        produced
    }
}

impl std::fmt::Debug for SessionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReader")
            .field("session", &self.session)
            .field("scratch_len", &self.scratch.len())
            .finish()
    }
}

fn scratch_len(requested: usize) -> usize {
    (requested as f64 * MAX_SPEED_RATIO).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    const AV: MediaTracks = MediaTracks {
        has_audio: true,
        has_video: true,
    };

    fn session(tracks: MediaTracks, clock: Arc<ManualClock>) -> Arc<Session> {
        let format = OutputFormat::stereo16(48_000).unwrap();
        Arc::new(Session::new(
            format,
            192_000,
            19_200,
            SyncPolicy::new(Duration::from_millis(200)),
            tracks,
            Arc::new(GainState::default()),
            clock,
        ))
    }

    fn running_clock(at_ms: u64) -> Arc<ManualClock> {
        let clock = Arc::new(ManualClock::new());
        clock.set_position(Duration::from_millis(at_ms));
        clock.set_running(true);
        clock
    }

    #[test]
    fn silence_when_clock_stopped() {
        let clock = Arc::new(ManualClock::new());
        let s = session(AV, clock);
        s.ring.write(&[5; 4000], Duration::ZERO, false).unwrap();
        let mut reader = SessionReader::new(s.clone());

        let mut target = vec![0xFFu8; 1000];
        assert_eq!(reader.read(&mut target, 0, 1000), 1000);
        assert!(target.iter().all(|b| *b == 0));
        assert_eq!(s.ring.readable_count(), 4000);
        assert_eq!(s.counters.silence_pulls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn silence_is_capped_at_device_buffer() {
        let s = session(AV, running_clock(0));
        let mut reader = SessionReader::new(s);
        let mut target = vec![0xFFu8; 40_000];
        assert_eq!(reader.read(&mut target, 0, 40_000), 19_200);
        assert!(target[..19_200].iter().all(|b| *b == 0));
    }

    #[test]
    fn requested_is_rounded_down_to_frames() {
        let s = session(AV, running_clock(0));
        s.ring.write(&[5; 4000], Duration::ZERO, false).unwrap();
        let mut reader = SessionReader::new(s);
        let mut target = vec![0u8; 1003];
        assert_eq!(reader.read(&mut target, 0, 1003), 1000);
    }

    #[test]
    fn offset_is_honored() {
        let s = session(
            MediaTracks {
                has_audio: true,
                has_video: false,
            },
            running_clock(0),
        );
        s.ring.write(&[7; 16], Duration::ZERO, false).unwrap();
        let mut reader = SessionReader::new(s);
        let mut target = vec![1u8; 24];
        assert_eq!(reader.read(&mut target, 8, 16), 16);
        assert!(target[..8].iter().all(|b| *b == 1));
        assert!(target[8..].iter().all(|b| *b == 7));
    }

    #[test]
    fn behind_clock_skips_before_reading() {
        // Clock 300 ms; tag 350 ms with 100 ms buffered => audio at 250 ms.
        let s = session(AV, running_clock(300));
        s.ring
            .write(&[1; 19_200], Duration::from_millis(350), false)
            .unwrap();
        let mut reader = SessionReader::new(s.clone());
        let mut target = vec![0u8; 4_000];
        let n = reader.read(&mut target, 0, 4_000);
        assert_eq!(n, 4_000);
        // 50 ms = 9_600 bytes dropped, then 4_000 read.
        assert_eq!(s.counters.skipped_bytes.load(Ordering::Relaxed), 9_600);
        assert_eq!(s.ring.readable_count(), 19_200 - 9_600 - 4_000);
    }

    #[test]
    fn ahead_of_clock_waits_without_touching_ring() {
        let s = session(AV, running_clock(0));
        s.ring
            .write(&[3; 19_200], Duration::from_millis(500), false)
            .unwrap();
        let mut reader = SessionReader::new(s.clone());
        let mut target = vec![0xFFu8; 2_000];
        assert_eq!(reader.read(&mut target, 0, 2_000), 2_000);
        assert!(target.iter().all(|b| *b == 0));
        assert_eq!(s.ring.readable_count(), 19_200);
        assert_eq!(s.counters.wait_events.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn skip_that_drains_ring_answers_with_silence() {
        // 400 bytes of audio around 0 ms against a clock at 5 s: all of it is stale.
        let s = session(AV, running_clock(5_000));
        s.ring.write(&[6; 400], Duration::ZERO, true).unwrap();
        let mut reader = SessionReader::new(s.clone());
        let mut target = vec![0xEEu8; 1_000];
        assert_eq!(reader.read(&mut target, 0, 1_000), 1_000);
        assert!(target.iter().all(|b| *b == 0));
        assert_eq!(s.ring.readable_count(), 0);
        assert_eq!(s.counters.skipped_bytes.load(Ordering::Relaxed), 400);
        assert_eq!(s.counters.silence_pulls.load(Ordering::Relaxed), 1);
        assert_eq!(s.counters.played_bytes.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn dead_band_leaves_ring_untouched_by_sync() {
        // Tag 105 ms with 100 ms buffered => audio at 5 ms, clock at 0: drift -5 ms.
        let s = session(AV, running_clock(0));
        s.ring
            .write(&[2; 19_200], Duration::from_millis(105), false)
            .unwrap();
        let mut target = [0u8; 0];
        assert!(s.synchronize(&mut target));
        assert_eq!(s.ring.readable_count(), 19_200);
        assert_eq!(s.counters.skip_events.load(Ordering::Relaxed), 0);
        assert_eq!(s.counters.wait_events.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn audio_only_media_skips_sync() {
        let s = session(
            MediaTracks {
                has_audio: true,
                has_video: false,
            },
            running_clock(10_000),
        );
        s.ring.write(&[4; 8_000], Duration::ZERO, false).unwrap();
        let mut reader = SessionReader::new(s.clone());
        let mut target = vec![0u8; 4_000];
        assert_eq!(reader.read(&mut target, 0, 4_000), 4_000);
        assert_eq!(s.ring.readable_count(), 4_000);
        assert_eq!(s.counters.skip_events.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn slow_motion_fills_the_request() {
        let clock = running_clock(0);
        clock.set_speed_ratio(0.5);
        let s = session(
            MediaTracks {
                has_audio: true,
                has_video: false,
            },
            clock,
        );
        s.ring.write(&[9; 8_000], Duration::ZERO, false).unwrap();
        let mut reader = SessionReader::new(s.clone());
        let mut target = vec![0u8; 1_000];
        assert_eq!(reader.read(&mut target, 0, 1_000), 1_000);
        assert_eq!(s.ring.readable_count(), 7_500);
        assert!(target.iter().all(|b| *b == 9));
    }

    #[test]
    fn gain_is_applied_to_output() {
        let s = session(
            MediaTracks {
                has_audio: true,
                has_video: false,
            },
            running_clock(0),
        );
        s.gain.set_muted(true);
        s.ring.write(&[9; 400], Duration::ZERO, false).unwrap();
        let mut reader = SessionReader::new(s);
        let mut target = vec![0xFFu8; 400];
        assert_eq!(reader.read(&mut target, 0, 400), 400);
        assert!(target.iter().all(|b| *b == 0));
    }

    #[test]
    fn every_return_is_frame_aligned() {
        for speed in [0.25, 0.5, 0.75, 1.0, 1.5, 4.0] {
            let clock = running_clock(0);
            clock.set_speed_ratio(speed);
            let s = session(
                MediaTracks {
                    has_audio: true,
                    has_video: false,
                },
                clock,
            );
            let mut reader = SessionReader::new(s.clone());
            let mut target = vec![0u8; 2_048];
            for requested in 0..2_048usize {
                if s.ring.readable_count() < 4_096 {
                    s.ring.write(&[1; 4_001], Duration::ZERO, false).unwrap();
                }
                let n = reader.read(&mut target, 0, requested);
                assert_eq!(n % 4, 0, "speed={speed} requested={requested} n={n}");
                assert!(n <= requested);
            }
        }
    }
}
