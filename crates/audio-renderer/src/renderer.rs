//! Audio renderer orchestration.
//!
//! [`AudioRenderer`] owns one [`Session`] at a time together with the output
//! device pulling from it. The producer pushes decoded blocks with
//! [`AudioRenderer::render`]; the control plane drives the lifecycle and the
//! gain. Both go through `&self`, so the renderer can be shared in an `Arc`.
//!
//! Lifecycle calls that mutate the ring (`stop`, `seek`, `close`) halt the
//! device first, so the consumer never observes a cleared or dropped ring
//! mid-pull.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::block::AudioBlock;
use crate::clock::ClockSource;
use crate::config::RendererConfig;
use crate::device::{DeviceBackend, OutputDevice};
use crate::error::Result;
use crate::format::OutputFormat;
use crate::gain::GainState;
use crate::session::{MediaTracks, Session, SessionReader};
use crate::status::RendererStatus;

/// Occupancy ratio at which ingestion stops for the current pass.
pub const INGEST_HIGH_WATER: f64 = 0.8;

struct ActiveSession {
    session: Arc<Session>,
    device: Box<dyn OutputDevice>,
    started: bool,
}

/// Renders decoded audio in step with a shared playback clock.
pub struct AudioRenderer {
    config: RendererConfig,
    format: OutputFormat,
    gain: Arc<GainState>,
    clock: Arc<dyn ClockSource>,
    backend: Mutex<Box<dyn DeviceBackend>>,
    active: Mutex<Option<ActiveSession>>,
}

impl AudioRenderer {
    /// Validates the output format; no device is opened until [`initialize`].
    ///
    /// [`initialize`]: AudioRenderer::initialize
    pub fn new(
        config: RendererConfig,
        clock: Arc<dyn ClockSource>,
        backend: Box<dyn DeviceBackend>,
    ) -> Result<Self> {
        let format = config.output_format()?;
        let gain = Arc::new(GainState::new(config.volume, config.balance, config.muted));
        Ok(Self {
            config,
            format,
            gain,
            clock,
            backend: Mutex::new(backend),
            active: Mutex::new(None),
        })
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Whether a session (and its device) is currently open.
    pub fn is_initialized(&self) -> bool {
        self.active().is_some()
    }

    /// Open a session for media with the given tracks.
    ///
    /// Any previous session is closed first. Media without audio leaves the
    /// renderer uninitialized, turning `render` and the lifecycle calls into
    /// no-ops.
    pub fn initialize(&self, tracks: MediaTracks) -> Result<()> {
        let mut active = self.active();
        if let Some(previous) = active.take() {
            teardown(previous);
        }
        if !tracks.has_audio {
            tracing::info!("media has no audio track; renderer left idle");
            return Ok(());
        }

        let ring_capacity = self.config.ring_capacity(&self.format);
        let device_buffer_bytes = self.config.device_buffer_bytes(&self.format);
        let policy = self.config.sync_policy();
        let session = Arc::new(Session::new(
            self.format,
            ring_capacity,
            device_buffer_bytes,
            policy,
            tracks,
            self.gain.clone(),
            self.clock.clone(),
        ));

        let device = {
            let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
            backend.open(SessionReader::new(session.clone()))?
        };

        tracing::info!(
            rate_hz = self.format.sample_rate,
            channels = self.format.channels,
            capacity_bytes = session.ring().capacity(),
            device_buffer_bytes,
            threshold_ms = policy.threshold_ms,
            has_video = tracks.has_video,
            "audio session initialized"
        );

        *active = Some(ActiveSession {
            session,
            device,
            started: false,
        });
        Ok(())
    }

    /// Push blocks from `start_index` onwards into the ring.
    ///
    /// Each write moves the tag to the end of the block's span, so a contiguous
    /// successor starts exactly at the tag. Blocks starting before the tag are
    /// skipped. Ingestion stops
    /// once the ring is 80% full or a block does not fit; remaining blocks are
    /// picked up on the next call.
    pub fn render(&self, blocks: &[AudioBlock], start_index: usize) {
        let active = self.active();
        let Some(active) = active.as_ref() else {
            return;
        };
        let ring = active.session.ring();

        for block in blocks.iter().skip(start_index) {
            if ring.capacity_percent() >= INGEST_HIGH_WATER {
                tracing::debug!(
                    buffered = ring.readable_count(),
                    capacity = ring.capacity(),
                    "ingestion paused at high water"
                );
                break;
            }
            if ring.write_tag().is_some_and(|tag| block.start_time < tag) {
                continue;
            }
            let samples = block.samples();
            let payload = &samples[..self.format.align(samples.len())];
            if let Err(e) = ring.write(payload, block.start_time, true) {
                tracing::debug!(
                    error = %e,
                    start_ms = block.start_time.as_millis() as u64,
                    "block does not fit; retry next pass"
                );
                break;
            }
        }
    }

    /// Start or resume device output.
    pub fn play(&self) -> Result<()> {
        let mut active = self.active();
        let Some(active) = active.as_mut() else {
            return Ok(());
        };
        active.device.play()?;
        active.started = true;
        Ok(())
    }

    /// Leaves the ring and the device untouched; the clock gates output.
    pub fn pause(&self) -> Result<()> {
        Ok(())
    }

    /// Halt the device and drop all buffered audio.
    pub fn stop(&self) -> Result<()> {
        let mut active = self.active();
        let Some(active) = active.as_mut() else {
            return Ok(());
        };
        active.device.stop()?;
        active.started = false;
        clear_session(&active.session);
        Ok(())
    }

    /// Drop all buffered audio, resuming output afterwards if it was playing.
    pub fn seek(&self) -> Result<()> {
        let mut active = self.active();
        let Some(active) = active.as_mut() else {
            return Ok(());
        };
        active.device.stop()?;
        clear_session(&active.session);
        if active.started {
            active.device.play()?;
        }
        Ok(())
    }

    /// Tear down the device and release the session.
    ///
    /// Teardown failures are logged, never returned.
    pub fn close(&self) {
        if let Some(active) = self.active().take() {
            teardown(active);
            tracing::info!("audio session closed");
        }
    }

    pub fn set_volume(&self, volume: f32) {
        self.gain.set_volume(volume);
    }

    pub fn set_balance(&self, balance: f32) {
        self.gain.set_balance(balance);
    }

    pub fn set_muted(&self, muted: bool) {
        self.gain.set_muted(muted);
    }

    pub fn volume(&self) -> f32 {
        self.gain.volume()
    }

    pub fn balance(&self) -> f32 {
        self.gain.balance()
    }

    pub fn is_muted(&self) -> bool {
        self.gain.is_muted()
    }

    /// Signed drift against the clock in milliseconds (positive = audio behind).
    ///
    /// `None` without a session or before the first write.
    pub fn latency(&self) -> Option<f64> {
        self.active().as_ref().and_then(|a| a.session.latency_ms())
    }

    /// Start time of the last block written, `None` without a session or
    /// after a clear. Producers use it to drop blocks already ingested.
    pub fn write_tag(&self) -> Option<Duration> {
        self.active().as_ref().and_then(|a| a.session.ring().write_tag())
    }

    pub fn status(&self) -> RendererStatus {
        let active = self.active();
        match active.as_ref() {
            Some(a) => RendererStatus::from_session(&a.session, &self.gain),
            None => RendererStatus::idle(&self.gain),
        }
    }
}

impl Drop for AudioRenderer {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for AudioRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioRenderer")
            .field("format", &self.format)
            .field("gain", &self.gain)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

fn clear_session(session: &Session) {
    session.ring().clear();
    session.counters.reset_drift();
}

fn teardown(mut active: ActiveSession) {
    if let Err(e) = active.device.stop() {
        tracing::warn!(error = %e, "device stop failed during teardown");
    }
    drop(active.device);
}
