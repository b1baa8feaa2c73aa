//! Host-driven output device.
//!
//! The backend hands out a cloneable [`ManualPort`]; whoever holds it pulls
//! bytes with [`ManualPort::pull`] exactly like a hardware callback would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::session::SessionReader;

use super::{DeviceBackend, OutputDevice};

#[derive(Debug, Default)]
struct PortState {
    reader: Mutex<Option<SessionReader>>,
    running: AtomicBool,
    #[cfg(test)]
    fail_open: AtomicBool,
}

/// Handle the host uses to pull audio.
#[derive(Clone, Debug, Default)]
pub struct ManualPort {
    state: Arc<PortState>,
}

impl ManualPort {
    fn reader(&self) -> MutexGuard<'_, Option<SessionReader>> {
        self.state
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Pull `requested` bytes into `target[offset..]`.
    ///
    /// Returns `None` while no device is open or the device is stopped.
    pub fn pull(&self, target: &mut [u8], offset: usize, requested: usize) -> Option<usize> {
        if !self.state.running.load(Ordering::Acquire) {
            return None;
        }
        let mut guard = self.reader();
        let reader = guard.as_mut()?;
        // Re-check under the lock: stop() flips the flag, then takes the lock.
        if !self.state.running.load(Ordering::Acquire) {
            return None;
        }
        Some(reader.read(target, offset, requested))
    }

    /// Whether a device is open and playing.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Whether a device is currently open on this port.
    pub fn is_open(&self) -> bool {
        self.reader().is_some()
    }

    /// Bytes one pull is expected to request, if a device is open.
    pub fn device_buffer_bytes(&self) -> Option<usize> {
        self.reader().as_ref().map(SessionReader::device_buffer_bytes)
    }

    /// Make the next `open` fail with a device error.
    #[cfg(test)]
    pub(crate) fn fail_next_open(&self) {
        self.state.fail_open.store(true, Ordering::Relaxed);
    }
}

/// Backend whose devices are pulled through a [`ManualPort`].
#[derive(Debug, Default)]
pub struct ManualBackend {
    port: ManualPort,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(&self) -> ManualPort {
        self.port.clone()
    }
}

impl DeviceBackend for ManualBackend {
    fn open(&mut self, reader: SessionReader) -> Result<Box<dyn OutputDevice>> {
        #[cfg(test)]
        if self.port.state.fail_open.swap(false, Ordering::Relaxed) {
            return Err(crate::error::RendererError::Device(
                "manual device refused to open".to_string(),
            ));
        }
        *self.port.reader() = Some(reader);
        Ok(Box::new(ManualDevice {
            port: self.port.clone(),
        }))
    }
}

struct ManualDevice {
    port: ManualPort,
}

impl OutputDevice for ManualDevice {
    fn play(&mut self) -> Result<()> {
        self.port.state.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.port.state.running.store(false, Ordering::Release);
        // Wait out any pull that passed the running check.
        drop(self.port.reader());
        Ok(())
    }
}

impl Drop for ManualDevice {
    fn drop(&mut self) {
        self.port.state.running.store(false, Ordering::Release);
        self.port.reader().take();
    }
}
