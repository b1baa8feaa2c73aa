//! Output device boundary.
//!
//! The renderer never drives device I/O. A [`DeviceBackend`] opens an
//! [`OutputDevice`] around a [`SessionReader`], and the device calls
//! [`SessionReader::read`] from its own thread at its own cadence.
//!
//! Backends:
//! - [`ManualBackend`]: the host pulls bytes itself (offline rendering, tests).
//! - `CpalBackend` (feature `cpal`): a real output stream.

mod manual;

#[cfg(feature = "cpal")]
mod cpal;

pub use manual::{ManualBackend, ManualPort};

#[cfg(feature = "cpal")]
pub use self::cpal::CpalBackend;

use crate::error::Result;
use crate::session::SessionReader;

/// An open output device.
///
/// Dropping the device tears it down.
pub trait OutputDevice: Send {
    /// Start (or resume) pulling from the session.
    fn play(&mut self) -> Result<()>;

    /// Stop pulling.
    ///
    /// Must not return while a pull is still in flight, so the caller may
    /// mutate the ring afterwards.
    fn stop(&mut self) -> Result<()>;
}

/// Opens output devices for new sessions.
pub trait DeviceBackend: Send {
    fn open(&mut self, reader: SessionReader) -> Result<Box<dyn OutputDevice>>;
}
