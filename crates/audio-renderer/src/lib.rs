//! Clock-synchronized audio rendering.
//!
//! Decoded 16-bit stereo PCM is pushed into a lock-free ring by a producer
//! ([`AudioRenderer::render`]) and pulled out by the output device
//! ([`SessionReader::read`]). Every pull is corrected against a shared
//! [`ClockSource`]: stale audio is skipped, early audio waits, and slow
//! playback speeds are stretched by repeating frames. Volume, balance and mute
//! are applied on the way out.
//!
//! Devices are plugged in through [`DeviceBackend`]. [`ManualBackend`] lets
//! the host pull by hand; the `cpal` feature adds `CpalBackend` for real
//! output hardware.

pub mod block;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod format;
pub mod gain;
pub mod renderer;
pub mod ring;
pub mod session;
pub mod status;
pub mod stretch;
pub mod sync;

pub use block::AudioBlock;
pub use clock::{ClockSource, MAX_SPEED_RATIO, ManualClock, WallClock};
pub use config::RendererConfig;
#[cfg(feature = "cpal")]
pub use device::CpalBackend;
pub use device::{DeviceBackend, ManualBackend, ManualPort, OutputDevice};
pub use error::{RendererError, Result};
pub use format::OutputFormat;
pub use gain::GainState;
pub use renderer::AudioRenderer;
pub use ring::RingBuffer;
pub use session::{MediaTracks, Session, SessionReader};
pub use status::RendererStatus;
