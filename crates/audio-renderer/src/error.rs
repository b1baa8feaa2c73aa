//! Renderer error types.
//!
//! Only construction and device lifecycle failures surface as errors. Buffer
//! starvation and clock drift are recovered inside the pull path (silence,
//! skip or wait) and never reach the caller.

use thiserror::Error;

/// Errors reported by the audio renderer.
#[derive(Error, Debug)]
pub enum RendererError {
    /// The requested output format or configuration cannot be rendered.
    ///
    /// Raised before any session exists.
    #[error("unsupported renderer configuration: {0}")]
    Configuration(String),

    /// The output device failed to open, start or stop.
    ///
    /// Never retried internally.
    #[error("audio device error: {0}")]
    Device(String),

    /// A ring buffer write did not fit into the free space.
    #[error("ring buffer capacity exceeded: {requested} bytes requested, {free} free")]
    CapacityExceeded { requested: usize, free: usize },
}

pub type Result<T> = std::result::Result<T, RendererError>;
