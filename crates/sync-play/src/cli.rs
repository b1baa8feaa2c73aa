use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "sync-play", version)]
pub struct Args {
    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Renderer settings (TOML); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Desired device latency in milliseconds
    #[arg(long)]
    pub latency_ms: Option<u32>,

    /// Volume in [0, 1]
    #[arg(long)]
    pub volume: Option<f32>,

    /// Balance in [-1, 1] (negative = left)
    #[arg(long, allow_hyphen_values = true)]
    pub balance: Option<f32>,

    /// Start muted
    #[arg(long)]
    pub mute: bool,

    /// Clock speed ratio (e.g. 0.5 for slow motion)
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    pub frequency: f32,

    /// Length of each generated block in milliseconds
    #[arg(long, default_value_t = 20)]
    pub block_ms: u32,

    /// Producer tick in milliseconds
    #[arg(long, default_value_t = 10)]
    pub tick_ms: u64,

    /// Stop after this many seconds of clock time
    #[arg(long, default_value_t = 5.0)]
    pub seconds: f64,

    /// Treat the media as audio-only (no clock sync corrections)
    #[arg(long)]
    pub audio_only: bool,

    /// Pull from the renderer on the producer tick instead of a device
    #[arg(long)]
    pub offline: bool,

    /// Write pulled PCM (s16le stereo) here in offline mode
    #[arg(long, requires = "offline")]
    pub output: Option<PathBuf>,
}
