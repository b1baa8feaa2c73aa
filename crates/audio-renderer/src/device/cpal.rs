//! CPAL output device.
//!
//! The CPAL stream lives on a dedicated worker thread and is driven through a
//! command channel, so the renderer holding a [`CpalDevice`] stays `Send` on
//! every host. The stream callback:
//! - pulls 16-bit interleaved bytes from the [`SessionReader`]
//! - pads short reads with silence
//! - converts to the device sample format

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::error::{RendererError, Result};
use crate::format::OutputFormat;
use crate::session::SessionReader;

use super::{DeviceBackend, OutputDevice};

/// Largest fixed buffer we ask a device for.
const MAX_BUFFER_FRAMES: u32 = 16_384;

/// Backend that opens CPAL output streams.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// `device_name` selects the first output device whose name contains it
    /// (case-insensitive); `None` uses the host default.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    /// Names of the host's output devices.
    pub fn output_device_names() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| RendererError::Device(format!("no output devices: {e}")))?;
        Ok(devices
            .filter_map(|d| d.description().ok().map(|n| n.name().to_string()))
            .collect())
    }
}

impl DeviceBackend for CpalBackend {
    fn open(&mut self, reader: SessionReader) -> Result<Box<dyn OutputDevice>> {
        let device = CpalDevice::spawn(self.device_name.clone(), reader)
            .map_err(|e| RendererError::Device(format!("{e:#}")))?;
        Ok(Box::new(device))
    }
}

enum Command {
    Play,
    Pause,
    Shutdown,
}

type Reply = std::result::Result<(), String>;

/// Pull side shared between the callback and the control thread.
struct Feed {
    reader: Mutex<SessionReader>,
    running: AtomicBool,
}

struct CpalDevice {
    feed: Arc<Feed>,
    commands: Sender<Command>,
    replies: Receiver<Reply>,
    worker: Option<JoinHandle<()>>,
}

impl CpalDevice {
    fn spawn(device_name: Option<String>, reader: SessionReader) -> anyhow::Result<Self> {
        let format = reader.format();
        let device_buffer_bytes = reader.device_buffer_bytes();
        let feed = Arc::new(Feed {
            reader: Mutex::new(reader),
            running: AtomicBool::new(false),
        });

        let (cmd_tx, cmd_rx) = unbounded::<Command>();
        let (reply_tx, reply_rx) = bounded::<Reply>(1);
        let (ready_tx, ready_rx) = bounded::<Reply>(1);

        let feed_worker = feed.clone();
        let worker = std::thread::Builder::new()
            .name("audio-renderer-cpal".to_string())
            .spawn(move || {
                let stream = match open_stream(
                    device_name.as_deref(),
                    format,
                    device_buffer_bytes,
                    feed_worker,
                ) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{e:#}")));
                        return;
                    }
                };
                for cmd in cmd_rx.iter() {
                    let result = match cmd {
                        Command::Play => stream.play().map_err(|e| e.to_string()),
                        Command::Pause => stream.pause().map_err(|e| e.to_string()),
                        Command::Shutdown => break,
                    };
                    let _ = reply_tx.send(result);
                }
                drop(stream);
                tracing::debug!("cpal worker exited");
            })
            .context("spawn cpal worker")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(anyhow!(e));
            }
            Err(_) => {
                let _ = worker.join();
                return Err(anyhow!("cpal worker exited before the stream was built"));
            }
        }

        Ok(Self {
            feed,
            commands: cmd_tx,
            replies: reply_rx,
            worker: Some(worker),
        })
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .map_err(|_| RendererError::Device("cpal worker is gone".to_string()))?;
        match self.replies.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RendererError::Device(e)),
            Err(_) => Err(RendererError::Device("cpal worker is gone".to_string())),
        }
    }
}

impl OutputDevice for CpalDevice {
    fn play(&mut self) -> Result<()> {
        self.feed.running.store(true, Ordering::Release);
        self.send(Command::Play)
    }

    fn stop(&mut self) -> Result<()> {
        self.feed.running.store(false, Ordering::Release);
        if let Err(e) = self.send(Command::Pause) {
            // Some hosts cannot pause; the callback already emits silence.
            tracing::warn!(error = %e, "cpal stream pause failed");
        }
        // Fence any callback that is mid-pull.
        drop(self.feed.reader.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(())
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.feed.running.store(false, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("cpal worker panicked");
            }
        }
    }
}

fn open_stream(
    needle: Option<&str>,
    format: OutputFormat,
    device_buffer_bytes: usize,
    feed: Arc<Feed>,
) -> anyhow::Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = pick_device(&host, needle)?;
    let supported = pick_output_config(&device, format)?;
    let buffer_frames = (device_buffer_bytes / format.frame_size()) as u32;
    let buffer_size = pick_buffer_size(supported.buffer_size(), buffer_frames)
        .unwrap_or(cpal::BufferSize::Default);

    let config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: format.sample_rate,
        buffer_size,
    };
    tracing::info!(
        device = %device.description().map(|d| d.name().to_string()).unwrap_or_default(),
        rate_hz = format.sample_rate,
        channels = format.channels,
        sample_format = ?supported.sample_format(),
        buffer = ?config.buffer_size,
        "opening output stream"
    );

    build_output_stream(&device, &config, supported.sample_format(), feed, device_buffer_bytes)
}

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
fn pick_device(host: &cpal::Host, needle: Option<&str>) -> anyhow::Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Pick a supported config with the renderer's channel count and sample rate,
/// preferring the sample format that needs the least conversion.
fn pick_output_config(
    device: &cpal::Device,
    format: OutputFormat,
) -> anyhow::Result<cpal::SupportedStreamConfig> {
    device
        .supported_output_configs()?
        .filter(|range| {
            range.channels() == format.channels
                && range.min_sample_rate() <= format.sample_rate
                && range.max_sample_rate() >= format.sample_rate
        })
        .min_by_key(|range| sample_format_rank(range.sample_format()))
        .map(|range| range.with_sample_rate(format.sample_rate))
        .ok_or_else(|| {
            anyhow!(
                "device does not support {} Hz / {} channels",
                format.sample_rate,
                format.channels
            )
        })
}

/// Fixed buffer size closest to `wanted` frames, or `None` when the device
/// only reports its default.
fn pick_buffer_size(supported: &cpal::SupportedBufferSize, wanted: u32) -> Option<cpal::BufferSize> {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } => {
            let max = (*max).min(MAX_BUFFER_FRAMES).max(*min);
            Some(cpal::BufferSize::Fixed(wanted.clamp(*min, max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    feed: Arc<Feed>,
    device_buffer_bytes: usize,
) -> anyhow::Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, feed, device_buffer_bytes),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, feed, device_buffer_bytes),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, feed, device_buffer_bytes),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, feed, device_buffer_bytes),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Type-specialized stream builder.
///
/// ## Real-time constraints
/// The callback only contends on the reader lock with `stop`, and its byte
/// buffer is sized up front for the expected pull.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    feed: Arc<Feed>,
    device_buffer_bytes: usize,
) -> anyhow::Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<i16>,
{
    let mut bytes = vec![0u8; device_buffer_bytes];
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let wanted = data.len() * 2;
            if bytes.len() < wanted {
                bytes.resize(wanted, 0);
            }
            let bytes = &mut bytes[..wanted];

            let got = if feed.running.load(Ordering::Acquire) {
                let mut reader = feed.reader.lock().unwrap_or_else(PoisonError::into_inner);
                reader.read(bytes, 0, wanted)
            } else {
                0
            };
            bytes[got..].fill(0);
            convert_samples(bytes, data);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Convert interleaved little-endian 16-bit samples to `T`.
fn convert_samples<T>(bytes: &[u8], out: &mut [T])
where
    T: cpal::Sample + cpal::FromSample<i16>,
{
    for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *dst = <T as cpal::Sample>::from_sample::<i16>(i16::from_le_bytes([src[0], src[1]]));
    }
}
