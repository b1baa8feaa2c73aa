//! sync-play: drives an `AudioRenderer` with a generated tone against a wall clock.
//!
//! ## Loop
//! 1. **Produce**: on every tick, fresh tone blocks are pushed with `render`.
//! 2. **Clock**: a `WallClock` runs at `--speed`; the renderer stretches or
//!    skips against it.
//! 3. **Output**: CPAL pulls from the renderer, or with `--offline` the tick
//!    itself pulls and optionally writes raw PCM to `--output`.
//!
//! Ctrl-C stops playback and prints the final renderer status.

mod cli;
mod producer;
mod settings;
mod tone;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use audio_renderer::{
    AudioRenderer, ClockSource, CpalBackend, DeviceBackend, ManualBackend, ManualPort,
    MediaTracks, WallClock,
};
use clap::Parser;
use crossbeam_channel::{bounded, select, tick};
use tracing_subscriber::EnvFilter;

use producer::Producer;
use tone::ToneGenerator;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sync_play=info,audio_renderer=info")
        }))
        .init();

    if args.list_devices {
        let names = CpalBackend::output_device_names().context("list output devices")?;
        for (i, name) in names.iter().enumerate() {
            println!("#{i}: {name}");
        }
        return Ok(());
    }

    let config = settings::load(&args)?;
    let clock = Arc::new(WallClock::new());
    clock.set_speed_ratio(args.speed);

    let mut offline_port = None;
    let backend: Box<dyn DeviceBackend> = if args.offline {
        let backend = ManualBackend::new();
        offline_port = Some(backend.port());
        Box::new(backend)
    } else {
        Box::new(CpalBackend::new(args.device.clone()))
    };

    let renderer = AudioRenderer::new(config.clone(), clock.clone(), backend)
        .context("create renderer")?;
    let format = renderer.format();
    renderer
        .initialize(MediaTracks {
            has_audio: true,
            has_video: !args.audio_only,
        })
        .context("open output device")?;

    let end = Duration::from_secs_f64(args.seconds.max(0.0));
    let block = Duration::from_millis(u64::from(args.block_ms.max(1)));
    let tone = ToneGenerator::new(format, args.frequency, block);
    let mut producer = Producer::new(tone, config.block_capacity as usize, end);

    let mut sink = match (&offline_port, &args.output) {
        (Some(_), Some(path)) => Some(BufWriter::new(
            File::create(path).with_context(|| format!("create output {path:?}"))?,
        )),
        _ => None,
    };

    let (stop_tx, stop_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    // Prime the ring before the clock starts.
    producer.tick(&renderer);
    renderer.play().context("start output")?;
    clock.start();
    tracing::info!(
        rate_hz = format.sample_rate,
        speed = clock.speed_ratio(),
        seconds = args.seconds,
        offline = args.offline,
        "playback started"
    );

    let tick_period = Duration::from_millis(args.tick_ms.max(1));
    // The device consumes real time whatever the clock speed.
    let mut pcm = vec![0u8; format.bytes_for(tick_period)];
    let ticker = tick(tick_period);
    loop {
        select! {
            recv(stop_rx) -> _ => {
                tracing::info!("interrupted");
                break;
            }
            recv(ticker) -> _ => {
                producer.tick(&renderer);
                if let Some(port) = &offline_port {
                    pull_offline(port, &mut pcm, sink.as_mut())?;
                }
                if clock.position() >= end && producer.is_drained() {
                    break;
                }
            }
        }
    }

    let status = renderer.status();
    tracing::info!(
        buffered_ms = status.buffered_ms(format.bytes_per_second()),
        played_bytes = status.played_bytes,
        skip_events = status.skip_events,
        wait_events = status.wait_events,
        silence_pulls = status.silence_pulls,
        "playback finished"
    );
    clock.pause();
    renderer.stop().context("stop output")?;
    if let Some(sink) = sink.as_mut() {
        sink.flush().context("flush output")?;
    }

    renderer.close();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn pull_offline(
    port: &ManualPort,
    pcm: &mut [u8],
    sink: Option<&mut BufWriter<File>>,
) -> Result<()> {
    let len = pcm.len();
    let Some(n) = port.pull(pcm, 0, len) else {
        return Ok(());
    };
    if let Some(sink) = sink {
        sink.write_all(&pcm[..n]).context("write output")?;
    }
    Ok(())
}
