//! Renderer settings from an optional TOML file plus CLI overrides.

use std::path::Path;

use anyhow::{Context, Result};
use audio_renderer::RendererConfig;

use crate::cli::Args;

pub fn load(args: &Args) -> Result<RendererConfig> {
    let mut config = match &args.config {
        Some(path) => read_file(path)?,
        None => RendererConfig::default(),
    };
    apply_overrides(&mut config, args);
    Ok(config)
}

fn read_file(path: &Path) -> Result<RendererConfig> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read config {path:?}"))?;
    toml::from_str(&text).with_context(|| format!("parse config {path:?}"))
}

fn apply_overrides(config: &mut RendererConfig, args: &Args) {
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(latency) = args.latency_ms {
        config.desired_latency_ms = latency;
    }
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
    if let Some(balance) = args.balance {
        config.balance = balance;
    }
    if args.mute {
        config.muted = true;
    }
}
