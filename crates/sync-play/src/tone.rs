//! Sine tone source producing fixed-length [`AudioBlock`]s.

use std::f32::consts::TAU;
use std::time::Duration;

use audio_renderer::{AudioBlock, OutputFormat};

pub struct ToneGenerator {
    format: OutputFormat,
    frequency: f32,
    amplitude: f32,
    block_frames: usize,
    phase: f32,
    next_start: Duration,
}

impl ToneGenerator {
    pub fn new(format: OutputFormat, frequency: f32, block: Duration) -> Self {
        let block_frames = (format.bytes_for(block) / format.frame_size()).max(1);
        Self {
            format,
            frequency,
            amplitude: 0.5,
            block_frames,
            phase: 0.0,
            next_start: Duration::ZERO,
        }
    }

    /// Presentation time of the next block.
    pub fn next_start(&self) -> Duration {
        self.next_start
    }

    pub fn next_block(&mut self) -> AudioBlock {
        let step = TAU * self.frequency / self.format.sample_rate as f32;
        let mut buffer = Vec::with_capacity(self.block_frames * self.format.frame_size());
        for _ in 0..self.block_frames {
            let sample = (self.phase.sin() * self.amplitude * f32::from(i16::MAX)) as i16;
            let bytes = sample.to_le_bytes();
            for _ in 0..self.format.channels {
                buffer.extend_from_slice(&bytes);
            }
            self.phase = (self.phase + step) % TAU;
        }

        let block = AudioBlock::new(self.next_start, buffer);
        self.next_start += self.format.duration_for(block.buffer_length);
        block
    }
}
