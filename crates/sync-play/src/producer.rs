//! Producer side of the host: keeps a window of decoded blocks and feeds it
//! to the renderer on every tick.

use std::collections::VecDeque;
use std::time::Duration;

use audio_renderer::{AudioBlock, AudioRenderer};

use crate::tone::ToneGenerator;

pub(crate) struct Producer {
    tone: ToneGenerator,
    window: VecDeque<AudioBlock>,
    window_len: usize,
    end: Duration,
}

impl Producer {
    /// `window_len` blocks are kept ready; generation stops at `end`.
    pub(crate) fn new(tone: ToneGenerator, window_len: usize, end: Duration) -> Self {
        Self {
            tone,
            window: VecDeque::with_capacity(window_len),
            window_len: window_len.max(1),
            end,
        }
    }

    /// Drop ingested blocks, top up the window and push it to the renderer.
    pub(crate) fn tick(&mut self, renderer: &AudioRenderer) {
        if let Some(tag) = renderer.write_tag() {
            while self.window.front().is_some_and(|b| b.start_time < tag) {
                self.window.pop_front();
            }
        }
        while self.window.len() < self.window_len && self.tone.next_start() < self.end {
            self.window.push_back(self.tone.next_block());
        }
        renderer.render(self.window.make_contiguous(), 0);
    }

    /// Whether every block up to `end` has been handed to the renderer.
    pub(crate) fn is_drained(&self) -> bool {
        self.window.is_empty() && self.tone.next_start() >= self.end
    }
}
