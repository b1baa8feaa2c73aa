use std::time::Duration;

/// A decoded span of interleaved 16-bit stereo PCM produced upstream.
///
/// `buffer` may be a pooled allocation larger than the payload; only the first
/// `buffer_length` bytes are audio.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioBlock {
    /// Presentation time of the first sample.
    pub start_time: Duration,
    pub buffer: Vec<u8>,
    pub buffer_length: usize,
}

impl AudioBlock {
    pub fn new(start_time: Duration, buffer: Vec<u8>) -> Self {
        let buffer_length = buffer.len();
        Self {
            start_time,
            buffer,
            buffer_length,
        }
    }

    /// The PCM payload.
    pub fn samples(&self) -> &[u8] {
        &self.buffer[..self.buffer_length.min(self.buffer.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_respects_buffer_length() {
        let mut block = AudioBlock::new(Duration::ZERO, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        block.buffer_length = 4;
        assert_eq!(block.samples(), &[1, 2, 3, 4]);
    }

    #[test]
    fn samples_never_overruns_buffer() {
        let mut block = AudioBlock::new(Duration::ZERO, vec![0; 4]);
        block.buffer_length = 64;
        assert_eq!(block.samples().len(), 4);
    }
}
