//! Fixed-capacity byte ring buffer with a write tag.
//!
//! The ring carries interleaved PCM bytes from the producer (`render`, driven
//! by the host's tick) to the consumer (the device pull callback).
//!
//! ## Threading contract
//! - **Single producer / single consumer**: [`RingBuffer::write`] is only ever
//!   called from one thread at a time, and [`RingBuffer::read`] /
//!   [`RingBuffer::skip`] only from one (other) thread at a time.
//! - No operation blocks. Cursors are published with release stores and
//!   observed with acquire loads, so bytes are visible before the cursor that
//!   exposes them.
//! - [`RingBuffer::clear`] touches both cursors and must only run while
//!   neither side is active (device halted, producer serialized).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{RendererError, Result};

const TAG_UNSET: u64 = u64::MAX;

pub struct RingBuffer {
    data: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    /// Total bytes ever read (monotonic; index = pos % capacity).
    read_pos: AtomicUsize,
    /// Total bytes ever written (monotonic).
    write_pos: AtomicUsize,
    /// Nanosecond timestamp of the most recent write, or `TAG_UNSET`.
    write_tag: AtomicU64,
    bytes_per_second: usize,
}

// SAFETY: bytes in `data` are only written by the producer in the free region
// `[write_pos, read_pos + capacity)` and only read by the consumer in the
// readable region `[read_pos, write_pos)`. The regions never overlap and the
// release/acquire cursor handoff orders the byte accesses.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Create a ring holding `capacity` bytes.
    ///
    /// `bytes_per_second` converts written spans into durations for end tags.
    pub fn new(capacity: usize, bytes_per_second: usize) -> Self {
        let capacity = capacity.max(1);
        let data = (0..capacity).map(|_| UnsafeCell::new(0u8)).collect();
        Self {
            data,
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            write_tag: AtomicU64::new(TAG_UNSET),
            bytes_per_second: bytes_per_second.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes available to read.
    pub fn readable_count(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read).min(self.capacity)
    }

    /// Bytes that can be written without exceeding capacity.
    pub fn free_count(&self) -> usize {
        self.capacity - self.readable_count()
    }

    /// Occupancy ratio in `[0, 1]`.
    pub fn capacity_percent(&self) -> f64 {
        self.readable_count() as f64 / self.capacity as f64
    }

    /// Timestamp of the most recently written span, `None` before any write.
    pub fn write_tag(&self) -> Option<Duration> {
        match self.write_tag.load(Ordering::Acquire) {
            TAG_UNSET => None,
            ns => Some(Duration::from_nanos(ns)),
        }
    }

    fn base(&self) -> *mut u8 {
        // UnsafeCell<u8> has the same layout as u8.
        self.data.as_ptr() as *mut u8
    }

    /// Append `bytes` and tag the ring with `timestamp`.
    ///
    /// With `tag_end` the tag is moved to the end of the written span. Fails
    /// with [`RendererError::CapacityExceeded`] without writing anything when
    /// the bytes do not fit.
    pub fn write(&self, bytes: &[u8], timestamp: Duration, tag_end: bool) -> Result<()> {
        let write = self.write_pos.load(Ordering::Relaxed);
        let read = self.read_pos.load(Ordering::Acquire);
        let free = self.capacity - write.wrapping_sub(read).min(self.capacity);
        if bytes.len() > free {
            return Err(RendererError::CapacityExceeded {
                requested: bytes.len(),
                free,
            });
        }

        let start = write % self.capacity;
        let first = bytes.len().min(self.capacity - start);
        // SAFETY: both segments lie in the free region owned by the producer.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base().add(start), first);
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr().add(first),
                self.base(),
                bytes.len() - first,
            );
        }

        let tag = if tag_end {
            timestamp + self.span_duration(bytes.len())
        } else {
            timestamp
        };
        let tag_ns = u64::try_from(tag.as_nanos()).unwrap_or(TAG_UNSET - 1);
        self.write_tag.store(tag_ns.min(TAG_UNSET - 1), Ordering::Release);
        self.write_pos
            .store(write.wrapping_add(bytes.len()), Ordering::Release);
        Ok(())
    }

    /// Copy up to `dest.len()` readable bytes into `dest`; returns bytes copied.
    pub fn read(&self, dest: &mut [u8]) -> usize {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);
        let count = dest.len().min(write.wrapping_sub(read).min(self.capacity));
        if count == 0 {
            return 0;
        }

        let start = read % self.capacity;
        let first = count.min(self.capacity - start);
        // SAFETY: both segments lie in the readable region owned by the consumer.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(start), dest.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(
                self.base() as *const u8,
                dest.as_mut_ptr().add(first),
                count - first,
            );
        }

        self.read_pos
            .store(read.wrapping_add(count), Ordering::Release);
        count
    }

    /// Discard up to `count` readable bytes; returns bytes skipped.
    pub fn skip(&self, count: usize) -> usize {
        let read = self.read_pos.load(Ordering::Relaxed);
        let write = self.write_pos.load(Ordering::Acquire);
        let count = count.min(write.wrapping_sub(read).min(self.capacity));
        if count > 0 {
            self.read_pos
                .store(read.wrapping_add(count), Ordering::Release);
        }
        count
    }

    /// Reset both cursors and unset the write tag.
    pub fn clear(&self) {
        self.write_tag.store(TAG_UNSET, Ordering::Release);
        self.read_pos.store(0, Ordering::SeqCst);
        self.write_pos.store(0, Ordering::SeqCst);
    }

    fn span_duration(&self, bytes: usize) -> Duration {
        let ns = bytes as u128 * 1_000_000_000 / self.bytes_per_second as u128;
        Duration::from_nanos(u64::try_from(ns).unwrap_or(u64::MAX))
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("readable", &self.readable_count())
            .field("write_tag", &self.write_tag())
            .finish()
    }
}
