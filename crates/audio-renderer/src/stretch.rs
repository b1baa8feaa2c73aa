//! Speed-ratio aware reads from the ring.
//!
//! - `1.0`: straight read.
//! - `> 1.0`: straight read as well. There is no resampling or pitch
//!   correction; the sync stage catches up by skipping, which amounts to
//!   decimation. This is a known simplification, not a resampler.
//! - `< 1.0`: read fewer frames than requested and expand them to the full
//!   request by repeating whole frames at a fixed cadence.
//!
//! All reads are frame-aligned.

use crate::format::OutputFormat;
use crate::ring::RingBuffer;

/// Read `min(out.len(), readable)` bytes, rounded down to whole frames.
pub fn read_straight(ring: &RingBuffer, out: &mut [u8], format: &OutputFormat) -> usize {
    let count = format.align(out.len().min(ring.readable_count()));
    ring.read(&mut out[..count])
}

/// Fast-forward read: raw bytes, no resampling.
pub fn read_fast_forward(ring: &RingBuffer, out: &mut [u8], format: &OutputFormat) -> usize {
    read_straight(ring, out, format)
}

/// Bytes the slow-motion path pulls from the ring for a request.
///
/// At least one frame, at most what is readable, otherwise
/// `floor(requested × speed)` rounded down to a frame.
pub fn slow_down_read_size(
    requested: usize,
    speed_ratio: f64,
    readable: usize,
    format: &OutputFormat,
) -> usize {
    let scaled = (requested as f64 * speed_ratio.clamp(0.0, 1.0)).floor() as usize;
    format
        .align(scaled)
        .max(format.frame_size())
        .min(format.align(readable))
}

/// Slow-motion read: fills all of `out` from fewer ring bytes.
///
/// `raw` is scratch space for the bytes taken from the ring and must be at
/// least `out.len()` long. Returns `out.len()` (frame-aligned) or 0 when the
/// ring holds less than a frame.
pub fn read_slow_down(
    ring: &RingBuffer,
    out: &mut [u8],
    raw: &mut [u8],
    speed_ratio: f64,
    format: &OutputFormat,
) -> usize {
    let requested = format.align(out.len().min(raw.len()));
    let to_read = slow_down_read_size(requested, speed_ratio, ring.readable_count(), format);
    if to_read == 0 {
        return 0;
    }
    if to_read >= requested {
        return read_straight(ring, &mut out[..requested], format);
    }

    let got = ring.read(&mut raw[..to_read]);
    stretch_frames(&raw[..got], &mut out[..requested], format.frame_size());
    requested
}

/// Expand `src` to fill `out` by repeating whole frames.
///
/// A duplicate is inserted every `out_frames / (out_frames − src_frames)`
/// output frames, tracked with a fractional accumulator so the remainder
/// carries over. Output is always exactly `out.len()` rounded down to a
/// frame; the source index never passes the last whole source frame.
pub fn stretch_frames(src: &[u8], out: &mut [u8], frame_size: usize) {
    let out_frames = out.len() / frame_size;
    let src_frames = src.len() / frame_size;
    if src_frames == 0 {
        out.fill(0);
        return;
    }
    if src_frames >= out_frames {
        let n = out_frames * frame_size;
        out[..n].copy_from_slice(&src[..n]);
        return;
    }

    let step_size = out_frames as f64 / (out_frames - src_frames) as f64;
    let mut step_accum = 0.0f64;
    let mut src_frame = 0usize;
    for dst in out.chunks_exact_mut(frame_size).take(out_frames) {
        let at = src_frame * frame_size;
        dst.copy_from_slice(&src[at..at + frame_size]);
        step_accum += 1.0;
        if step_accum >= step_size {
            // Repeat this frame on the next output slot.
            step_accum -= step_size;
        } else if src_frame + 1 < src_frames {
            src_frame += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn format() -> OutputFormat {
        OutputFormat::stereo16(48_000).unwrap()
    }

    /// Frames tagged with their index in every byte pair.
    fn numbered_frames(count: usize) -> Vec<u8> {
        (0..count)
            .flat_map(|i| {
                let v = (i as u16).to_le_bytes();
                [v[0], v[1], v[0], v[1]]
            })
            .collect()
    }

    fn frame_ids(bytes: &[u8]) -> Vec<u16> {
        bytes
            .chunks_exact(4)
            .map(|f| u16::from_le_bytes([f[0], f[1]]))
            .collect()
    }

    fn ring_with(bytes: &[u8]) -> RingBuffer {
        let ring = RingBuffer::new(bytes.len().max(4) * 2, 192_000);
        ring.write(bytes, Duration::ZERO, false).unwrap();
        ring
    }

    #[test]
    fn straight_read_is_frame_aligned() {
        let ring = ring_with(&[1; 10]);
        let mut out = [0u8; 64];
        assert_eq!(read_straight(&ring, &mut out, &format()), 8);
        assert_eq!(ring.readable_count(), 2);
    }

    #[test]
    fn fast_forward_reads_raw_bytes() {
        let src = numbered_frames(8);
        let ring = ring_with(&src);
        let mut out = [0u8; 16];
        assert_eq!(read_fast_forward(&ring, &mut out, &format()), 16);
        assert_eq!(frame_ids(&out), vec![0, 1, 2, 3]);
    }

    #[test]
    fn half_speed_reads_half_and_doubles_frames() {
        let src = numbered_frames(500);
        let ring = ring_with(&src);
        let mut out = vec![0u8; 1000];
        let mut raw = vec![0u8; 8000];

        let n = read_slow_down(&ring, &mut out, &mut raw, 0.5, &format());
        assert_eq!(n, 1000);
        // 500 bytes (125 frames) consumed.
        assert_eq!(ring.readable_count(), src.len() - 500);

        let ids = frame_ids(&out);
        assert_eq!(ids.len(), 250);
        assert_eq!(&ids[..6], &[0, 1, 1, 2, 2, 3]);
        // Every source frame appears, in order.
        let mut distinct = ids.clone();
        distinct.dedup();
        assert_eq!(distinct, (0..125).collect::<Vec<u16>>());
    }

    #[test]
    fn stretch_output_is_exact_for_every_read_size() {
        let frame = 4;
        let requested = 400;
        let src = numbered_frames(requested / frame);
        for to_read in (frame..=requested - frame).step_by(frame) {
            let mut out = vec![0xAAu8; requested];
            stretch_frames(&src[..to_read], &mut out, frame);
            let ids = frame_ids(&out);
            assert_eq!(ids.len(), requested / frame, "to_read={to_read}");
            assert!(out.iter().all(|b| *b != 0xAA), "to_read={to_read}");
            // Never reads past the source.
            assert!(ids.iter().all(|id| usize::from(*id) < to_read / frame));
            // Non-decreasing, no source frame skipped.
            assert!(ids.windows(2).all(|w| w[1] == w[0] || w[1] == w[0] + 1));
        }
    }

    #[test]
    fn slow_down_read_size_bounds() {
        let f = format();
        assert_eq!(slow_down_read_size(1000, 0.5, 10_000, &f), 500);
        assert_eq!(slow_down_read_size(1000, 0.5, 200, &f), 200);
        assert_eq!(slow_down_read_size(4, 0.1, 10_000, &f), 4);
        assert_eq!(slow_down_read_size(1000, 0.333, 10_000, &f), 332);
        assert_eq!(slow_down_read_size(1000, 0.5, 2, &f), 0);
    }

    #[test]
    fn slow_down_with_short_ring_still_fills_request() {
        let ring = ring_with(&numbered_frames(10));
        let mut out = vec![0u8; 1000];
        let mut raw = vec![0u8; 1000];
        assert_eq!(read_slow_down(&ring, &mut out, &mut raw, 0.5, &format()), 1000);
        assert_eq!(ring.readable_count(), 0);
        assert_eq!(*frame_ids(&out).last().unwrap(), 9);
    }

    #[test]
    fn slow_down_on_empty_ring_reads_nothing() {
        let ring = RingBuffer::new(64, 192_000);
        let mut out = vec![0u8; 64];
        let mut raw = vec![0u8; 64];
        assert_eq!(read_slow_down(&ring, &mut out, &mut raw, 0.5, &format()), 0);
    }

    #[test]
    fn near_unity_slow_down_falls_back_to_straight_read() {
        let ring = ring_with(&numbered_frames(4));
        let mut out = vec![0u8; 4];
        let mut raw = vec![0u8; 4];
        assert_eq!(read_slow_down(&ring, &mut out, &mut raw, 0.99, &format()), 4);
        assert_eq!(frame_ids(&out), vec![0]);
    }
}
