//! Lock-free volume/balance/mute state and the 16-bit gain stage.
//!
//! Setters may run on any thread (UI, control plane) while the device thread
//! applies the gains. Volume and balance are packed into one `AtomicU64` and
//! the channel gains are derived from a single load, so the pull path never
//! pairs a volume from one update with a balance from another, and concurrent
//! setters never lose each other's writes.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Channel gains derived from volume and balance.
///
/// `left = volume × (1 - balance)` for positive balance, `right = volume ×
/// (1 + balance)` for negative balance; the other side keeps full volume.
pub fn channel_gains(volume: f32, balance: f32) -> (f32, f32) {
    let volume = clamp_volume(volume);
    let balance = clamp_balance(balance);
    let left = volume * if balance > 0.0 { 1.0 - balance } else { 1.0 };
    let right = volume * if balance < 0.0 { 1.0 + balance } else { 1.0 };
    (left, right)
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        return 0.0;
    }
    volume.clamp(0.0, 1.0)
}

fn clamp_balance(balance: f32) -> f32 {
    if balance.is_nan() {
        return 0.0;
    }
    balance.clamp(-1.0, 1.0)
}

fn pack(volume: f32, balance: f32) -> u64 {
    (u64::from(volume.to_bits()) << 32) | u64::from(balance.to_bits())
}

fn unpack(bits: u64) -> (f32, f32) {
    (
        f32::from_bits((bits >> 32) as u32),
        f32::from_bits(bits as u32),
    )
}

/// Shared gain state for a renderer.
pub struct GainState {
    /// Volume (high half) and balance (low half) as `f32` bits.
    settings: AtomicU64,
    muted: AtomicBool,
}

impl GainState {
    /// Out-of-range inputs are clamped.
    pub fn new(volume: f32, balance: f32, muted: bool) -> Self {
        Self {
            settings: AtomicU64::new(pack(clamp_volume(volume), clamp_balance(balance))),
            muted: AtomicBool::new(muted),
        }
    }

    fn settings(&self) -> (f32, f32) {
        unpack(self.settings.load(Ordering::Acquire))
    }

    /// Replace one half of the packed settings, keeping the other.
    fn update(&self, f: impl Fn(f32, f32) -> (f32, f32)) {
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .settings
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let (volume, balance) = unpack(bits);
                let (volume, balance) = f(volume, balance);
                Some(pack(volume, balance))
            });
    }

    pub fn volume(&self) -> f32 {
        self.settings().0
    }

    pub fn balance(&self) -> f32 {
        self.settings().1
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Set volume, clamped to `[0, 1]`.
    pub fn set_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        self.update(|_, balance| (volume, balance));
    }

    /// Set balance, clamped to `[-1, 1]`.
    pub fn set_balance(&self, balance: f32) {
        let balance = clamp_balance(balance);
        self.update(|volume, _| (volume, balance));
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// `(left, right)` derived from one consistent volume/balance snapshot.
    pub fn gains(&self) -> (f32, f32) {
        let (volume, balance) = self.settings();
        channel_gains(volume, balance)
    }

    /// Apply gain and mute in place to interleaved 16-bit LE stereo bytes.
    ///
    /// `buffer` must start on a frame boundary; a trailing odd byte is left
    /// untouched.
    pub fn apply(&self, buffer: &mut [u8]) {
        if self.is_muted() {
            buffer.fill(0);
            return;
        }
        let (left, right) = self.gains();
        if left == 1.0 && right == 1.0 {
            return;
        }
        for (i, sample) in buffer.chunks_exact_mut(2).enumerate() {
            let gain = if i % 2 == 0 { left } else { right };
            if gain == 1.0 {
                continue;
            }
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            let scaled = (f32::from(value) * gain) as i16;
            sample.copy_from_slice(&scaled.to_le_bytes());
        }
    }
}

impl Default for GainState {
    fn default() -> Self {
        Self::new(1.0, 0.0, false)
    }
}

impl fmt::Debug for GainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GainState")
            .field("volume", &self.volume())
            .field("balance", &self.balance())
            .field("muted", &self.is_muted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn centered_balance_keeps_both_channels() {
        assert_eq!(channel_gains(0.5, 0.0), (0.5, 0.5));
    }

    #[test]
    fn positive_balance_attenuates_left() {
        let (left, right) = channel_gains(1.0, 0.25);
        assert!((left - 0.75).abs() < 1e-6);
        assert_eq!(right, 1.0);
    }

    #[test]
    fn negative_balance_attenuates_right() {
        let (left, right) = channel_gains(0.8, -0.5);
        assert!((left - 0.8).abs() < 1e-6);
        assert!((right - 0.4).abs() < 1e-6);
    }

    #[test]
    fn gains_stay_in_unit_range() {
        for v in 0..=20 {
            for b in -20..=20 {
                let (l, r) = channel_gains(v as f32 / 20.0, b as f32 / 20.0);
                assert!((0.0..=1.0).contains(&l), "v={v} b={b} l={l}");
                assert!((0.0..=1.0).contains(&r), "v={v} b={b} r={r}");
            }
        }
    }

    #[test]
    fn setters_clamp_out_of_range_values() {
        let gain = GainState::default();
        gain.set_volume(3.0);
        assert_eq!(gain.volume(), 1.0);
        gain.set_volume(-1.0);
        assert_eq!(gain.volume(), 0.0);
        gain.set_balance(-7.0);
        assert_eq!(gain.balance(), -1.0);
        gain.set_balance(f32::NAN);
        assert_eq!(gain.balance(), 0.0);
    }

    #[test]
    fn setters_update_derived_gains() {
        let gain = GainState::default();
        gain.set_volume(0.5);
        gain.set_balance(1.0);
        assert_eq!(gain.gains(), (0.0, 0.5));
    }

    #[test]
    fn unity_gain_is_pass_through() {
        let gain = GainState::default();
        let mut buf = frames(&[1000, -1000, i16::MAX, i16::MIN]);
        gain.apply(&mut buf);
        assert_eq!(samples(&buf), vec![1000, -1000, i16::MAX, i16::MIN]);
    }

    #[test]
    fn apply_alternates_left_and_right() {
        let gain = GainState::new(1.0, 0.5, false);
        let mut buf = frames(&[1000, 1000, -2000, -2000]);
        gain.apply(&mut buf);
        assert_eq!(samples(&buf), vec![500, 1000, -1000, -2000]);
    }

    #[test]
    fn apply_truncates_toward_zero() {
        let gain = GainState::new(0.5, 0.0, false);
        let mut buf = frames(&[3, -3, i16::MIN, i16::MAX]);
        gain.apply(&mut buf);
        assert_eq!(samples(&buf), vec![1, -1, -16384, 16383]);
    }

    #[test]
    fn mute_zeroes_everything() {
        let gain = GainState::new(1.0, 0.0, true);
        let mut buf = frames(&[1234, -4321, 77, 88]);
        gain.apply(&mut buf);
        assert!(buf.iter().all(|b| *b == 0));
    }

    #[test]
    fn apply_never_overflows() {
        let gain = GainState::new(1.0, 0.0, false);
        for v in 0..=10 {
            gain.set_volume(v as f32 / 10.0);
            let mut buf = frames(&[i16::MIN, i16::MAX]);
            gain.apply(&mut buf);
            let out = samples(&buf);
            assert!(out[0] <= 0 && out[1] >= 0);
        }
    }

    #[test]
    fn concurrent_setters_keep_gains_consistent() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let gain = Arc::new(GainState::default());
        let barrier = Arc::new(Barrier::new(2));

        let volume_writer = {
            let gain = gain.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..10_000 {
                    gain.set_volume((i % 100) as f32 / 100.0);
                }
                gain.set_volume(0.25);
            })
        };
        let balance_writer = {
            let gain = gain.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for i in 0..10_000 {
                    gain.set_balance((i % 200) as f32 / 100.0 - 1.0);
                    let (volume, balance) = (gain.volume(), gain.balance());
                    assert!((0.0..=1.0).contains(&volume));
                    assert!((-1.0..=1.0).contains(&balance));
                }
                gain.set_balance(-0.5);
            })
        };
        volume_writer.join().unwrap();
        balance_writer.join().unwrap();

        // Neither writer's last value was lost, and the gains match them.
        assert_eq!(gain.volume(), 0.25);
        assert_eq!(gain.balance(), -0.5);
        assert_eq!(gain.gains(), channel_gains(0.25, -0.5));
    }
}
