//! Output gain model: linear volume, decibels and stereo balance.
//!
//! Balance does not pan with a power law; it attenuates the opposite side
//! linearly so that the centre position leaves both channels at unity:
//!
//! | balance | left  | right |
//! |---------|-------|-------|
//! | -1      | 1     | 0     |
//! | 0       | 1     | 1     |
//! | +1      | 0     | 1     |
//!
//! The final per-channel multiplier is `channel_gain * volume`.

use crate::dsp::{db_to_lin, lin_to_db, sanitize};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GainModel {
    volume: f32,
    db: f32,
    balance: f32,
    left: f32,
    right: f32,
}

impl Default for GainModel {
    fn default() -> Self {
        Self { volume: 1.0, db: 0.0, balance: 0.0, left: 1.0, right: 1.0 }
    }
}

impl GainModel {
    /// Set the balance in `[-1, 1]` (clamped) and recompute the channel gains.
    pub fn set_balance(&mut self, balance: f32) {
        let b = sanitize(balance, -1.0, 1.0);
        self.balance = b;
        self.left = if b <= 0.0 { 1.0 } else { 1.0 - b };
        self.right = if b >= 0.0 { 1.0 } else { 1.0 + b };
    }

    /// Set the linear volume in `[0, 1]` (clamped).
    ///
    /// With `recalc_db` the stored decibel value follows the new volume; a
    /// volume below `1e-6` reads as the `-120 dB` floor.
    pub fn set_volume(&mut self, volume: f32, recalc_db: bool) {
        let v = sanitize(volume, 0.0, 1.0);
        self.volume = v;
        if recalc_db {
            self.db = lin_to_db(v);
        }
    }

    /// Set the level in decibels. The stored decibel value is kept verbatim and
    /// the volume is derived from it without converting back.
    pub fn set_decibel(&mut self, db: f32) {
        self.db = db;
        self.set_volume(db_to_lin(db), false);
    }

    #[inline] pub fn volume(&self) -> f32 { self.volume }
    #[inline] pub fn decibel(&self) -> f32 { self.db }
    #[inline] pub fn balance(&self) -> f32 { self.balance }
    #[inline] pub fn left_gain(&self) -> f32 { self.left }
    #[inline] pub fn right_gain(&self) -> f32 { self.right }

    /// `(left, right)` multipliers to hand to the sink.
    #[inline]
    pub fn channel_gains(&self) -> (f32, f32) {
        (self.left * self.volume, self.right * self.volume)
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::SILENCE_DB;

    #[test]
    fn balance_boundaries() {
        let mut g = GainModel::default();
        g.set_balance(1.0);
        assert_eq!((g.left_gain(), g.right_gain()), (0.0, 1.0));
        g.set_balance(-1.0);
        assert_eq!((g.left_gain(), g.right_gain()), (1.0, 0.0));
        g.set_balance(0.0);
        assert_eq!((g.left_gain(), g.right_gain()), (1.0, 1.0));
        g.set_balance(0.25);
        assert_eq!((g.left_gain(), g.right_gain()), (0.75, 1.0));
        g.set_balance(7.0);
        assert_eq!(g.balance(), 1.0);
    }

    #[test]
    fn gains_scale_with_volume() {
        let mut g = GainModel::default();
        g.set_balance(-0.5);
        g.set_volume(0.5, true);
        assert_eq!(g.channel_gains(), (0.5, 0.25));
    }

    #[test]
    fn volume_is_clamped() {
        let mut g = GainModel::default();
        g.set_volume(3.0, true);
        assert_eq!(g.volume(), 1.0);
        assert_eq!(g.decibel(), 0.0);
        g.set_volume(-1.0, true);
        assert_eq!(g.volume(), 0.0);
        assert_eq!(g.decibel(), SILENCE_DB);
    }

    #[test]
    fn decibel_roundtrip() {
        let mut g = GainModel::default();
        for v in [1.0e-5_f32, 0.001, 0.1, 0.5, 0.9, 1.0] {
            g.set_volume(v, true);
            let db = g.decibel();
            g.set_decibel(db);
            assert!((g.volume() - v).abs() <= v * 1.0e-4, "v={v} got {}", g.volume());
            assert_eq!(g.decibel(), db);
        }
    }

    #[test]
    fn volume_without_recalc_keeps_decibel() {
        let mut g = GainModel::default();
        g.set_decibel(-6.0);
        g.set_volume(0.2, false);
        assert_eq!(g.decibel(), -6.0);
        assert_eq!(g.volume(), 0.2);
    }

    #[test]
    fn very_low_decibel_is_silence() {
        let mut g = GainModel::default();
        g.set_decibel(-130.0);
        assert_eq!(g.volume(), 0.0);
        assert_eq!(g.channel_gains(), (0.0, 0.0));
    }
}
