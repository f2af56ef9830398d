//! Envelope and parameter smoothing primitives.
//!
//! Provided:
//! - `FadeEnvelope`      : linear fade-in/fade-out gain used around start/stop
//! - `FrequencySmoother` : one-pole glide of the oscillator frequency
//!
//! Both are `no_std` friendly, `Copy`, and advance one sample per call.

use core::fmt::Debug;

use crate::dsp::clamp;

// -------------------------------- Fade envelope ----------------------------------

/// Which way the fade is moving.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// Linear fade envelope.
///
/// The level moves by a fixed `step` per sample toward 1 (`In`) or 0 (`Out`)
/// and is clamped to `[0, 1]`. A fade duration of zero gives `step = 1`, so the
/// target is reached on the first sample.
#[derive(Copy, Clone, Debug)]
pub struct FadeEnvelope {
    level: f32,
    step: f32,
}

impl FadeEnvelope {
    /// Silent envelope with a step derived from `fade_ms` at `sr`.
    #[inline]
    pub fn new(fade_ms: u32, sr: f32) -> Self {
        Self { level: 0.0, step: Self::step_for(fade_ms, sr) }
    }

    /// Per-sample increment: `1 / (sr * fade_ms / 1000)`, or 1 for no fade.
    #[inline]
    pub fn step_for(fade_ms: u32, sr: f32) -> f32 {
        if fade_ms == 0 {
            return 1.0;
        }
        let samples = sr.max(1.0) * (fade_ms as f32 / 1000.0);
        clamp(1.0 / samples, 0.0, 1.0)
    }

    /// Advance one sample and return the new level.
    #[inline]
    pub fn next(&mut self, dir: FadeDirection) -> f32 {
        let delta = match dir {
            FadeDirection::In => self.step,
            FadeDirection::Out => -self.step,
        };
        self.level = clamp(self.level + delta, 0.0, 1.0);
        self.level
    }

    /// Advance one sample and scale `x` by the new level.
    #[inline]
    pub fn apply(&mut self, x: i16, dir: FadeDirection) -> i16 {
        let g = self.next(dir);
        (f32::from(x) * g) as i16
    }

    #[inline] pub fn level(&self) -> f32 { self.level }
    #[inline] pub fn step(&self) -> f32 { self.step }
    #[inline] pub fn is_silent(&self) -> bool { self.level <= 0.0 }
    #[inline] pub fn is_open(&self) -> bool { self.level >= 1.0 }
}

// ------------------------------ Frequency smoother -------------------------------

/// Rate constant of the glide, in 1/s: the per-sample coefficient is `RATE / sr`.
pub const GLIDE_RATE: f32 = 20.0;

/// Exponential approach toward a target frequency:
/// `y += (target - y) * coeff`, with `coeff = GLIDE_RATE / sr` (at most 1).
///
/// Because `coeff` is in `(0, 1]`, the output never overshoots the target and
/// moves monotonically toward it after a step change.
#[derive(Copy, Clone, Debug)]
pub struct FrequencySmoother {
    coeff: f32,
    y: f32,
}

impl FrequencySmoother {
    #[inline]
    pub fn new(initial_hz: f32, sample_rate: u32) -> Self {
        Self { coeff: Self::coeff_for(sample_rate), y: initial_hz }
    }

    #[inline]
    fn coeff_for(sample_rate: u32) -> f32 {
        clamp(GLIDE_RATE / sample_rate.max(1) as f32, 0.0, 1.0)
    }

    #[inline]
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.coeff = Self::coeff_for(sample_rate);
    }

    /// Jump straight to `hz`, skipping the glide.
    #[inline]
    pub fn reset(&mut self, hz: f32) { self.y = hz; }

    #[inline]
    pub fn next(&mut self, target: f32) -> f32 {
        self.y += (target - self.y) * self.coeff;
        self.y
    }

    #[inline] pub fn value(&self) -> f32 { self.y }
    #[inline] pub fn coeff(&self) -> f32 { self.coeff }
}

// ------------------------------------ Tests --------------------------------------
