//! Generic DSP utilities and math helpers.
//!
//! Design goals:
//! - `no_std` ready (guarded by the crate feature `no-std`)
//! - Math backend selection that works in both `std` and `no_std` contexts
//! - Optional `fast-math` approximation for the sine hot path
//! - Clean, side-effect free helpers that are easy to test
//!
//! Conventions:
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Phases are radians in `[0, TAU)`; gains are linear unless named `db`.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // micromath preferred if explicitly requested (works in no_std)
    if #[cfg(feature = "micromath")] {
        use micromath::F32Ext as _;
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_log10(x: f32) -> f32 { x.log10() }
        #[inline] fn m_powf(x: f32, y: f32) -> f32 { x.powf(y) }
    // libm (C math) in no_std
    } else if #[cfg(feature = "no-std")] {
        #[inline] fn m_sin(x: f32) -> f32 { libm::sinf(x) }
        #[inline] fn m_log10(x: f32) -> f32 { libm::log10f(x) }
        #[inline] fn m_powf(x: f32, y: f32) -> f32 { libm::powf(x, y) }
    // std backend
    } else {
        #[inline] fn m_sin(x: f32) -> f32 { x.sin() }
        #[inline] fn m_log10(x: f32) -> f32 { x.log10() }
        #[inline] fn m_powf(x: f32, y: f32) -> f32 { x.powf(y) }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π, the period every generator is driven with.
pub const TAU: f32 = 2.0 * PI;

/// Full-scale value of a signed 16-bit sample, symmetric around zero.
pub const I16_PEAK: f32 = i16::MAX as f32;

/// Decibel value reported for (near) silence instead of `-inf`.
pub const SILENCE_DB: f32 = -120.0;

/// Linear gains below this are treated as silence.
pub const MIN_LINEAR_GAIN: f32 = 1.0e-6;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

/// Like [`clamp`], but maps NaN to `lo` so a bad host value can never poison state.
#[inline]
pub fn sanitize(x: f32, lo: f32, hi: f32) -> f32 {
    if x.is_nan() { lo } else { clamp(x, lo, hi) }
}

#[inline]
pub fn abs(x: f32) -> f32 {
    if x < 0.0 { -x } else { x }
}

/// Wrap a non-negative phase into `[0, TAU)`.
///
/// The common case (at most one period over) is a single subtraction; larger
/// jumps fall back to a remainder.
#[inline]
pub fn wrap_phase(mut p: f32) -> f32 {
    if p >= TAU {
        p -= TAU;
        if p >= TAU {
            p %= TAU;
        }
    }
    if p < 0.0 {
        p = (p % TAU) + TAU;
        if p >= TAU {
            p = 0.0;
        }
    }
    p
}

/// Convert a sample rate into the per-Hz phase increment (`TAU / sr`).
#[inline]
pub fn phase_coefficient(sample_rate: u32) -> f32 {
    TAU / sample_rate.max(1) as f32
}

// --------------------------------- dB / linear -----------------------------------

/// Convert dB to linear gain: `lin = 10^(db/20)`, flushed to 0 below [`MIN_LINEAR_GAIN`].
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    let lin = m_powf(10.0, db / 20.0);
    if lin < MIN_LINEAR_GAIN { 0.0 } else { lin }
}

/// Convert linear gain to dB: `db = 20*log10(lin)`, or [`SILENCE_DB`] below [`MIN_LINEAR_GAIN`].
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin >= MIN_LINEAR_GAIN { 20.0 * m_log10(lin) } else { SILENCE_DB }
}

// --------------------------------- Sine -------------------------------------------

/// Sine used by the sinusoidal generator.
///
/// With `fast-math` this is a 7th-order odd polynomial after range reduction into
/// [-π/2, π/2] (max abs error ~2e-4); otherwise the backend's exact sine.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = wrap_phase(x);
            if xr > PI {
                xr -= TAU;
            }
            // fold into [-π/2, π/2] where the Taylor series is accurate
            if xr > 0.5 * PI {
                xr = PI - xr;
            } else if xr < -0.5 * PI {
                xr = -PI - xr;
            }
            let x2 = xr * xr;
            let x3 = x2 * xr;
            let y = xr + (-1.0 / 6.0) * x3 + (1.0 / 120.0) * x3 * x2 + (-1.0 / 5040.0) * x3 * x2 * x2;
            clamp(y, -1.0, 1.0)
        } else {
            m_sin(x)
        }
    }
}

// --------------------------------- Tests (std only) ------------------------------
