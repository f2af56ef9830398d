//! Waveform generators: pure `(phase, period, amplitude) -> i16` shapes.
//!
//! Provided shapes:
//! - `Sinusoidal` : `a * MAX * sin(phase)`
//! - `Triangle`   : symmetric linear ramp, starts at +peak, −peak at half period
//! - `Square`     : naive (non band-limited) ±peak, high for the first half period
//! - `Sawtooth`   : ramp from −peak to +peak, computed with a fixed π constant
//!
//! Every generator is stateless and allocation free. The phase is owned by the
//! caller, so swapping shapes mid-stream never resets or jumps the phase.
//! New shapes implement [`WaveformGenerator`]; the [`Waveform`] tag covers the
//! built-in ones and is what gets stored atomically by the engine.

use core::fmt;
use core::str::FromStr;

use crate::dsp::{abs, fast_sin, I16_PEAK};

/// One sample of a periodic shape.
///
/// `phase` is in `[0, period)`, `amplitude` in `[0, 1]`. The result lies in
/// `[-32767 * amplitude, 32767 * amplitude]`, truncated toward zero.
pub trait WaveformGenerator {
    fn value(&self, phase: f32, period: f32, amplitude: f32) -> i16;
}

#[inline]
fn scale(amplitude: f32, unit: f32) -> i16 {
    // `as` truncates toward zero and saturates, so out-of-range input cannot wrap.
    (amplitude * I16_PEAK * unit) as i16
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Sinusoidal;

impl WaveformGenerator for Sinusoidal {
    #[inline]
    fn value(&self, phase: f32, _period: f32, amplitude: f32) -> i16 {
        scale(amplitude, fast_sin(phase))
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Triangle;

impl WaveformGenerator for Triangle {
    #[inline]
    fn value(&self, phase: f32, period: f32, amplitude: f32) -> i16 {
        let t = phase / period;
        scale(amplitude, 4.0 * abs(t - 0.5) - 1.0)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Square;

impl WaveformGenerator for Square {
    #[inline]
    fn value(&self, phase: f32, period: f32, amplitude: f32) -> i16 {
        if phase <= period / 2.0 {
            scale(amplitude, 1.0)
        } else {
            scale(amplitude, -1.0)
        }
    }
}

/// Sawtooth ramp.
///
/// The slope uses π directly rather than `period`, so the shape is only
/// meaningful for `period == TAU`, which is the only period the engine uses.
#[derive(Copy, Clone, Debug, Default)]
pub struct Sawtooth;

impl WaveformGenerator for Sawtooth {
    #[inline]
    fn value(&self, phase: f32, period: f32, amplitude: f32) -> i16 {
        let ramp = 2.0 * phase / core::f32::consts::PI;
        if phase < period / 2.0 {
            scale(amplitude, ramp - 1.0)
        } else {
            scale(amplitude, ramp - 3.0)
        }
    }
}

/// Tag for the built-in shapes. `Copy` and `repr(u8)` so it can live in an atomic.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Waveform {
    #[default]
    Sine = 0,
    Triangle = 1,
    Square = 2,
    Sawtooth = 3,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [Self::Sine, Self::Triangle, Self::Square, Self::Sawtooth];

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a stored tag. Unknown values fall back to `Sine`.
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Triangle,
            2 => Self::Square,
            3 => Self::Sawtooth,
            _ => Self::Sine,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sine => "sine",
            Self::Triangle => "triangle",
            Self::Square => "square",
            Self::Sawtooth => "sawtooth",
        }
    }
}

impl WaveformGenerator for Waveform {
    #[inline]
    fn value(&self, phase: f32, period: f32, amplitude: f32) -> i16 {
        match self {
            Self::Sine => Sinusoidal.value(phase, period, amplitude),
            Self::Triangle => Triangle.value(phase, period, amplitude),
            Self::Square => Square.value(phase, period, amplitude),
            Self::Sawtooth => Sawtooth.value(phase, period, amplitude),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a waveform name is not recognised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseWaveformError;

impl fmt::Display for ParseWaveformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown waveform (expected sine, triangle, square or sawtooth)")
    }
}

impl FromStr for Waveform {
    type Err = ParseWaveformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let is = |name: &str| s.eq_ignore_ascii_case(name);
        if is("sine") || is("sin") || is("sinusoidal") {
            Ok(Self::Sine)
        } else if is("triangle") || is("tri") {
            Ok(Self::Triangle)
        } else if is("square") || is("squarewave") {
            Ok(Self::Square)
        } else if is("sawtooth") || is("saw") {
            Ok(Self::Sawtooth)
        } else {
            Err(ParseWaveformError)
        }
    }
}

// ------------------------------------ Tests --------------------------------------
