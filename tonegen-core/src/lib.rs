#![cfg_attr(not(feature = "std"), no_std)]
//! Tonegen Core: no_std-ready DSP primitives for a click-free tone generator.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` and use `libm`/`micromath` math backends
//! - `fast-math`: polynomial sine in the waveform path
//!
//! Modules
//! - [`dsp`]       : math backend, constants, phase wrap, db/lin
//! - [`waveforms`] : `WaveformGenerator` trait and the four built-in shapes
//! - [`envelopes`] : linear fade envelope, frequency glide
//! - [`gain`]      : volume / decibel / balance model
//!
//! Design
//! - No heap allocations; pure sample-by-sample primitives
//! - Threads, queues and devices live in `tonegen-engine`

pub mod dsp;
pub mod envelopes;
pub mod gain;
pub mod waveforms;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::dsp::{
        clamp, db_to_lin, lin_to_db, phase_coefficient, sanitize, wrap_phase, I16_PEAK,
        MIN_LINEAR_GAIN, SILENCE_DB, TAU,
    };
    pub use crate::envelopes::{FadeDirection, FadeEnvelope, FrequencySmoother};
    pub use crate::gain::GainModel;
    pub use crate::waveforms::{
        ParseWaveformError, Sawtooth, Sinusoidal, Square, Triangle, Waveform, WaveformGenerator,
    };
}
