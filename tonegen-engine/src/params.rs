//! Lock-free generator parameters shared between the host and the producer.
//!
//! Each field is a single atomic word. Writers may run on any thread; the
//! producer samples the block once per buffer, so a change lands on the next
//! buffer at the latest.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use atomic_float::AtomicF32;
use tonegen_core::dsp::{phase_coefficient, sanitize};
use tonegen_core::waveforms::Waveform;

use crate::config::EngineConfig;

#[derive(Debug)]
pub struct GeneratorParams {
    frequency: AtomicF32,
    amplitude: AtomicF32,
    waveform: AtomicU8,
    sample_rate: AtomicU32,
    reset_frequency: AtomicBool,
}

/// Plain copy of the parameters, taken once per buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParamSnapshot {
    pub frequency: f32,
    pub amplitude: f32,
    pub waveform: Waveform,
    pub sample_rate: u32,
}

impl ParamSnapshot {
    /// Phase increment per Hz at this sample rate.
    #[inline]
    pub fn phase_coefficient(&self) -> f32 {
        phase_coefficient(self.sample_rate)
    }
}

impl GeneratorParams {
    pub fn new(config: &EngineConfig) -> Self {
        let p = Self {
            frequency: AtomicF32::new(0.0),
            amplitude: AtomicF32::new(0.0),
            waveform: AtomicU8::new(config.waveform.as_u8()),
            sample_rate: AtomicU32::new(1),
            reset_frequency: AtomicBool::new(false),
        };
        p.set_frequency(config.frequency_hz);
        p.set_amplitude(config.amplitude);
        p.set_sample_rate(config.sample_rate);
        p
    }

    /// Target frequency in Hz. Negative and NaN values become 0.
    pub fn set_frequency(&self, hz: f32) {
        self.frequency.store(sanitize(hz, 0.0, f32::MAX), Ordering::Relaxed);
    }

    pub fn frequency(&self) -> f32 {
        self.frequency.load(Ordering::Relaxed)
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.amplitude.store(sanitize(amplitude, 0.0, 1.0), Ordering::Relaxed);
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude.load(Ordering::Relaxed)
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.waveform.store(waveform.as_u8(), Ordering::Relaxed);
    }

    pub fn waveform(&self) -> Waveform {
        Waveform::from_u8(self.waveform.load(Ordering::Relaxed))
    }

    /// Sample rate in Hz, at least 1.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate.max(1), Ordering::Relaxed);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Ask the producer to skip the glide and jump to the target frequency.
    pub fn request_frequency_reset(&self) {
        self.reset_frequency.store(true, Ordering::Release);
    }

    /// Consume a pending reset request.
    pub(crate) fn take_frequency_reset(&self) -> bool {
        self.reset_frequency.swap(false, Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            frequency: self.frequency(),
            amplitude: self.amplitude(),
            waveform: self.waveform(),
            sample_rate: self.sample_rate(),
        }
    }
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp() {
        let p = GeneratorParams::default();
        p.set_amplitude(4.0);
        assert_eq!(p.amplitude(), 1.0);
        p.set_amplitude(f32::NAN);
        assert_eq!(p.amplitude(), 0.0);
        p.set_frequency(-20.0);
        assert_eq!(p.frequency(), 0.0);
        p.set_sample_rate(0);
        assert_eq!(p.sample_rate(), 1);
    }

    #[test]
    fn reset_request_is_consumed_once() {
        let p = GeneratorParams::default();
        assert!(!p.take_frequency_reset());
        p.request_frequency_reset();
        assert!(p.take_frequency_reset());
        assert!(!p.take_frequency_reset());
    }

    #[test]
    fn snapshot_reflects_config() {
        let cfg = EngineConfig { frequency_hz: 440.0, waveform: Waveform::Square, ..Default::default() };
        let s = GeneratorParams::new(&cfg).snapshot();
        assert_eq!(s.frequency, 440.0);
        assert_eq!(s.waveform, Waveform::Square);
        assert_eq!(s.sample_rate, 48_000);
    }
}
