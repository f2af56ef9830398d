//! Startup configuration for a [`SoundGenerator`](crate::SoundGenerator).

use tonegen_core::waveforms::Waveform;

/// Default fade-in/fade-out length around start/stop.
pub const DEFAULT_FADE_MS: u32 = 20;

/// Default sample rate used before `init` supplies one.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Initial parameter values. Every field can be changed later through the
/// matching setter; out-of-range values are clamped when applied.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub frequency_hz: f32,
    pub amplitude: f32,
    pub waveform: Waveform,
    pub volume: f32,
    pub balance: f32,
    pub fade_ms: u32,
    pub clean_start: bool,
    pub auto_update_one_cycle: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            frequency_hz: 50.0,
            amplitude: 1.0,
            waveform: Waveform::Sine,
            volume: 1.0,
            balance: 0.0,
            fade_ms: DEFAULT_FADE_MS,
            clean_start: false,
            auto_update_one_cycle: false,
        }
    }
}
