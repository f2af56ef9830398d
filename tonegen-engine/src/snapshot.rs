//! One-cycle snapshots for visualisation.
//!
//! A snapshot is computed from the *target* frequency (not the glided one) on
//! the caller's thread. It reads the shared parameters and never touches the
//! handoff queue, so it cannot stall the producer or the playback loop.

use std::sync::atomic::{AtomicBool, Ordering};

use tonegen_core::dsp::TAU;
use tonegen_core::waveforms::WaveformGenerator;

use crate::listener::EngineListener;
use crate::params::ParamSnapshot;

/// Longest period a snapshot will cover, in seconds of samples.
pub const MAX_CYCLE_SECONDS: u32 = 2;

/// Samples of one period, followed by one closing sample at phase 0.
///
/// Returns an empty vector when the frequency is not positive and finite, or
/// when one period is longer than [`MAX_CYCLE_SECONDS`].
pub fn one_cycle(p: &ParamSnapshot) -> Vec<i32> {
    if !(p.frequency.is_finite() && p.frequency > 0.0) {
        return Vec::new();
    }
    let step = p.frequency * p.phase_coefficient();
    let period = (TAU / step).round();
    let limit = f64::from(p.sample_rate) * f64::from(MAX_CYCLE_SECONDS);
    if !(period.is_finite() && f64::from(period) <= limit) {
        return Vec::new();
    }
    let size = period as usize;

    let mut out = Vec::with_capacity(size + 1);
    out.extend((0..size).map(|i| i32::from(p.waveform.value(step * i as f32, TAU, p.amplitude))));
    out.push(i32::from(p.waveform.value(0.0, TAU, p.amplitude)));
    out
}

#[derive(Debug, Default)]
pub struct CycleSnapshotPublisher {
    auto_update: AtomicBool,
}

impl CycleSnapshotPublisher {
    pub fn new(auto_update: bool) -> Self {
        Self { auto_update: AtomicBool::new(auto_update) }
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.auto_update.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update.load(Ordering::Relaxed)
    }

    /// Publish after a parameter change, if auto-update is on.
    pub fn parameters_changed(&self, p: &ParamSnapshot, listener: &dyn EngineListener) {
        if self.auto_update() {
            self.publish(p, listener);
        }
    }

    /// Compute and publish unconditionally. Returns whether anything was sent.
    pub fn publish(&self, p: &ParamSnapshot, listener: &dyn EngineListener) -> bool {
        let cycle = one_cycle(p);
        if cycle.is_empty() {
            return false;
        }
        listener.on_one_cycle(&cycle);
        true
    }
}
