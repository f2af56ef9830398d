//! Signal producer: the always-on synthesis loop.
//!
//! The producer thread fills fixed-size buffers and pushes them into a bounded
//! handoff queue of capacity [`QUEUE_CAPACITY`]. When the queue is full the
//! thread blocks, so at most one buffer is being filled and two are waiting,
//! which bounds both latency and memory. It keeps running while playback is
//! stopped so the queue is warm when playback starts.
//!
//! Shutdown is signalled by dropping the sender side of a zero-capacity
//! channel. The loop `select!`s over the push and that signal, so a push that
//! is blocked on a full queue is abandoned immediately.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tonegen_core::dsp::{wrap_phase, TAU};
use tonegen_core::envelopes::FrequencySmoother;
use tonegen_core::waveforms::WaveformGenerator;
use tracing::{debug, error};

use crate::error::{EngineError, Result};
use crate::params::GeneratorParams;

/// Number of buffers the handoff queue holds.
pub const QUEUE_CAPACITY: usize = 2;

/// One block of mono 16-bit samples.
pub type SampleBuffer = Vec<i16>;

/// Oscillator state owned by the producer loop: phase and glided frequency.
#[derive(Copy, Clone, Debug)]
pub struct Synth {
    phase: f32,
    smoother: FrequencySmoother,
    sample_rate: u32,
    phase_coeff: f32,
}

impl Synth {
    /// Start at phase 0 with the glide already settled on the current target.
    pub fn new(params: &GeneratorParams) -> Self {
        let p = params.snapshot();
        Self {
            phase: 0.0,
            smoother: FrequencySmoother::new(p.frequency, p.sample_rate),
            sample_rate: p.sample_rate,
            phase_coeff: p.phase_coefficient(),
        }
    }

    /// Fill `out` from the shared parameters.
    ///
    /// Parameters are read once up front; a pending frequency reset is applied
    /// before the first sample.
    pub fn fill(&mut self, params: &GeneratorParams, out: &mut [i16]) {
        let p = params.snapshot();
        if p.sample_rate != self.sample_rate {
            self.sample_rate = p.sample_rate;
            self.phase_coeff = p.phase_coefficient();
            self.smoother.set_sample_rate(p.sample_rate);
        }
        if params.take_frequency_reset() {
            self.smoother.reset(p.frequency);
        }
        self.render(&p.waveform, p.frequency, p.amplitude, out);
    }

    /// Render with any generator. Each sample glides the frequency one step,
    /// evaluates `gen` at the current phase and then advances the phase.
    #[inline]
    pub fn render<G: WaveformGenerator + ?Sized>(
        &mut self,
        gen: &G,
        target_hz: f32,
        amplitude: f32,
        out: &mut [i16],
    ) {
        for s in out.iter_mut() {
            let hz = self.smoother.next(target_hz);
            *s = gen.value(self.phase, TAU, amplitude);
            self.phase = wrap_phase(self.phase + hz * self.phase_coeff);
        }
    }

    #[inline] pub fn phase(&self) -> f32 { self.phase }
    #[inline] pub fn smoothed_frequency(&self) -> f32 { self.smoother.value() }
}

/// Handle to the running producer thread.
#[derive(Debug)]
pub struct SignalProducer {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SignalProducer {
    /// Spawn the synthesis loop. Returns the handle and the consuming end of
    /// the handoff queue.
    pub fn spawn(
        params: Arc<GeneratorParams>,
        buffer_len: usize,
    ) -> Result<(Self, Receiver<SampleBuffer>)> {
        if buffer_len == 0 {
            return Err(EngineError::InvalidBufferSize);
        }
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("tonegen-producer".into())
            .spawn(move || run(&params, buffer_len, &tx, &shutdown_rx))
            .map_err(|source| EngineError::Thread { name: "producer", source })?;

        debug!(buffer_len, "signal producer started");
        Ok((Self { shutdown: Some(shutdown_tx), handle: Some(handle) }, rx))
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for the loop to exit. Idempotent.
    pub fn stop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("signal producer thread panicked");
            } else {
                debug!("signal producer stopped");
            }
        }
    }
}

impl Drop for SignalProducer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    params: &GeneratorParams,
    buffer_len: usize,
    tx: &Sender<SampleBuffer>,
    shutdown: &Receiver<()>,
) {
    let mut synth = Synth::new(params);
    loop {
        let mut buffer = vec![0i16; buffer_len];
        synth.fill(params, &mut buffer);
        select! {
            send(tx, buffer) -> res => {
                if res.is_err() {
                    debug!("handoff queue closed; producer exiting");
                    break;
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
}

// ------------------------------------ Tests --------------------------------------
