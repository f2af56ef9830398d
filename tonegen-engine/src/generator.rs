//! `SoundGenerator`: the host-facing API.
//!
//! Owns the shared parameter block, the gain model, and (after `init`) a
//! session made of an open sink, the producer thread and the playback engine.
//! Every method takes `&self` and may be called from any thread; parameter
//! setters are lock-free or take a short uncontended lock and are observed by
//! the audio threads on their next iteration.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tonegen_core::gain::GainModel;
use tonegen_core::waveforms::Waveform;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::listener::{EngineListener, NullListener};
use crate::params::GeneratorParams;
use crate::playback::{PlaybackEngine, PlaybackState};
use crate::producer::SignalProducer;
use crate::sink::{lock, AudioBackend, OutputSink};
use crate::snapshot::CycleSnapshotPublisher;

struct Session<S: OutputSink> {
    sink: Arc<S>,
    playback: PlaybackEngine<S>,
    producer: Mutex<SignalProducer>,
    sample_rate: u32,
}

impl<S: OutputSink> Session<S> {
    /// Fade out, then stop the producer, then release the sink. The fade needs
    /// the producer alive to keep the queue fed, hence the order.
    fn close(&self) {
        self.playback.shutdown();
        lock(&self.producer).stop();
        self.sink.release();
        debug!(sample_rate = self.sample_rate, "session closed");
    }
}

pub struct SoundGenerator<B: AudioBackend> {
    backend: B,
    params: Arc<GeneratorParams>,
    gain: Mutex<GainModel>,
    fade_ms: AtomicU32,
    clean_start: AtomicBool,
    snapshots: CycleSnapshotPublisher,
    listener: Arc<dyn EngineListener>,
    session: Mutex<Option<Arc<Session<B::Sink>>>>,
}

impl<B: AudioBackend> SoundGenerator<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self::with_listener(backend, config, Arc::new(NullListener))
    }

    pub fn with_listener(backend: B, config: EngineConfig, listener: Arc<dyn EngineListener>) -> Self {
        let mut gain = GainModel::default();
        gain.set_balance(config.balance);
        gain.set_volume(config.volume, true);
        Self {
            backend,
            params: Arc::new(GeneratorParams::new(&config)),
            gain: Mutex::new(gain),
            fade_ms: AtomicU32::new(config.fade_ms),
            clean_start: AtomicBool::new(config.clean_start),
            snapshots: CycleSnapshotPublisher::new(config.auto_update_one_cycle),
            listener,
            session: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn session(&self) -> Option<Arc<Session<B::Sink>>> {
        lock(&self.session).clone()
    }

    // ------------------------------ lifecycle ------------------------------------

    /// Open the sink at `sample_rate` and start the producer.
    ///
    /// Returns `false` on failure; the instance stays usable and `init` may be
    /// retried with other parameters.
    pub fn init(&self, sample_rate: u32) -> bool {
        match self.try_init(sample_rate) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, sample_rate, "init failed");
                false
            }
        }
    }

    /// Like [`init`](Self::init) but reports why it failed. An existing
    /// session is closed first.
    pub fn try_init(&self, sample_rate: u32) -> Result<()> {
        // Closed without the lock held: closing joins the playback thread,
        // whose listener callbacks may call back into this generator.
        let old = lock(&self.session).take();
        if let Some(old) = old {
            old.close();
        }

        let sink = Arc::new(self.backend.open(sample_rate)?);
        let (left, right) = lock(&self.gain).channel_gains();
        sink.set_channel_gains(left, right);

        self.params.set_sample_rate(sample_rate);
        let buffer_len = sink.min_buffer_size();
        let (producer, queue) = match SignalProducer::spawn(Arc::clone(&self.params), buffer_len) {
            Ok(p) => p,
            Err(e) => {
                sink.release();
                return Err(e);
            }
        };
        let playback = PlaybackEngine::new(Arc::clone(&sink), queue, Arc::clone(&self.listener));

        let session = Arc::new(Session {
            sink,
            playback,
            producer: Mutex::new(producer),
            sample_rate,
        });
        // a concurrent init may have installed its own session meanwhile
        let replaced = lock(&self.session).replace(session);
        if let Some(replaced) = replaced {
            replaced.close();
        }
        info!(sample_rate, buffer_len, "sound generator initialized");
        Ok(())
    }

    /// Start playback with a fade-in. Ignored when already playing or stopping,
    /// or before `init`.
    pub fn start(&self) {
        let Some(s) = self.session() else {
            debug!("start ignored: not initialized");
            return;
        };
        if s.playback.is_active() {
            return;
        }
        if self.clean_start.load(Ordering::Relaxed) {
            self.params.request_frequency_reset();
        }
        let fade_ms = self.fade_ms.load(Ordering::Relaxed);
        if let Err(e) = s.playback.start(fade_ms, self.params.sample_rate()) {
            error!(error = %e, "failed to start playback");
        }
    }

    /// Begin the fade-out. Returns immediately; see
    /// [`wait_until_idle`](Self::wait_until_idle) to await completion.
    pub fn stop(&self) {
        if let Some(s) = self.session() {
            s.playback.stop();
        }
    }

    /// Block until a pending fade-out has finished.
    pub fn wait_until_idle(&self) {
        if let Some(s) = self.session() {
            if s.playback.state() == PlaybackState::Stopping {
                s.playback.wait_idle();
            }
        }
    }

    /// Fade out if needed, stop the producer and release the sink. Returns
    /// once all of that is done. Safe to call repeatedly or before `init`.
    pub fn release(&self) {
        let session = lock(&self.session).take();
        if let Some(s) = session {
            s.close();
            info!("sound generator released");
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback_state() != PlaybackState::Idle
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.session().map_or(PlaybackState::Idle, |s| s.playback.state())
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.session).is_some()
    }

    // ------------------------------ generator ------------------------------------

    pub fn set_frequency(&self, hz: f32) {
        self.params.set_frequency(hz);
        self.parameters_changed();
    }

    pub fn frequency(&self) -> f32 {
        self.params.frequency()
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.params.set_amplitude(amplitude);
        self.parameters_changed();
    }

    pub fn amplitude(&self) -> f32 {
        self.params.amplitude()
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        if self.params.waveform() == waveform {
            return;
        }
        self.params.set_waveform(waveform);
        self.parameters_changed();
    }

    pub fn waveform(&self) -> Waveform {
        self.params.waveform()
    }

    /// Change the synthesis rate. The open sink keeps the rate it was opened
    /// with; re-`init` to change both.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.params.set_sample_rate(sample_rate);
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate()
    }

    /// Fade length in milliseconds, applied from the next `start`.
    pub fn set_fade_duration(&self, ms: u32) {
        self.fade_ms.store(ms, Ordering::Relaxed);
    }

    pub fn fade_duration(&self) -> u32 {
        self.fade_ms.load(Ordering::Relaxed)
    }

    /// When on, each `start` jumps straight to the target frequency instead
    /// of gliding from the previous one.
    pub fn set_clean_start(&self, enabled: bool) {
        self.clean_start.store(enabled, Ordering::Relaxed);
    }

    pub fn clean_start(&self) -> bool {
        self.clean_start.load(Ordering::Relaxed)
    }

    // ------------------------------ snapshots ------------------------------------

    pub fn set_auto_update_one_cycle_sample(&self, enabled: bool) {
        self.snapshots.set_auto_update(enabled);
    }

    /// Publish a one-cycle snapshot now, regardless of auto-update.
    pub fn refresh_one_cycle_data(&self) {
        self.snapshots.publish(&self.params.snapshot(), &*self.listener);
    }

    fn parameters_changed(&self) {
        self.snapshots.parameters_changed(&self.params.snapshot(), &*self.listener);
    }

    // -------------------------------- gain ---------------------------------------

    pub fn set_volume(&self, volume: f32, recalc_decibel: bool) {
        self.update_gain(|g| g.set_volume(volume, recalc_decibel));
    }

    pub fn volume(&self) -> f32 {
        lock(&self.gain).volume()
    }

    pub fn set_decibel(&self, db: f32) {
        self.update_gain(|g| g.set_decibel(db));
    }

    pub fn decibel(&self) -> f32 {
        lock(&self.gain).decibel()
    }

    pub fn set_balance(&self, balance: f32) {
        self.update_gain(|g| g.set_balance(balance));
    }

    pub fn balance(&self) -> f32 {
        lock(&self.gain).balance()
    }

    /// Current `(left, right)` multipliers, volume included.
    pub fn channel_gains(&self) -> (f32, f32) {
        lock(&self.gain).channel_gains()
    }

    fn update_gain(&self, f: impl FnOnce(&mut GainModel)) {
        let (left, right) = {
            let mut g = lock(&self.gain);
            f(&mut g);
            g.channel_gains()
        };
        if let Some(s) = self.session() {
            s.sink.set_channel_gains(left, right);
        }
    }
}

impl<B: AudioBackend> Drop for SoundGenerator<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::EngineEvent;
    use crate::sink::{MemoryBackend, MemorySink};
    use crossbeam_channel::{bounded, Receiver};
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;
    use tonegen_core::dsp::TAU;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn backend() -> MemoryBackend {
        MemoryBackend::new(256).with_write_delay(Duration::from_micros(200))
    }

    fn with_events(config: EngineConfig) -> (SoundGenerator<MemoryBackend>, Receiver<EngineEvent>) {
        let (tx, rx) = bounded(64);
        (SoundGenerator::with_listener(backend(), config, Arc::new(tx)), rx)
    }

    fn sink(gen: &SoundGenerator<MemoryBackend>) -> MemorySink {
        gen.backend().last_sink().unwrap()
    }

    #[test]
    fn plays_a_continuous_sine_after_the_fade() {
        let cfg = EngineConfig { frequency_hz: 440.0, amplitude: 1.0, ..Default::default() };
        let gen = SoundGenerator::new(backend(), cfg);
        assert!(gen.init(48_000));
        gen.start();
        let out = sink(&gen);
        assert!(out.wait_for_samples(2048, TIMEOUT));
        gen.stop();
        gen.wait_until_idle();

        let s = out.samples();
        let steady = &s[1024..2048];
        // a sampled sine satisfies x[k+1] + x[k-1] = 2 cos(w) x[k]
        let k2 = 2.0 * (440.0 * TAU / 48_000.0).cos();
        for w in steady.windows(3) {
            let lhs = f32::from(w[2]) + f32::from(w[0]);
            let rhs = k2 * f32::from(w[1]);
            assert!((lhs - rhs).abs() <= 6.0, "{w:?}");
        }
        let peak = steady[..110].iter().map(|v| i32::from(*v).abs()).max().unwrap();
        assert!(peak >= 32_700, "peak {peak}");
        assert_eq!(*s.last().unwrap(), 0);
    }

    #[test]
    fn lifecycle_notifies_the_listener() {
        let (gen, events) = with_events(EngineConfig::default());
        gen.start();
        assert!(!gen.is_playing());

        assert!(gen.init(48_000));
        gen.start();
        assert!(gen.is_playing());
        gen.start();
        gen.stop();
        gen.stop();
        gen.wait_until_idle();
        assert_eq!(gen.playback_state(), PlaybackState::Idle);

        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(got, [EngineEvent::PlayingChanged(true), EngineEvent::PlayingChanged(false)]);
        assert_eq!(sink(&gen).call_counts(), (1, 1, 1));
    }

    #[test]
    fn failed_init_leaves_the_generator_usable() {
        let gen = SoundGenerator::new(MemoryBackend::new(256).failing(), EngineConfig::default());
        assert!(!gen.init(48_000));
        assert!(!gen.is_initialized());
        gen.start();
        assert!(!gen.is_playing());
        gen.set_frequency(300.0);
        assert_eq!(gen.frequency(), 300.0);
        gen.release();
    }

    #[test]
    fn zero_buffer_size_releases_the_sink() {
        let gen = SoundGenerator::new(MemoryBackend::new(0), EngineConfig::default());
        assert!(matches!(gen.try_init(48_000), Err(crate::EngineError::InvalidBufferSize)));
        assert!(sink(&gen).is_released());
        assert!(!gen.is_initialized());
    }

    #[test]
    fn release_is_idempotent() {
        let (gen, events) = with_events(EngineConfig::default());
        gen.release();

        assert!(gen.init(44_100));
        gen.start();
        assert!(sink(&gen).wait_for_samples(512, TIMEOUT));
        gen.release();
        gen.release();

        let out = sink(&gen);
        assert!(out.is_released());
        assert!(!out.is_playing());
        assert!(!gen.is_initialized());
        assert!(!gen.is_playing());
        assert_eq!(*out.samples().last().unwrap(), 0);
        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(got, [EngineEvent::PlayingChanged(true), EngineEvent::PlayingChanged(false)]);
    }

    #[test]
    fn reinit_replaces_the_session() {
        let gen = SoundGenerator::new(backend(), EngineConfig::default());
        assert!(gen.init(48_000));
        let first = sink(&gen);
        assert!(gen.init(22_050));
        assert!(first.is_released());
        assert!(!sink(&gen).is_released());
        assert_eq!(gen.sample_rate(), 22_050);
    }

    #[test]
    fn gain_changes_reach_the_sink() {
        let gen = SoundGenerator::new(backend(), EngineConfig { volume: 0.5, ..Default::default() });
        assert!(gen.init(48_000));
        assert_eq!(sink(&gen).gains(), (0.5, 0.5));

        gen.set_balance(-1.0);
        assert_eq!(sink(&gen).gains(), (0.5, 0.0));

        gen.set_balance(0.5);
        gen.set_volume(1.0, true);
        assert_eq!(sink(&gen).gains(), (0.5, 1.0));
        assert_eq!(gen.decibel(), 0.0);

        gen.set_decibel(-20.0);
        assert!((gen.volume() - 0.1).abs() < 1e-6);
        assert_eq!(gen.decibel(), -20.0);
    }

    #[test]
    fn parameter_changes_publish_snapshots_when_enabled() {
        let (gen, events) = with_events(EngineConfig::default());
        gen.set_frequency(100.0);
        assert!(events.try_recv().is_err());

        gen.set_auto_update_one_cycle_sample(true);
        gen.set_amplitude(0.5);
        gen.set_waveform(Waveform::Square);
        // unchanged waveform: no event
        gen.set_waveform(Waveform::Square);

        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(got.len(), 2);
        let EngineEvent::OneCycle(cycle) = &got[1] else { panic!("{got:?}") };
        assert_eq!(cycle.len(), 481);
        assert_eq!(cycle[0], 16383);
        assert_eq!(cycle[300], -16383);

        gen.set_auto_update_one_cycle_sample(false);
        gen.refresh_one_cycle_data();
        assert!(matches!(events.try_recv(), Ok(EngineEvent::OneCycle(_))));
    }

    #[test]
    fn zero_fade_starts_at_full_level() {
        let cfg = EngineConfig { waveform: Waveform::Square, fade_ms: 20, ..Default::default() };
        let gen = SoundGenerator::new(backend(), cfg);
        assert_eq!(gen.fade_duration(), 20);
        gen.set_fade_duration(0);
        gen.set_clean_start(true);
        assert_eq!(gen.fade_duration(), 0);
        assert!(gen.clean_start());

        assert!(gen.init(48_000));
        gen.start();
        let out = sink(&gen);
        assert!(out.wait_for_samples(256, TIMEOUT));
        gen.release();

        let s = out.samples();
        assert!(s[..256].iter().all(|v| i32::from(*v).abs() == 32_767));
        assert_eq!(*s.last().unwrap(), 0);
    }

    /// Largest deviation from the sine recurrence at `hz`, for a block that
    /// should be a steady sine.
    fn sine_residual(block: &[i16], hz: f32, sample_rate: f32) -> f32 {
        let k2 = 2.0 * (hz * TAU / sample_rate).cos();
        block
            .windows(3)
            .map(|w| (f32::from(w[2]) + f32::from(w[0]) - k2 * f32::from(w[1])).abs())
            .fold(0.0, f32::max)
    }

    fn play_after_retune(clean_start: bool) -> Vec<i16> {
        let cfg = EngineConfig { frequency_hz: 100.0, ..Default::default() };
        let gen = SoundGenerator::new(backend(), cfg);
        assert!(gen.init(48_000));
        gen.set_frequency(1000.0);
        gen.set_clean_start(clean_start);
        gen.start();
        let out = sink(&gen);
        assert!(out.wait_for_samples(3072, TIMEOUT));
        gen.release();
        out.samples()
    }

    #[test]
    fn clean_start_skips_the_glide() {
        // up to three buffers were rendered at 100 Hz before start; everything
        // after them is already at the new target
        let s = play_after_retune(true);
        let residual = sine_residual(&s[1024..3072], 1000.0, 48_000.0);
        assert!(residual <= 6.0, "residual {residual}");
    }

    #[test]
    fn without_clean_start_the_frequency_glides() {
        let s = play_after_retune(false);
        let residual = sine_residual(&s[1024..3072], 1000.0, 48_000.0);
        assert!(residual > 100.0, "residual {residual}");
    }

    struct Reentrant {
        gen: OnceLock<Weak<SoundGenerator<MemoryBackend>>>,
        seen: Mutex<Vec<bool>>,
    }

    impl EngineListener for Reentrant {
        fn on_playing_changed(&self, _playing: bool) {
            if let Some(gen) = self.gen.get().and_then(Weak::upgrade) {
                let playing = gen.is_playing();
                gen.set_balance(0.0);
                lock(&self.seen).push(playing);
            }
        }
    }

    #[test]
    fn listener_may_call_back_during_reinit() {
        let listener = Arc::new(Reentrant { gen: OnceLock::new(), seen: Mutex::new(Vec::new()) });
        let gen = Arc::new(SoundGenerator::with_listener(
            backend(),
            EngineConfig::default(),
            Arc::clone(&listener) as Arc<dyn EngineListener>,
        ));
        assert!(listener.gen.set(Arc::downgrade(&gen)).is_ok());

        assert!(gen.init(48_000));
        gen.start();
        assert!(sink(&gen).wait_for_samples(512, TIMEOUT));

        let (done_tx, done_rx) = bounded(1);
        let worker = Arc::clone(&gen);
        std::thread::spawn(move || {
            let ok = worker.init(48_000);
            let _ = done_tx.send(ok);
        });
        assert_eq!(done_rx.recv_timeout(TIMEOUT), Ok(true));
        assert!(gen.is_initialized());
        assert!(!gen.is_playing());
        assert_eq!(lock(&listener.seen).len(), 2);
        gen.release();
    }
}
