//! Playback engine: the consuming loop and its Idle/Playing/Stopping machine.
//!
//! ```text
//!            start()                 stop()
//!   Idle ───────────────▶ Playing ──────────────▶ Stopping
//!    ▲                                              │
//!    └────────────── envelope reached 0 ────────────┘
//! ```
//!
//! The loop pulls buffers from the handoff queue, moves a linear fade
//! envelope up while Playing and down while Stopping, and writes the scaled
//! samples to the sink. Every start ramps up from silence and every stop
//! ramps down to silence before the sink is stopped, so there is no hard cut.
//!
//! The envelope lives on the playback thread; the only state shared with the
//! caller is the atomic state tag. Redundant `start`/`stop` calls are no-ops.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tonegen_core::envelopes::{FadeDirection, FadeEnvelope};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::listener::EngineListener;
use crate::producer::SampleBuffer;
use crate::sink::{lock, OutputSink};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Idle = 0,
    Playing = 1,
    Stopping = 2,
}

impl PlaybackState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Playing,
            2 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn get(&self) -> PlaybackState {
        PlaybackState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, s: PlaybackState) {
        self.0.store(s as u8, Ordering::Release);
    }

    fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

pub struct PlaybackEngine<S: OutputSink> {
    sink: Arc<S>,
    queue: Receiver<SampleBuffer>,
    state: Arc<StateCell>,
    listener: Arc<dyn EngineListener>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    /// Set by `shutdown`; a closed engine never starts again.
    closed: AtomicBool,
}

impl<S: OutputSink> PlaybackEngine<S> {
    pub fn new(sink: Arc<S>, queue: Receiver<SampleBuffer>, listener: Arc<dyn EngineListener>) -> Self {
        Self {
            sink,
            queue,
            state: Arc::new(StateCell(AtomicU8::new(PlaybackState::Idle as u8))),
            listener,
            consumer: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state.get()
    }

    /// True while Playing or Stopping.
    pub fn is_active(&self) -> bool {
        self.state() != PlaybackState::Idle
    }

    /// Idle → Playing. Returns `Ok(false)` if playback was already active or
    /// the engine has been shut down.
    ///
    /// The fade step is fixed for this run from `fade_ms` and `sample_rate`.
    pub fn start(&self, fade_ms: u32, sample_rate: u32) -> Result<bool> {
        let mut consumer = lock(&self.consumer);
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        if !self.state.transition(PlaybackState::Idle, PlaybackState::Playing) {
            return Ok(false);
        }
        // a previous run has already reached Idle; reap its thread
        if let Some(old) = consumer.take() {
            join_consumer(old);
        }

        self.sink.flush();
        self.sink.reset_position();
        if let Err(e) = self.sink.play() {
            self.state.set(PlaybackState::Idle);
            return Err(e);
        }
        self.listener.on_playing_changed(true);

        let envelope = FadeEnvelope::new(fade_ms, sample_rate as f32);
        let sink = Arc::clone(&self.sink);
        let queue = self.queue.clone();
        let state = Arc::clone(&self.state);
        let listener = Arc::clone(&self.listener);

        let spawned = thread::Builder::new()
            .name("tonegen-playback".into())
            .spawn(move || consume(&*sink, &queue, &state, &*listener, envelope));

        match spawned {
            Ok(handle) => {
                *consumer = Some(handle);
                info!(fade_ms, sample_rate, "playback started");
                Ok(true)
            }
            Err(source) => {
                self.sink.stop();
                self.listener.on_playing_changed(false);
                self.state.set(PlaybackState::Idle);
                Err(EngineError::Thread { name: "playback", source })
            }
        }
    }

    /// Playing → Stopping. Returns `false` if not currently Playing.
    pub fn stop(&self) -> bool {
        let stopped = self.state.transition(PlaybackState::Playing, PlaybackState::Stopping);
        if stopped {
            debug!("playback stopping");
        }
        stopped
    }

    /// Block until the playback loop has exited.
    ///
    /// Returns immediately when nothing is running. While Playing this waits
    /// for a `stop()` from another thread, so callers normally stop first.
    pub fn wait_idle(&self) {
        let handle = lock(&self.consumer).take();
        if let Some(handle) = handle {
            join_consumer(handle);
        }
    }

    /// Stop (if needed), wait for the fade-out to finish and refuse any
    /// later `start`.
    ///
    /// Holding the consumer lock while stopping orders this against a
    /// concurrent `start`: either that run is stopped here, or it sees the
    /// engine closed and never begins.
    pub fn shutdown(&self) {
        let handle = {
            let mut consumer = lock(&self.consumer);
            self.closed.store(true, Ordering::Release);
            self.stop();
            consumer.take()
        };
        if let Some(handle) = handle {
            join_consumer(handle);
        }
    }
}

impl<S: OutputSink> Drop for PlaybackEngine<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join_consumer(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("playback thread panicked");
    }
}

fn consume<S: OutputSink + ?Sized>(
    sink: &S,
    queue: &Receiver<SampleBuffer>,
    state: &StateCell,
    listener: &dyn EngineListener,
    mut envelope: FadeEnvelope,
) {
    loop {
        let Ok(mut buffer) = queue.recv() else {
            debug!("handoff queue disconnected; ending playback");
            break;
        };

        let dir = match state.get() {
            PlaybackState::Stopping => FadeDirection::Out,
            _ => FadeDirection::In,
        };
        for s in buffer.iter_mut() {
            *s = envelope.apply(*s, dir);
        }

        if let Err(e) = sink.write(&buffer) {
            warn!(error = %e, "sink write failed; ending playback");
            break;
        }
        if dir == FadeDirection::Out && envelope.is_silent() {
            break;
        }
    }

    sink.stop();
    listener.on_playing_changed(false);
    state.set(PlaybackState::Idle);
    info!("playback idle");
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::EngineEvent;
    use crate::sink::MemorySink;
    use crossbeam_channel::{bounded, Sender};
    use std::time::Duration;

    const LEVEL: i16 = 10_000;
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn feed(tx: Sender<SampleBuffer>) {
        thread::spawn(move || while tx.send(vec![LEVEL; 256]).is_ok() {});
    }

    fn engine(sink: &MemorySink) -> (PlaybackEngine<MemorySink>, Receiver<EngineEvent>) {
        let (tx, rx) = bounded(2);
        feed(tx);
        let (ev_tx, ev_rx) = bounded(16);
        (PlaybackEngine::new(Arc::new(sink.clone()), rx, Arc::new(ev_tx)), ev_rx)
    }

    #[test]
    fn fades_in_then_out_to_idle() {
        let sink = MemorySink::new(256, Some(Duration::from_micros(200)));
        let (pb, events) = engine(&sink);

        assert!(pb.start(20, 48_000).unwrap());
        assert_eq!(pb.state(), PlaybackState::Playing);
        assert!(sink.wait_for_samples(2048, TIMEOUT));

        assert!(pb.stop());
        pb.wait_idle();
        assert_eq!(pb.state(), PlaybackState::Idle);

        let out = sink.samples();
        // fade-in: non-decreasing until fully open
        let open = out.iter().position(|&s| s == LEVEL).unwrap();
        assert!((955..=965).contains(&open), "opened at {open}");
        assert!(out[..open].windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(out[0], (f32::from(LEVEL) / 960.0) as i16);

        // fade-out: non-increasing down to silence
        let last_full = out.iter().rposition(|&s| s == LEVEL).unwrap();
        assert!(out[last_full..].windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(*out.last().unwrap(), 0);
        assert!(out.len() - last_full >= 955);

        assert_eq!(sink.call_counts(), (1, 1, 1));
        assert!(!sink.is_playing());
        assert_eq!(events.try_recv(), Ok(EngineEvent::PlayingChanged(true)));
        assert_eq!(events.try_recv(), Ok(EngineEvent::PlayingChanged(false)));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let sink = MemorySink::new(256, Some(Duration::from_micros(200)));
        let (pb, _events) = engine(&sink);

        assert!(pb.start(5, 48_000).unwrap());
        assert!(!pb.start(5, 48_000).unwrap());
        assert_eq!(pb.state(), PlaybackState::Playing);

        assert!(pb.stop());
        assert!(!pb.stop());
        pb.wait_idle();
        assert!(!pb.stop());
        assert_eq!(pb.state(), PlaybackState::Idle);
        assert_eq!(sink.call_counts(), (1, 1, 1));

        // a fresh run after Idle starts from silence again
        let before = sink.len();
        assert!(pb.start(5, 48_000).unwrap());
        assert!(sink.wait_for_samples(before + 1, TIMEOUT));
        assert!(sink.samples()[before] < LEVEL);
        pb.shutdown();
        assert_eq!(sink.call_counts(), (2, 2, 2));
    }

    #[test]
    fn zero_fade_is_immediate() {
        let sink = MemorySink::new(256, Some(Duration::from_micros(200)));
        let (pb, _events) = engine(&sink);
        assert!(pb.start(0, 48_000).unwrap());
        assert!(sink.wait_for_samples(1, TIMEOUT));
        assert_eq!(sink.samples()[0], LEVEL);
        pb.shutdown();
        assert_eq!(*sink.samples().last().unwrap(), 0);
    }

    #[test]
    fn shutdown_refuses_later_starts() {
        let sink = MemorySink::new(256, Some(Duration::from_micros(200)));
        let (pb, events) = engine(&sink);

        assert!(pb.start(5, 48_000).unwrap());
        pb.shutdown();
        assert_eq!(pb.state(), PlaybackState::Idle);

        assert!(!pb.start(5, 48_000).unwrap());
        assert_eq!(pb.state(), PlaybackState::Idle);
        assert_eq!(sink.call_counts(), (1, 1, 1));
        pb.shutdown();

        let got: Vec<_> = events.try_iter().collect();
        assert_eq!(got, [EngineEvent::PlayingChanged(true), EngineEvent::PlayingChanged(false)]);
    }

    #[test]
    fn shutdown_races_with_start_without_hanging() {
        for _ in 0..200 {
            let sink = MemorySink::new(256, None);
            let (pb, _events) = engine(&sink);
            let pb = Arc::new(pb);
            let starter = Arc::clone(&pb);
            let t = thread::spawn(move || {
                let _ = starter.start(1, 48_000);
            });
            pb.shutdown();
            t.join().unwrap();
            // either the start was faded out by shutdown or it was refused
            assert_eq!(pb.state(), PlaybackState::Idle);
        }
    }

    #[test]
    fn disconnected_queue_ends_playback() {
        let sink = MemorySink::new(256, None);
        let (tx, rx) = bounded::<SampleBuffer>(2);
        let pb = PlaybackEngine::new(Arc::new(sink.clone()), rx, Arc::new(crate::listener::NullListener));
        assert!(pb.start(20, 48_000).unwrap());
        drop(tx);
        pb.wait_idle();
        assert_eq!(pb.state(), PlaybackState::Idle);
        assert!(!sink.is_playing());
    }

    #[test]
    fn released_sink_refuses_start() {
        let sink = MemorySink::new(256, None);
        sink.release();
        let (pb, events) = engine(&sink);
        assert!(matches!(pb.start(20, 48_000), Err(EngineError::SinkReleased)));
        assert_eq!(pb.state(), PlaybackState::Idle);
        assert!(events.try_recv().is_err());
    }
}
