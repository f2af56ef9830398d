//! Output sink contract and an in-memory implementation.
//!
//! A sink accepts mono 16-bit PCM through a blocking `write` and applies
//! per-channel gains at the device boundary (that is where stereo comes from;
//! the synthesis path is mono). Backends open sinks at a sample rate and report
//! the minimum buffer size, which becomes the producer's buffer length.
//!
//! [`MemoryBackend`] / [`MemorySink`] record everything written. They drive
//! the engine in tests and can be used for offline rendering.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};

pub trait OutputSink: Send + Sync + 'static {
    /// Buffer length in samples the sink wants per write.
    fn min_buffer_size(&self) -> usize;

    /// Drop anything queued but not yet played.
    fn flush(&self);

    /// Restart the playback position counter.
    fn reset_position(&self);

    /// Begin (or resume) output.
    fn play(&self) -> Result<()>;

    /// Write samples, blocking until the sink has accepted all of them.
    fn write(&self, samples: &[i16]) -> Result<usize>;

    fn set_channel_gains(&self, left: f32, right: f32);

    /// Pause output. Further writes are allowed after another `play`.
    fn stop(&self);

    /// Tear the sink down. Idempotent; writes fail afterwards.
    fn release(&self);
}

pub trait AudioBackend: Send + Sync {
    type Sink: OutputSink;

    /// Open a mono, 16-bit sink at `sample_rate`.
    fn open(&self, sample_rate: u32) -> Result<Self::Sink>;
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// -------------------------------- Memory sink -------------------------------------

#[derive(Debug)]
struct Recording {
    samples: Vec<i16>,
    position: u64,
    gains: (f32, f32),
    playing: bool,
    released: bool,
    flushes: usize,
    plays: usize,
    stops: usize,
}

#[derive(Debug)]
struct MemoryInner {
    min_buffer_size: usize,
    write_delay: Option<Duration>,
    state: Mutex<Recording>,
    written: Condvar,
}

/// Sink that stores every written sample. Clones share the same recording.
#[derive(Clone, Debug)]
pub struct MemorySink {
    inner: Arc<MemoryInner>,
}

impl MemorySink {
    pub fn new(min_buffer_size: usize, write_delay: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                min_buffer_size,
                write_delay,
                state: Mutex::new(Recording {
                    samples: Vec::new(),
                    position: 0,
                    gains: (1.0, 1.0),
                    playing: false,
                    released: false,
                    flushes: 0,
                    plays: 0,
                    stops: 0,
                }),
                written: Condvar::new(),
            }),
        }
    }

    pub fn samples(&self) -> Vec<i16> {
        lock(&self.inner.state).samples.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.state).samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples written since the last `reset_position`.
    pub fn position(&self) -> u64 {
        lock(&self.inner.state).position
    }

    pub fn gains(&self) -> (f32, f32) {
        lock(&self.inner.state).gains
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.inner.state).playing
    }

    pub fn is_released(&self) -> bool {
        lock(&self.inner.state).released
    }

    /// `(flush, play, stop)` call counts.
    pub fn call_counts(&self) -> (usize, usize, usize) {
        let s = lock(&self.inner.state);
        (s.flushes, s.plays, s.stops)
    }

    /// Block until at least `n` samples have been recorded or `timeout` passes.
    pub fn wait_for_samples(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut s = lock(&self.inner.state);
        while s.samples.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            s = self
                .inner
                .written
                .wait_timeout(s, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl OutputSink for MemorySink {
    fn min_buffer_size(&self) -> usize {
        self.inner.min_buffer_size
    }

    fn flush(&self) {
        lock(&self.inner.state).flushes += 1;
    }

    fn reset_position(&self) {
        lock(&self.inner.state).position = 0;
    }

    fn play(&self) -> Result<()> {
        let mut s = lock(&self.inner.state);
        if s.released {
            return Err(EngineError::SinkReleased);
        }
        s.playing = true;
        s.plays += 1;
        Ok(())
    }

    fn write(&self, samples: &[i16]) -> Result<usize> {
        if let Some(d) = self.inner.write_delay {
            thread::sleep(d);
        }
        let mut s = lock(&self.inner.state);
        if s.released {
            return Err(EngineError::SinkReleased);
        }
        s.samples.extend_from_slice(samples);
        s.position += samples.len() as u64;
        self.inner.written.notify_all();
        Ok(samples.len())
    }

    fn set_channel_gains(&self, left: f32, right: f32) {
        lock(&self.inner.state).gains = (left, right);
    }

    fn stop(&self) {
        let mut s = lock(&self.inner.state);
        s.playing = false;
        s.stops += 1;
    }

    fn release(&self) {
        let mut s = lock(&self.inner.state);
        s.playing = false;
        s.released = true;
        self.inner.written.notify_all();
    }
}

/// Backend handing out [`MemorySink`]s. Keeps the most recently opened sink so
/// callers can inspect what the engine wrote.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    min_buffer_size: usize,
    write_delay: Option<Duration>,
    fail_open: bool,
    last: Mutex<Option<MemorySink>>,
}

impl MemoryBackend {
    pub fn new(min_buffer_size: usize) -> Self {
        Self { min_buffer_size, ..Default::default() }
    }

    /// Sleep this long in every write, to pace the playback loop.
    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Make every `open` fail, to exercise initialization errors.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn last_sink(&self) -> Option<MemorySink> {
        lock(&self.last).clone()
    }
}

impl AudioBackend for MemoryBackend {
    type Sink = MemorySink;

    fn open(&self, sample_rate: u32) -> Result<MemorySink> {
        if self.fail_open || sample_rate == 0 {
            return Err(EngineError::Device(format!("cannot open memory sink at {sample_rate} Hz")));
        }
        let sink = MemorySink::new(self.min_buffer_size, self.write_delay);
        *lock(&self.last) = Some(sink.clone());
        Ok(sink)
    }
}
