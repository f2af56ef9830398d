//! Output sink backed by a cpal stream.
//!
//! cpal pulls samples from a callback while the engine pushes them with a
//! blocking `write`. The two meet in a lock-free ring buffer: `write` pushes
//! mono i16 samples and, when the ring is full, waits on a condition variable
//! that the callback signals after draining. The callback expands mono to the
//! device's channel layout and applies the left/right gains there.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on its own thread and is
//! driven through a small command channel (play / pause / release).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use atomic_float::AtomicF32;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::sink::{lock, AudioBackend, OutputSink};

/// Buffer length used when the device does not report one.
const DEFAULT_BUFFER_FRAMES: usize = 1024;
/// Lower bound on the reported minimum, so tiny device periods do not turn
/// into tiny producer buffers.
const MIN_BUFFER_FRAMES: usize = 256;
/// Ring capacity in units of the buffer length.
const RING_BUFFERS: usize = 4;
/// A write that makes no progress for this long fails with `SinkStalled`.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long `stop` waits for queued samples to play out.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
/// Upper bound on a single condvar wait (covers lost wakeups).
const WAKE_INTERVAL: Duration = Duration::from_millis(5);

/// Opens cpal output streams, on the default device or one picked by name.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(name: impl Into<String>) -> Self {
        Self { device_name: Some(name.into()) }
    }
}

/// Names of the output devices on the default host.
pub fn output_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| EngineError::Device(format!("failed to enumerate devices: {e}")))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

impl AudioBackend for CpalBackend {
    type Sink = CpalSink;

    fn open(&self, sample_rate: u32) -> Result<CpalSink> {
        let shared = Arc::new(Shared::default());
        let (ready_tx, ready_rx) = bounded(1);
        let (cmd_tx, cmd_rx) = bounded(16);

        let device_name = self.device_name.clone();
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("tonegen-cpal".into())
            .spawn(move || stream_thread(device_name.as_deref(), sample_rate, &thread_shared, &cmd_rx, &ready_tx))
            .map_err(|source| EngineError::Thread { name: "cpal stream", source })?;

        let opened = match ready_rx.recv() {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                join_stream_thread(handle);
                return Err(e);
            }
            Err(_) => {
                join_stream_thread(handle);
                return Err(EngineError::Stream("stream thread exited during setup".into()));
            }
        };

        Ok(CpalSink {
            shared,
            producer: Mutex::new(opened.producer),
            commands: cmd_tx,
            thread: Mutex::new(Some(handle)),
            min_buffer_size: opened.min_buffer_size,
        })
    }
}

// ------------------------------ shared state -------------------------------------

struct Shared {
    left: AtomicF32,
    right: AtomicF32,
    /// Samples the callback should drop before playing anything else.
    discard: AtomicU64,
    /// Samples played since the last position reset.
    position: AtomicU64,
    released: AtomicBool,
    space: (Mutex<()>, Condvar),
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            left: AtomicF32::new(1.0),
            right: AtomicF32::new(1.0),
            discard: AtomicU64::new(0),
            position: AtomicU64::new(0),
            released: AtomicBool::new(false),
            space: (Mutex::new(()), Condvar::new()),
        }
    }
}

impl Shared {
    fn gains(&self) -> (f32, f32) {
        (self.left.load(Ordering::Relaxed), self.right.load(Ordering::Relaxed))
    }

    fn notify_space(&self) {
        // notify_one() doesn't require holding the lock
        let (_lock, cvar) = &self.space;
        cvar.notify_one();
    }
}

enum Command {
    Play(Sender<Result<()>>),
    Pause,
    Release,
}

struct Opened {
    producer: HeapProd<i16>,
    min_buffer_size: usize,
}

// -------------------------------- the sink ----------------------------------------

pub struct CpalSink {
    shared: Arc<Shared>,
    producer: Mutex<HeapProd<i16>>,
    commands: Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
    min_buffer_size: usize,
}

impl CpalSink {
    /// Samples played since the last `reset_position`.
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::Relaxed)
    }

    fn send(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            debug!("cpal stream thread already gone");
        }
    }
}

impl OutputSink for CpalSink {
    fn min_buffer_size(&self) -> usize {
        self.min_buffer_size
    }

    fn flush(&self) {
        let pending = lock(&self.producer).occupied_len();
        self.shared.discard.store(pending as u64, Ordering::Release);
    }

    fn reset_position(&self) {
        self.shared.position.store(0, Ordering::Relaxed);
    }

    fn play(&self) -> Result<()> {
        if self.shared.released.load(Ordering::Acquire) {
            return Err(EngineError::SinkReleased);
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Command::Play(reply_tx));
        reply_rx
            .recv()
            .map_err(|_| EngineError::Stream("stream thread is not running".into()))?
    }

    fn write(&self, samples: &[i16]) -> Result<usize> {
        let mut producer = lock(&self.producer);
        let mut rest = samples;
        let mut last_progress = Instant::now();

        while !rest.is_empty() {
            if self.shared.released.load(Ordering::Acquire) {
                return Err(EngineError::SinkReleased);
            }
            let n = producer.push_slice(rest);
            if n > 0 {
                rest = &rest[n..];
                last_progress = Instant::now();
                continue;
            }
            if last_progress.elapsed() > WRITE_TIMEOUT {
                return Err(EngineError::SinkStalled);
            }
            let (space, cvar) = &self.shared.space;
            let guard = lock(space);
            drop(cvar.wait_timeout(guard, WAKE_INTERVAL));
        }
        Ok(samples.len())
    }

    fn set_channel_gains(&self, left: f32, right: f32) {
        self.shared.left.store(left, Ordering::Relaxed);
        self.shared.right.store(right, Ordering::Relaxed);
    }

    /// Pause once everything already written has been played, so a fade-out
    /// that is still in the ring is heard rather than cut.
    fn stop(&self) {
        let pending = || lock(&self.producer).occupied_len();
        if !wait_drained(pending, &self.shared, DRAIN_TIMEOUT) {
            warn!(pending = pending(), "output not drained before pause");
        }
        self.send(Command::Pause);
    }

    fn release(&self) {
        self.shared.released.store(true, Ordering::Release);
        self.shared.notify_space();
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            self.send(Command::Release);
            join_stream_thread(handle);
        }
    }
}

fn join_stream_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("cpal stream thread panicked");
    }
}

/// Wait until `pending()` reaches zero, waking on the callback's space
/// notifications. Gives up after `timeout` or once the sink is released.
fn wait_drained(pending: impl Fn() -> usize, shared: &Shared, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pending() == 0 {
            return true;
        }
        if shared.released.load(Ordering::Acquire) || Instant::now() >= deadline {
            return false;
        }
        let (space, cvar) = &shared.space;
        let guard = lock(space);
        drop(cvar.wait_timeout(guard, WAKE_INTERVAL));
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.release();
    }
}

// ------------------------------ stream thread -------------------------------------

fn stream_thread(
    device_name: Option<&str>,
    sample_rate: u32,
    shared: &Arc<Shared>,
    commands: &Receiver<Command>,
    ready: &Sender<Result<Opened>>,
) {
    let stream = match open_stream(device_name, sample_rate, shared) {
        Ok((stream, opened)) => {
            let _ = ready.send(Ok(opened));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    for cmd in commands {
        match cmd {
            Command::Play(reply) => {
                let res = stream
                    .play()
                    .map_err(|e| EngineError::Stream(format!("failed to play stream: {e}")));
                let _ = reply.send(res);
            }
            Command::Pause => {
                if let Err(e) = stream.pause() {
                    warn!("failed to pause stream: {e}");
                }
            }
            Command::Release => break,
        }
    }
    drop(stream);
    debug!("cpal stream closed");
}

fn pick_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    if let Some(name) = name {
        let devices = host
            .output_devices()
            .map_err(|e| EngineError::Device(format!("failed to enumerate devices: {e}")))?;
        for d in devices {
            if d.name().is_ok_and(|n| n == name) {
                return Ok(d);
            }
        }
        return Err(EngineError::Device(format!("requested device not found: {name}")));
    }
    host.default_output_device()
        .ok_or_else(|| EngineError::Device("no default output device".into()))
}

/// Pick a config that supports `sample_rate` exactly, preferring stereo (so the
/// balance control is audible), then mono, then anything wider.
fn choose_config(device: &cpal::Device, sample_rate: u32) -> Result<cpal::SupportedStreamConfig> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| EngineError::Device(format!("failed to query configs: {e}")))?;

    let mut best: Option<(u16, cpal::SupportedStreamConfigRange)> = None;
    for range in ranges {
        let (lo, hi) = (range.min_sample_rate().0, range.max_sample_rate().0);
        if !(lo..=hi).contains(&sample_rate) {
            continue;
        }
        let penalty = match range.channels() {
            2 => 0,
            1 => 1,
            ch => ch,
        };
        if best.as_ref().map_or(true, |(p, _)| penalty < *p) {
            best = Some((penalty, range));
        }
    }

    let (_, range) = best.ok_or_else(|| {
        EngineError::Device(format!("sample rate {sample_rate} Hz not supported by device"))
    })?;
    Ok(range.with_sample_rate(cpal::SampleRate(sample_rate)))
}

fn open_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    shared: &Arc<Shared>,
) -> Result<(cpal::Stream, Opened)> {
    let host = cpal::default_host();
    let device = pick_device(&host, device_name)?;
    let supported = choose_config(&device, sample_rate)?;
    let sample_format = supported.sample_format();

    let min_buffer_size = match supported.buffer_size() {
        cpal::SupportedBufferSize::Range { min, .. } => (*min as usize).max(MIN_BUFFER_FRAMES),
        cpal::SupportedBufferSize::Unknown => DEFAULT_BUFFER_FRAMES,
    };
    let config: cpal::StreamConfig = supported.config();

    let ring = HeapRb::<i16>::new(min_buffer_size * RING_BUFFERS);
    let (producer, consumer) = ring.split();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, Arc::clone(shared))?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, Arc::clone(shared))?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, Arc::clone(shared))?,
        other => {
            return Err(EngineError::Device(format!("unsupported device sample format: {other:?}")));
        }
    };

    info!(
        device = %device.name().unwrap_or_else(|_| "<unknown>".into()),
        sample_rate,
        channels = config.channels,
        ?sample_format,
        min_buffer_size,
        "cpal output opened"
    );
    Ok((stream, Opened { producer, min_buffer_size }))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<i16>,
    shared: Arc<Shared>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = usize::from(config.channels.max(1));
    // Pre-allocated so the callback does not allocate in steady state
    let mut scratch: Vec<i16> = vec![0; 4096];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let discard = shared.discard.swap(0, Ordering::AcqRel);
                if discard > 0 {
                    consumer.skip(discard as usize);
                }

                let frames = data.len() / channels;
                if scratch.len() < frames {
                    scratch.resize(frames, 0);
                }
                let popped = consumer.pop_slice(&mut scratch[..frames]);
                let (left, right) = shared.gains();

                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    let s = if i < popped { f32::from(scratch[i]) / 32768.0 } else { 0.0 };
                    write_frame(frame, s, left, right);
                }

                shared.position.fetch_add(popped as u64, Ordering::Relaxed);
                shared.notify_space();
            },
            |err| error!("cpal stream error: {err}"),
            None,
        )
        .map_err(|e| EngineError::Stream(format!("failed to build output stream: {e}")))
}

/// Spread one mono sample over a device frame. Mono devices get the mean of
/// the two channel gains; channels past the second stay silent.
fn write_frame<T>(frame: &mut [T], s: f32, left: f32, right: f32)
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    match frame {
        [] => {}
        [mono] => *mono = T::from_sample(s * 0.5 * (left + right)),
        [l, r, rest @ ..] => {
            *l = T::from_sample(s * left);
            *r = T::from_sample(s * right);
            for x in rest {
                *x = T::from_sample(0.0f32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::Sample;

    #[test]
    fn drain_waits_for_the_consumer() {
        let shared = Arc::new(Shared::default());
        let (mut prod, mut cons) = HeapRb::<i16>::new(1024).split();
        assert_eq!(prod.push_slice(&[1_000; 960]), 960);
        let prod = Mutex::new(prod);

        let callback_shared = Arc::clone(&shared);
        let callback = thread::spawn(move || {
            let mut period = [0i16; 64];
            while cons.pop_slice(&mut period) > 0 {
                thread::sleep(Duration::from_millis(1));
                callback_shared.notify_space();
            }
        });

        let pending = || lock(&prod).occupied_len();
        assert!(wait_drained(pending, &shared, Duration::from_secs(5)));
        assert_eq!(pending(), 0);
        callback.join().unwrap();
    }

    #[test]
    fn stream_thread_panic_is_contained() {
        let handle = thread::spawn(|| panic!("device setup blew up"));
        join_stream_thread(handle);
    }

    #[test]
    fn drain_gives_up_when_nothing_plays() {
        let shared = Shared::default();
        assert!(!wait_drained(|| 128, &shared, Duration::from_millis(20)));

        shared.released.store(true, Ordering::Release);
        let started = Instant::now();
        assert!(!wait_drained(|| 128, &shared, Duration::from_secs(5)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stereo_frame_applies_balance() {
        let mut frame = [0.0f32; 2];
        write_frame(&mut frame, 0.5, 1.0, 0.25);
        assert_eq!(frame, [0.5, 0.125]);
    }

    #[test]
    fn mono_frame_averages_gains() {
        let mut frame = [0i16; 1];
        write_frame(&mut frame, 0.5, 1.0, 0.0);
        assert_eq!(frame[0], i16::from_sample(0.25f32));
    }

    #[test]
    fn extra_channels_are_silent() {
        let mut frame = [1.0f32; 4];
        write_frame(&mut frame, 1.0, 1.0, 1.0);
        assert_eq!(frame, [1.0, 1.0, 0.0, 0.0]);
    }
}
