//! Tonegen Engine: threads, queue and output around the core DSP.
//!
//! Crate layout:
//! - [`generator`] : `SoundGenerator`, the host-facing API
//! - [`producer`]  : synthesis thread feeding the bounded handoff queue
//! - [`playback`]  : consuming loop with the fade envelope and state machine
//! - [`snapshot`]  : one-cycle waveform snapshots for visualisation
//! - [`params`]    : lock-free parameter block shared by all threads
//! - [`sink`]      : `OutputSink` / `AudioBackend` traits and the memory sink
//! - [`cpal_sink`] : cpal output (feature `realtime`)
//!
//! Samples cross threads only through the two-slot queue between the
//! producer and the playback loop; everything else is atomics.

pub mod config;
pub mod error;
pub mod generator;
pub mod listener;
pub mod params;
pub mod playback;
pub mod producer;
pub mod sink;
pub mod snapshot;

#[cfg(feature = "realtime")]
pub mod cpal_sink;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use generator::SoundGenerator;
pub use listener::{EngineEvent, EngineListener, NullListener};
pub use playback::PlaybackState;
pub use sink::{AudioBackend, MemoryBackend, MemorySink, OutputSink};
pub use tonegen_core::waveforms::Waveform;

#[cfg(feature = "realtime")]
pub use cpal_sink::{output_device_names, CpalBackend, CpalSink};
