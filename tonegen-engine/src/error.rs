//! Engine error type.
//!
//! Only initialization and sink I/O can fail. Redundant start/stop calls and
//! out-of-range parameters are not errors (they are ignored or clamped).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No usable output device, or the device rejected the requested format.
    #[error("audio device unavailable: {0}")]
    Device(String),

    /// The backend could not build or drive the output stream.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// The sink was released while a write was pending.
    #[error("output sink released")]
    SinkReleased,

    /// The sink stopped consuming samples for longer than the write timeout.
    #[error("output sink stalled")]
    SinkStalled,

    /// The sink reported a zero buffer size.
    #[error("invalid buffer size reported by sink")]
    InvalidBufferSize,

    #[error("failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
