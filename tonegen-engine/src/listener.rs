//! Host notifications: one-cycle snapshots and play-state changes.
//!
//! A listener is handed to [`SoundGenerator`](crate::SoundGenerator) at
//! construction and lives as long as it does. Callbacks run on engine threads
//! (the playback thread for play-state changes, the caller's thread for
//! snapshots), so implementations must return quickly and never block.

use crossbeam_channel::{Sender, TrySendError};
use tracing::warn;

pub trait EngineListener: Send + Sync {
    /// One full period of the current waveform plus a closing sample at phase 0.
    fn on_one_cycle(&self, _samples: &[i32]) {}

    /// `true` when playback starts, `false` once the fade-out has finished.
    fn on_playing_changed(&self, _playing: bool) {}
}

/// Listener that ignores everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullListener;

impl EngineListener for NullListener {}

/// Owned form of the listener callbacks, for channel-based hosts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    OneCycle(Vec<i32>),
    PlayingChanged(bool),
}

impl EngineListener for Sender<EngineEvent> {
    fn on_one_cycle(&self, samples: &[i32]) {
        forward(self, EngineEvent::OneCycle(samples.to_vec()));
    }

    fn on_playing_changed(&self, playing: bool) {
        forward(self, EngineEvent::PlayingChanged(playing));
    }
}

fn forward(tx: &Sender<EngineEvent>, event: EngineEvent) {
    match tx.try_send(event) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => warn!("engine event dropped: listener queue full"),
    }
}
