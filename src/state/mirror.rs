//! StateMirror - concurrency-safe copy of the last-known device state.
//!
//! Deltas from the connection side and snapshots from the scrape side go
//! through one lock over the whole `DeviceState`. Snapshot consistency is a
//! whole-state property, not a per-field one: projection branches on several
//! fields together, so there is no fine-grained locking here.

use parking_lot::RwLock;

use super::types::{ConnectionStatus, DeviceState, StateDelta};

/// Holds the authoritative `DeviceState` and serializes access to it.
///
/// The lock is held only for the duration of a merge or a copy, never across
/// I/O or an await point.
#[derive(Default)]
pub struct StateMirror {
    inner: RwLock<DeviceState>,
}

impl StateMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update into the state under one write lock.
    ///
    /// Each reported subsystem replaces its prior value; unreported
    /// subsystems are untouched. Program and preview arrive as one group, so
    /// a concurrent snapshot sees either both old or both new.
    pub fn apply_delta(&self, delta: StateDelta) {
        merge(&mut self.inner.write(), delta);
    }

    /// Merge the connection's opening delta and flip to Connected in one
    /// write lock, so no snapshot sees a connected mirror without its data
    /// or vice versa.
    pub fn connect(&self, delta: StateDelta) {
        let mut state = self.inner.write();
        merge(&mut state, delta);
        state.status = ConnectionStatus::Connected;
    }

    /// Flip to Disconnected, optionally wiping the data fields, in one write
    /// lock.
    pub fn disconnect(&self, clear_data: bool) {
        let mut state = self.inner.write();
        if clear_data {
            state.clear_data();
        }
        state.status = ConnectionStatus::Disconnected;
    }

    /// Immutable copy of the state, taken under one read lock.
    ///
    /// All fields reflect the same instant: every delta applied before this
    /// call returns is visible, and none is visible partially.
    pub fn snapshot(&self) -> DeviceState {
        self.inner.read().clone()
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        self.inner.write().status = status;
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.read().status
    }
}

fn merge(state: &mut DeviceState, delta: StateDelta) {
    if let Some(info) = delta.info {
        state.device_name = Some(info.model);
    }
    if let Some(audio) = delta.audio {
        state.audio_channels = Some(audio.channels);
    }
    if let Some(video) = delta.video {
        state.program_input = Some(video.program_input);
        state.preview_input = Some(video.preview_input);
    }
    if let Some(streaming) = delta.streaming {
        state.streaming_active = Some(streaming.active);
    }
    if let Some(recording) = delta.recording {
        state.recording_active = Some(recording.active);
    }
    if let Some(settings) = delta.settings {
        // Settings reported without a frame rate still make fps present,
        // with the legacy zero default.
        state.frame_rate = Some(settings.frame_rate.unwrap_or(0.0));
        if let Some(mode) = settings.video_mode {
            state.video_mode = Some(mode);
        }
    }
}
