//! Device state tree types.
//!
//! `DeviceState` is the full last-known picture of the switcher;
//! `StateDelta` is a partial update grouped by subsystem, matching how the
//! device reports changes (audio, video, streaming, recording, settings).

use std::collections::BTreeMap;

/// Fallback name until the switcher reports its model.
pub const UNKNOWN_DEVICE: &str = "Unknown Device";

/// Connection status of the device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Last-known state of the switcher. One instance per process.
///
/// Every data field starts absent and becomes present when the corresponding
/// subsystem first reports. Fields only revert to absent on disconnect, and
/// only under the clear-on-disconnect policy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub device_name: Option<String>,
    /// Gain in dB per audio source. `None` means the audio subsystem has not
    /// reported yet; an empty map means it reported zero sources.
    pub audio_channels: Option<BTreeMap<String, f64>>,
    pub program_input: Option<i64>,
    pub preview_input: Option<i64>,
    pub streaming_active: Option<bool>,
    pub recording_active: Option<bool>,
    pub frame_rate: Option<f64>,
    pub video_mode: Option<String>,
    pub status: ConnectionStatus,
}

impl DeviceState {
    /// Reported model name, or the sentinel if the device has not said yet.
    pub fn display_name(&self) -> &str {
        self.device_name.as_deref().unwrap_or(UNKNOWN_DEVICE)
    }

    /// Drop all data fields, keeping only the connection status.
    pub fn clear_data(&mut self) {
        *self = DeviceState {
            status: self.status,
            ..DeviceState::default()
        };
    }
}

/// Device metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoState {
    pub model: String,
}

/// Audio mixer state. The device reports its complete channel set, so a
/// merge replaces the whole map - sources that vanished on the device vanish
/// from the mirror too.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioState {
    pub channels: BTreeMap<String, f64>,
}

/// Program and preview bus selection. Both come from the same video-state
/// report and are merged together so a snapshot never sees one without the
/// other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoState {
    pub program_input: i64,
    pub preview_input: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingState {
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingState {
    pub active: bool,
}

/// Video format settings. A report with no frame rate still marks the fps
/// field present, with the legacy zero default.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsState {
    pub frame_rate: Option<f64>,
    pub video_mode: Option<String>,
}

/// Partial update to the state tree. Unreported subsystems are left
/// untouched by a merge; they are never cleared by a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub info: Option<InfoState>,
    pub audio: Option<AudioState>,
    pub video: Option<VideoState>,
    pub streaming: Option<StreamingState>,
    pub recording: Option<RecordingState>,
    pub settings: Option<SettingsState>,
}

impl StateDelta {
    /// True when no subsystem reported anything.
    pub fn is_empty(&self) -> bool {
        self.info.is_none()
            && self.audio.is_none()
            && self.video.is_none()
            && self.streaming.is_none()
            && self.recording.is_none()
            && self.settings.is_none()
    }
}
