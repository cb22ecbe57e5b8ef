//! Projection of a state snapshot into metric samples.
//!
//! Pure and deterministic: no I/O, no shared mutable state, so concurrent
//! scrapes cannot interfere with each other. Absent fields produce no sample
//! at all rather than a fabricated zero - the one exception is fps, which
//! keeps the legacy zero default once the settings subsystem has reported.

use crate::state::{ConnectionStatus, DeviceState};

/// Metric families the exporter exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    AudioLevels,
    ProgramInput,
    PreviewInput,
    StreamingStatus,
    RecordingStatus,
    Fps,
    VideoMode,
    Connected,
}

impl Metric {
    pub fn name(self) -> &'static str {
        match self {
            Metric::AudioLevels => "atem_audio_levels",
            Metric::ProgramInput => "atem_program_input",
            Metric::PreviewInput => "atem_preview_input",
            Metric::StreamingStatus => "atem_streaming_status",
            Metric::RecordingStatus => "atem_recording_status",
            Metric::Fps => "atem_fps",
            Metric::VideoMode => "atem_video_mode_info",
            Metric::Connected => "atem_connected",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Metric::AudioLevels => "Audio levels per source in dB",
            Metric::ProgramInput => "Currently active program input",
            Metric::PreviewInput => "Currently selected preview input",
            Metric::StreamingStatus => "Streaming status (1 = active, 0 = inactive)",
            Metric::RecordingStatus => "Recording status (1 = active, 0 = inactive)",
            Metric::Fps => "Frames per second",
            Metric::VideoMode => "Current video mode (resolution and framerate)",
            Metric::Connected => "Switcher connection status (1 = connected, 0 = disconnected)",
        }
    }
}

/// One labeled metric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Metric,
    pub device_name: String,
    /// Audio source key, only for [`Metric::AudioLevels`].
    pub source: Option<String>,
    /// Video mode label, only for [`Metric::VideoMode`].
    pub mode: Option<String>,
    pub value: f64,
}

impl Sample {
    fn plain(metric: Metric, device_name: &str, value: f64) -> Self {
        Self {
            metric,
            device_name: device_name.to_string(),
            source: None,
            mode: None,
            value,
        }
    }
}

/// Map a snapshot to its full sample set, in deterministic order.
pub fn project(state: &DeviceState) -> Vec<Sample> {
    let name = state.display_name();
    let mut samples = Vec::new();

    if let Some(channels) = &state.audio_channels {
        // BTreeMap keeps source order stable across scrapes.
        for (source, gain) in channels {
            samples.push(Sample {
                metric: Metric::AudioLevels,
                device_name: name.to_string(),
                source: Some(source.clone()),
                mode: None,
                value: *gain,
            });
        }
    }

    if let Some(program) = state.program_input {
        samples.push(Sample::plain(Metric::ProgramInput, name, program as f64));
    }
    if let Some(preview) = state.preview_input {
        samples.push(Sample::plain(Metric::PreviewInput, name, preview as f64));
    }

    if let Some(active) = state.streaming_active {
        samples.push(Sample::plain(
            Metric::StreamingStatus,
            name,
            if active { 1.0 } else { 0.0 },
        ));
    }
    if let Some(active) = state.recording_active {
        samples.push(Sample::plain(
            Metric::RecordingStatus,
            name,
            if active { 1.0 } else { 0.0 },
        ));
    }

    if let Some(fps) = state.frame_rate {
        samples.push(Sample::plain(Metric::Fps, name, fps));
    }

    // Video mode is exposed as an info-style gauge: the label carries the
    // human-readable mode, the value is always 1.
    if let Some(mode) = &state.video_mode {
        samples.push(Sample {
            metric: Metric::VideoMode,
            device_name: name.to_string(),
            source: None,
            mode: Some(mode.clone()),
            value: 1.0,
        });
    }

    samples.push(Sample::plain(
        Metric::Connected,
        name,
        if state.status == ConnectionStatus::Connected {
            1.0
        } else {
            0.0
        },
    ));

    samples
}
