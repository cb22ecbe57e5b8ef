//! Prometheus sink: gauge families plus text exposition.
//!
//! A sink is built fresh for every scrape. That is the reset-then-repopulate
//! contract: no series survives from a previous pass, so a source that
//! vanished from the device cannot keep reporting its last value, and
//! concurrent scrapes share no sink state.

use anyhow::{Context, Result};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use super::projector::{Metric, Sample};

/// Registry with one gauge family per exported metric.
pub struct MetricsSink {
    registry: Registry,
    audio_levels: GaugeVec,
    program_input: GaugeVec,
    preview_input: GaugeVec,
    streaming_status: GaugeVec,
    recording_status: GaugeVec,
    fps: GaugeVec,
    video_mode: GaugeVec,
    connected: GaugeVec,
}

impl MetricsSink {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let gauge = |metric: Metric, labels: &[&str]| -> Result<GaugeVec> {
            let vec = GaugeVec::new(Opts::new(metric.name(), metric.help()), labels)
                .with_context(|| format!("Invalid gauge definition for {}", metric.name()))?;
            registry
                .register(Box::new(vec.clone()))
                .with_context(|| format!("Failed to register {}", metric.name()))?;
            Ok(vec)
        };

        Ok(Self {
            audio_levels: gauge(Metric::AudioLevels, &["device_name", "source"])?,
            program_input: gauge(Metric::ProgramInput, &["device_name"])?,
            preview_input: gauge(Metric::PreviewInput, &["device_name"])?,
            streaming_status: gauge(Metric::StreamingStatus, &["device_name"])?,
            recording_status: gauge(Metric::RecordingStatus, &["device_name"])?,
            fps: gauge(Metric::Fps, &["device_name"])?,
            video_mode: gauge(Metric::VideoMode, &["device_name", "mode"])?,
            connected: gauge(Metric::Connected, &["device_name"])?,
            registry,
        })
    }

    /// Write every sample into its gauge family and encode the registry in
    /// the Prometheus text format.
    pub fn render(&self, samples: &[Sample]) -> Result<String> {
        for sample in samples {
            let device = sample.device_name.as_str();
            match sample.metric {
                Metric::AudioLevels => {
                    let source = sample.source.as_deref().unwrap_or_default();
                    self.audio_levels
                        .with_label_values(&[device, source])
                        .set(sample.value);
                },
                Metric::ProgramInput => {
                    self.program_input.with_label_values(&[device]).set(sample.value);
                },
                Metric::PreviewInput => {
                    self.preview_input.with_label_values(&[device]).set(sample.value);
                },
                Metric::StreamingStatus => {
                    self.streaming_status
                        .with_label_values(&[device])
                        .set(sample.value);
                },
                Metric::RecordingStatus => {
                    self.recording_status
                        .with_label_values(&[device])
                        .set(sample.value);
                },
                Metric::Fps => {
                    self.fps.with_label_values(&[device]).set(sample.value);
                },
                Metric::VideoMode => {
                    let mode = sample.mode.as_deref().unwrap_or_default();
                    self.video_mode
                        .with_label_values(&[device, mode])
                        .set(sample.value);
                },
                Metric::Connected => {
                    self.connected.with_label_values(&[device]).set(sample.value);
                },
            }
        }

        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .context("Failed to encode metrics")?;
        String::from_utf8(buf).context("Metrics encoding produced invalid UTF-8")
    }

    /// Content type of the text exposition format.
    pub fn content_type() -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::projector::project;
    use crate::state::{ConnectionStatus, DeviceState};
    use std::collections::BTreeMap;

    fn established_state() -> DeviceState {
        DeviceState {
            device_name: Some("Switcher-X".to_string()),
            audio_channels: Some(BTreeMap::from([
                ("1".to_string(), -6.0),
                ("2".to_string(), 0.0),
            ])),
            program_input: Some(1),
            preview_input: Some(2),
            streaming_active: Some(true),
            recording_active: Some(false),
            frame_rate: Some(59.94),
            video_mode: Some("1080p59.94".to_string()),
            status: ConnectionStatus::Connected,
        }
    }

    #[test]
    fn renders_labeled_gauges() {
        let sink = MetricsSink::new().unwrap();
        let out = sink.render(&project(&established_state())).unwrap();

        assert!(out.contains("atem_audio_levels{device_name=\"Switcher-X\",source=\"1\"} -6"));
        assert!(out.contains("atem_audio_levels{device_name=\"Switcher-X\",source=\"2\"} 0"));
        assert!(out.contains("atem_program_input{device_name=\"Switcher-X\"} 1"));
        assert!(out.contains("atem_preview_input{device_name=\"Switcher-X\"} 2"));
        assert!(out.contains("atem_streaming_status{device_name=\"Switcher-X\"} 1"));
        assert!(out.contains("atem_recording_status{device_name=\"Switcher-X\"} 0"));
        assert!(out.contains("atem_fps{device_name=\"Switcher-X\"} 59.94"));
        assert!(out
            .contains("atem_video_mode_info{device_name=\"Switcher-X\",mode=\"1080p59.94\"} 1"));
        assert!(out.contains("atem_connected{device_name=\"Switcher-X\"} 1"));
        assert!(out.contains("# HELP atem_audio_levels Audio levels per source in dB"));
        assert!(out.contains("# TYPE atem_audio_levels gauge"));
    }

    #[test]
    fn empty_sample_set_renders_no_series() {
        let sink = MetricsSink::new().unwrap();
        let out = sink.render(&[]).unwrap();

        for line in out.lines() {
            assert!(
                line.is_empty() || line.starts_with('#'),
                "unexpected series without samples: {line}"
            );
        }
    }

    #[test]
    fn fresh_sink_drops_vanished_series() {
        let mut state = established_state();
        let first = MetricsSink::new().unwrap().render(&project(&state)).unwrap();
        assert!(first.contains("source=\"2\""));

        state.audio_channels.as_mut().unwrap().remove("2");
        let second = MetricsSink::new().unwrap().render(&project(&state)).unwrap();
        assert!(
            !second.contains("source=\"2\""),
            "vanished source must not leave a stale series"
        );
        assert!(second.contains("source=\"1\""));
    }
}
