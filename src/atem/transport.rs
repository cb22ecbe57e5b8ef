//! UDP session transport.
//!
//! Owns the socket and the session handshake, turns inbound command blocks
//! into [`AtemEvent`]s, and keeps an accumulated full-state copy for the
//! periodic resync. Reconnection lives here, not in the lifecycle manager.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::protocol::{
    self, ack_packet, hello_packet, is_duplicate_resend, parse_header, read_cstr,
    uint16_to_decibel, CommandIter, FLAG_ACK_REQUEST, FLAG_HELLO, HEADER_LEN,
};
use super::{AtemEvent, AtemTransport, DeviceInfo};
use crate::state::{
    AudioState, InfoState, RecordingState, SettingsState, StateDelta, StreamingState, VideoState,
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_secs(3);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// ATEM connection over UDP.
pub struct UdpTransport {
    addr: SocketAddr,
    events_tx: mpsc::Sender<AtemEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<AtemEvent>>>,
    accumulated: Arc<RwLock<Accumulated>>,
}

impl UdpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            addr,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            accumulated: Arc::new(RwLock::new(Accumulated::default())),
        }
    }
}

#[async_trait]
impl AtemTransport for UdpTransport {
    fn start(&self) -> Result<()> {
        let addr = self.addr;
        let tx = self.events_tx.clone();
        let accumulated = Arc::clone(&self.accumulated);
        tokio::spawn(async move {
            session_loop(addr, tx, accumulated).await;
        });
        Ok(())
    }

    fn take_events(&self) -> Option<mpsc::Receiver<AtemEvent>> {
        self.events_rx.lock().take()
    }

    async fn current_state(&self) -> Result<StateDelta> {
        Ok(self.accumulated.read().to_delta())
    }
}

/// Run sessions back to back until the event receiver goes away.
async fn session_loop(
    addr: SocketAddr,
    tx: mpsc::Sender<AtemEvent>,
    accumulated: Arc<RwLock<Accumulated>>,
) {
    loop {
        if tx.is_closed() {
            debug!("ATEM event receiver dropped, stopping session loop");
            return;
        }
        let mut connected = false;
        match run_session(addr, &tx, &accumulated, &mut connected).await {
            Ok(()) => debug!("ATEM session ended"),
            Err(e) => {
                debug!("ATEM session failed: {e:#}");
                let _ = tx.send(AtemEvent::Error(format!("{e:#}"))).await;
            },
        }
        // A session that got as far as Connected always ends with
        // Disconnected, however it died.
        if connected {
            let _ = tx.send(AtemEvent::Disconnected).await;
        }
        tokio::time::sleep(RETRY_DELAY).await;
    }
}

/// One session: handshake, then receive and acknowledge until the switcher
/// goes silent. `connected` reports whether the session got past the initial
/// state dump, so the caller can emit the matching disconnect even when the
/// session dies with an error.
async fn run_session(
    addr: SocketAddr,
    tx: &mpsc::Sender<AtemEvent>,
    accumulated: &RwLock<Accumulated>,
    connected: &mut bool,
) -> Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("Failed to bind local UDP socket")?;
    socket
        .connect(addr)
        .await
        .context("Failed to set peer address")?;

    debug!("Opening ATEM session to {addr}");
    socket.send(&hello_packet()).await?;

    let mut buf = [0u8; 2048];
    let n = timeout(HANDSHAKE_TIMEOUT, socket.recv(&mut buf))
        .await
        .context("No hello response from switcher")??;
    let header = parse_header(&buf[..n]).context("Malformed hello response")?;
    if !header.has(FLAG_HELLO) || buf.get(HEADER_LEN).copied() != Some(0x02) {
        bail!("Switcher rejected the session");
    }
    socket.send(&ack_packet(header.session_id, 0)).await?;

    // Fresh session means a fresh initial state dump; drop whatever the last
    // session accumulated so vanished sources do not linger.
    *accumulated.write() = Accumulated::default();

    let mut last_processed: Option<u16> = None;

    loop {
        let n = match timeout(RECV_TIMEOUT, socket.recv(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => {
                warn!("ATEM session timed out ({}s of silence)", RECV_TIMEOUT.as_secs());
                break;
            },
        };

        let Some(header) = parse_header(&buf[..n]) else {
            continue;
        };
        // A resend means our ack got lost; ack again but do not apply the
        // commands twice.
        let duplicate = is_duplicate_resend(&header, last_processed);
        if header.has(FLAG_ACK_REQUEST) {
            socket
                .send(&ack_packet(header.session_id, header.remote_seq))
                .await?;
            last_processed = Some(header.remote_seq);
        }
        if header.has(FLAG_HELLO) || duplicate {
            continue;
        }

        for (name, payload) in CommandIter::new(&buf[HEADER_LEN..header.len]) {
            // InCm closes the initial state dump.
            if &name == b"InCm" {
                if !*connected {
                    *connected = true;
                    let model = accumulated
                        .read()
                        .model
                        .clone()
                        .unwrap_or_else(|| "ATEM".to_string());
                    info!("Connected to ATEM '{model}' at {addr}");
                    if tx.send(AtemEvent::Connected(DeviceInfo { model })).await.is_err() {
                        return Ok(());
                    }
                }
                continue;
            }

            let delta = {
                let mut acc = accumulated.write();
                apply_command(&name, payload, &mut acc)
            };
            if let Some(delta) = delta {
                if tx.send(AtemEvent::Delta(delta)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

/// Full state accumulated from the command stream, shared with
/// `current_state` for the periodic resync.
#[derive(Debug, Clone, Default)]
struct Accumulated {
    model: Option<String>,
    audio: BTreeMap<String, f64>,
    audio_seen: bool,
    program_input: Option<i64>,
    preview_input: Option<i64>,
    streaming_active: Option<bool>,
    recording_active: Option<bool>,
    frame_rate: Option<f64>,
    video_mode: Option<String>,
}

impl Accumulated {
    fn to_delta(&self) -> StateDelta {
        StateDelta {
            info: self.model.clone().map(|model| InfoState { model }),
            audio: self.audio_seen.then(|| AudioState {
                channels: self.audio.clone(),
            }),
            video: self.video(),
            streaming: self.streaming_active.map(|active| StreamingState { active }),
            recording: self.recording_active.map(|active| RecordingState { active }),
            settings: (self.frame_rate.is_some() || self.video_mode.is_some()).then(|| {
                SettingsState {
                    frame_rate: self.frame_rate,
                    video_mode: self.video_mode.clone(),
                }
            }),
        }
    }

    /// Program and preview are reported in separate commands but exposed as
    /// one group; emitted only once both halves are known.
    fn video(&self) -> Option<VideoState> {
        match (self.program_input, self.preview_input) {
            (Some(program_input), Some(preview_input)) => Some(VideoState {
                program_input,
                preview_input,
            }),
            _ => None,
        }
    }

    fn video_delta(&self) -> Option<StateDelta> {
        self.video().map(|video| StateDelta {
            video: Some(video),
            ..StateDelta::default()
        })
    }
}

/// Apply one command block to the accumulator and build the delta to emit,
/// if the command carries state the exporter projects.
fn apply_command(name: &[u8; 4], payload: &[u8], acc: &mut Accumulated) -> Option<StateDelta> {
    match name {
        b"_pin" => {
            let model = read_cstr(payload);
            acc.model = Some(model.clone());
            Some(StateDelta {
                info: Some(InfoState { model }),
                ..StateDelta::default()
            })
        },
        b"PrgI" if payload.len() >= 4 => {
            // u8 ME index, pad, u16 source. Only ME 1 is exported.
            if payload[0] != 0 {
                return None;
            }
            acc.program_input = Some(i64::from(u16::from_be_bytes([payload[2], payload[3]])));
            acc.video_delta()
        },
        b"PrvI" if payload.len() >= 4 => {
            if payload[0] != 0 {
                return None;
            }
            acc.preview_input = Some(i64::from(u16::from_be_bytes([payload[2], payload[3]])));
            acc.video_delta()
        },
        b"AMIP" if payload.len() >= 12 => {
            // Audio mixer input properties: u16 source at 0, gain at 10 on
            // the log scale.
            let source = u16::from_be_bytes([payload[0], payload[1]]);
            let gain = uint16_to_decibel(u16::from_be_bytes([payload[10], payload[11]]));
            acc.audio.insert(source.to_string(), gain);
            acc.audio_seen = true;
            Some(StateDelta {
                audio: Some(AudioState {
                    channels: acc.audio.clone(),
                }),
                ..StateDelta::default()
            })
        },
        b"StRS" if !payload.is_empty() => {
            // 1 = idle, 2 = connecting, 4 = on air, 32 = stopping.
            acc.streaming_active = Some(payload[0] & 0x4 != 0);
            Some(StateDelta {
                streaming: Some(StreamingState {
                    active: acc.streaming_active.unwrap_or(false),
                }),
                ..StateDelta::default()
            })
        },
        b"RTMS" if payload.len() >= 2 => {
            // Record-to-media status: bit 0 set while recording.
            let status = u16::from_be_bytes([payload[0], payload[1]]);
            acc.recording_active = Some(status & 0x1 != 0);
            Some(StateDelta {
                recording: Some(RecordingState {
                    active: acc.recording_active.unwrap_or(false),
                }),
                ..StateDelta::default()
            })
        },
        b"VidM" if !payload.is_empty() => {
            let (label, fps) = protocol::video_mode(payload[0])?;
            acc.video_mode = Some(label.to_string());
            acc.frame_rate = Some(fps);
            Some(StateDelta {
                settings: Some(SettingsState {
                    frame_rate: Some(fps),
                    video_mode: Some(label.to_string()),
                }),
                ..StateDelta::default()
            })
        },
        _ => None,
    }
}
