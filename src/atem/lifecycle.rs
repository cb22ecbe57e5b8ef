//! Connection lifecycle manager.
//!
//! Single consumer of the transport's event stream. Forwards state deltas
//! into the mirror, tracks connection status, and owns the periodic refresh
//! task that resyncs full state against missed deltas while connected.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{AtemEvent, AtemTransport};
use crate::state::{InfoState, StateDelta, StateMirror};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Interval between best-effort full state refreshes while connected.
    pub refresh_interval: Duration,
    /// Clear data fields on disconnect instead of retaining last-known
    /// values.
    pub clear_on_disconnect: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            clear_on_disconnect: false,
        }
    }
}

/// Consume lifecycle events until the transport closes the channel.
///
/// Exactly one refresh task is alive per connected period: a duplicate
/// `Connected` aborts the previous task before starting a new one, and
/// `Disconnected` aborts it deterministically.
pub async fn run(
    mirror: Arc<StateMirror>,
    transport: Arc<dyn AtemTransport>,
    mut events: mpsc::Receiver<AtemEvent>,
    config: LifecycleConfig,
) {
    let mut refresh: Option<JoinHandle<()>> = None;

    while let Some(event) = events.recv().await {
        match event {
            AtemEvent::Connected(device) => {
                info!("ATEM connected: {}", device.model);
                mirror.connect(StateDelta {
                    info: Some(InfoState {
                        model: device.model,
                    }),
                    ..StateDelta::default()
                });

                if let Some(task) = refresh.take() {
                    warn!("Connected fired twice without a disconnect, replacing refresh task");
                    task.abort();
                }
                refresh = Some(spawn_refresh(
                    Arc::clone(&mirror),
                    Arc::clone(&transport),
                    config.refresh_interval,
                ));
            },
            AtemEvent::Disconnected => {
                warn!("ATEM disconnected");
                if let Some(task) = refresh.take() {
                    task.abort();
                }
                mirror.disconnect(config.clear_on_disconnect);
            },
            AtemEvent::Error(e) => {
                // Fatal errors are followed by the transport's own
                // Disconnected event; status does not change here.
                warn!("ATEM error: {e}");
            },
            AtemEvent::Delta(delta) => {
                if !delta.is_empty() {
                    mirror.apply_delta(delta);
                }
            },
        }
    }

    debug!("ATEM event stream closed, lifecycle loop exiting");
    if let Some(task) = refresh.take() {
        task.abort();
    }
}

fn spawn_refresh(
    mirror: Arc<StateMirror>,
    transport: Arc<dyn AtemTransport>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match transport.current_state().await {
                Ok(delta) => mirror.apply_delta(delta),
                Err(e) => debug!("State refresh failed: {e:#}"),
            }
        }
    })
}
