//! ATEM device connection boundary.
//!
//! The wire protocol lives behind the [`AtemTransport`] trait; the rest of
//! the exporter only sees lifecycle events and state deltas on a channel.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::state::StateDelta;

pub mod lifecycle;
pub mod protocol;
pub mod transport;

pub use transport::UdpTransport;

/// Device metadata delivered on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
}

/// Lifecycle events and state deltas emitted by a transport.
///
/// Callback-style device events become an explicit message stream consumed
/// by a single owner (the lifecycle loop), so the mirror is never mutated
/// from arbitrary callback contexts.
#[derive(Debug, Clone, PartialEq)]
pub enum AtemEvent {
    Connected(DeviceInfo),
    Disconnected,
    Error(String),
    Delta(StateDelta),
}

/// The device connection, seen from the exporter side.
///
/// Implementations own their socket, session keepalive, and retry behavior;
/// this crate does not add its own reconnection backoff on top.
#[async_trait]
pub trait AtemTransport: Send + Sync {
    /// Begin the session in the background. Must not block on the device
    /// being reachable - unreachability is a steady-state condition.
    fn start(&self) -> Result<()>;

    /// Hand over the event receiver. Yields once; later calls return `None`.
    fn take_events(&self) -> Option<mpsc::Receiver<AtemEvent>>;

    /// Best-effort read of the full current state, used by the periodic
    /// resync against missed deltas.
    async fn current_state(&self) -> Result<StateDelta>;
}
