//! State mirror - last-known switcher state shared between the connection
//! side and the scrape side.
//!
//! The mirror is the only point where the push-driven device flow and the
//! pull-driven scrape flow meet. All access goes through a single lock so a
//! scrape always sees an internally consistent state.

mod mirror;
mod types;

pub use mirror::StateMirror;
pub use types::{
    AudioState, ConnectionStatus, DeviceState, InfoState, RecordingState, SettingsState,
    StateDelta, StreamingState, VideoState, UNKNOWN_DEVICE,
};
