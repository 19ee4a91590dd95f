//! Command gateway to the backend device engine
//!
//! Every state-mutating intent is one request/response round trip that
//! returns the complete new authoritative state of the machine it touched.
//! Implementations must not retry: one method call is one backend call.

use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

use crate::playback::Playback;
use crate::protocol::{DecodeError, MidiMessage};
use crate::recorder::Recorder;
use crate::session::{PortDirection, Session};

/// Inbound MIDI traffic, in arrival order
pub type MidiEventStream = Pin<Box<dyn Stream<Item = MidiMessage> + Send>>;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("port enumeration failed: {0}")]
    Enumeration(String),

    #[error("unknown {direction} port '{id}'")]
    UnknownPort { direction: PortDirection, id: String },

    #[error("no {0} port connected")]
    NotConnected(PortDirection),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("index {index} out of range (catalog has {len} entries)")]
    IndexOutOfRange { index: u32, len: usize },

    #[error("no track selected")]
    NoTrackSelected,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

impl GatewayError {
    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        GatewayError::Rejected(reason.into())
    }

    pub(crate) fn backend(reason: impl std::fmt::Display) -> Self {
        GatewayError::Backend(reason.to_string())
    }
}

/// Request/response boundary to the authoritative backend
///
/// Port ids are the opaque strings returned by a scan. Indices address the
/// recorder and track catalogs as last returned.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    // Session

    async fn get_session(&self) -> GatewayResult<Session>;
    async fn scan_input_ports(&self) -> GatewayResult<Session>;
    async fn scan_output_ports(&self) -> GatewayResult<Session>;
    async fn connect_input_port(&self, port_id: &str) -> GatewayResult<Session>;
    async fn connect_output_port(&self, port_id: &str) -> GatewayResult<Session>;
    async fn disconnect_input_port(&self) -> GatewayResult<Session>;
    async fn disconnect_output_port(&self) -> GatewayResult<Session>;

    // Traffic

    /// Send one message through the connected output port
    async fn send_midi_message(&self, message: MidiMessage) -> GatewayResult<()>;

    /// Stream of every message received on the connected input port
    ///
    /// The stream survives reconnects. Messages that arrive while nobody is
    /// polling are not replayed to later subscribers.
    async fn subscribe_midi_events(&self) -> GatewayResult<MidiEventStream>;

    // Recorder

    async fn get_recorder_state(&self) -> GatewayResult<Recorder>;
    async fn start_recording(&self) -> GatewayResult<Recorder>;
    async fn pause_recording(&self) -> GatewayResult<Recorder>;
    async fn resume_recording(&self) -> GatewayResult<Recorder>;
    async fn stop_recording(&self) -> GatewayResult<Recorder>;
    async fn save_recording(&self, index: u32) -> GatewayResult<Recorder>;
    async fn delete_recording(&self, index: u32) -> GatewayResult<Recorder>;

    // Playback

    async fn get_playback_state(&self) -> GatewayResult<Playback>;

    /// Same as `get_playback_state`, called periodically to refresh position
    async fn update_playback_state(&self) -> GatewayResult<Playback>;

    /// Ask the backend to pick a file and append it to the track catalog
    async fn load_track(&self) -> GatewayResult<Playback>;
    async fn eject_track(&self, index: u32) -> GatewayResult<Playback>;
    async fn play_recording(&self, index: u32) -> GatewayResult<Playback>;
    async fn play_track(&self, index: u32) -> GatewayResult<Playback>;
    async fn pause_playback(&self) -> GatewayResult<Playback>;
    async fn resume_playback(&self) -> GatewayResult<Playback>;
    async fn stop_playback(&self) -> GatewayResult<Playback>;
}
