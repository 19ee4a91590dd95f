//! Command enums for the state machine actors
//!
//! Each machine maps its commands one-to-one onto gateway operations.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::watch;

use super::{Component, ControllerError};
use crate::gateway::{CommandGateway, GatewayResult};
use crate::playback::Playback;
use crate::recorder::Recorder;
use crate::session::Session;

/// A state machine driven through the gateway
///
/// `dispatch` performs exactly one gateway call and yields the complete new
/// state. `check` runs first and may refuse a command without touching the
/// gateway or the state.
#[async_trait]
pub(crate) trait Machine: Send + Sync + 'static {
    type State: Default + Clone + fmt::Debug + Send + Sync + 'static;
    type Command: fmt::Debug + Send + 'static;

    const COMPONENT: Component;

    fn check(&self, _command: &Self::Command) -> Result<(), ControllerError> {
        Ok(())
    }

    async fn dispatch(
        &self,
        gateway: &dyn CommandGateway,
        command: Self::Command,
    ) -> GatewayResult<Self::State>;
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Get,
    ScanInputs,
    ScanOutputs,
    ConnectInput(String),
    ConnectOutput(String),
    DisconnectInput,
    DisconnectOutput,
}

pub(crate) struct SessionMachine;

#[async_trait]
impl Machine for SessionMachine {
    type State = Session;
    type Command = SessionCommand;

    const COMPONENT: Component = Component::Session;

    async fn dispatch(
        &self,
        gateway: &dyn CommandGateway,
        command: SessionCommand,
    ) -> GatewayResult<Session> {
        match command {
            SessionCommand::Get => gateway.get_session().await,
            SessionCommand::ScanInputs => gateway.scan_input_ports().await,
            SessionCommand::ScanOutputs => gateway.scan_output_ports().await,
            SessionCommand::ConnectInput(id) => gateway.connect_input_port(&id).await,
            SessionCommand::ConnectOutput(id) => gateway.connect_output_port(&id).await,
            SessionCommand::DisconnectInput => gateway.disconnect_input_port().await,
            SessionCommand::DisconnectOutput => gateway.disconnect_output_port().await,
        }
    }
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    Get,
    Start,
    Pause,
    Resume,
    Stop,
    Save(u32),
    Delete(u32),
}

/// Recorder machine
///
/// Watches the playback state so a recording being played is never deleted
/// from under the player.
pub(crate) struct RecorderMachine {
    pub(crate) playback: watch::Receiver<Playback>,
}

#[async_trait]
impl Machine for RecorderMachine {
    type State = Recorder;
    type Command = RecorderCommand;

    const COMPONENT: Component = Component::Recorder;

    fn check(&self, command: &RecorderCommand) -> Result<(), ControllerError> {
        if let RecorderCommand::Delete(index) = *command {
            if self.playback.borrow().is_recording_active(index) {
                return Err(ControllerError::RecordingInUse(index));
            }
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        gateway: &dyn CommandGateway,
        command: RecorderCommand,
    ) -> GatewayResult<Recorder> {
        match command {
            RecorderCommand::Get => gateway.get_recorder_state().await,
            RecorderCommand::Start => gateway.start_recording().await,
            RecorderCommand::Pause => gateway.pause_recording().await,
            RecorderCommand::Resume => gateway.resume_recording().await,
            RecorderCommand::Stop => gateway.stop_recording().await,
            RecorderCommand::Save(index) => gateway.save_recording(index).await,
            RecorderCommand::Delete(index) => gateway.delete_recording(index).await,
        }
    }
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Get,
    /// Periodic position refresh
    Update,
    Load,
    Eject(u32),
    PlayRecording(u32),
    PlayTrack(u32),
    Pause,
    Resume,
    Stop,
}

pub(crate) struct PlaybackMachine;

#[async_trait]
impl Machine for PlaybackMachine {
    type State = Playback;
    type Command = PlaybackCommand;

    const COMPONENT: Component = Component::Playback;

    async fn dispatch(
        &self,
        gateway: &dyn CommandGateway,
        command: PlaybackCommand,
    ) -> GatewayResult<Playback> {
        match command {
            PlaybackCommand::Get => gateway.get_playback_state().await,
            PlaybackCommand::Update => gateway.update_playback_state().await,
            PlaybackCommand::Load => gateway.load_track().await,
            PlaybackCommand::Eject(index) => gateway.eject_track(index).await,
            PlaybackCommand::PlayRecording(index) => gateway.play_recording(index).await,
            PlaybackCommand::PlayTrack(index) => gateway.play_track(index).await,
            PlaybackCommand::Pause => gateway.pause_playback().await,
            PlaybackCommand::Resume => gateway.resume_playback().await,
            PlaybackCommand::Stop => gateway.stop_playback().await,
        }
    }
}
