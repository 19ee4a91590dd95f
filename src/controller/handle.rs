//! SessionController - public API of the client state layer

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::actor::{MachineActor, MachineHandle};
use super::commands::{
    PlaybackCommand, PlaybackMachine, RecorderCommand, RecorderMachine, SessionCommand,
    SessionMachine,
};
use super::{Component, ControllerError, Notification};
use crate::bus::{ContextId, EventBus, Subscription};
use crate::gateway::{CommandGateway, GatewayError};
use crate::playback::Playback;
use crate::protocol::MidiMessage;
use crate::recorder::Recorder;
use crate::session::Session;

const NOTIFICATION_CAPACITY: usize = 64;

/// Handle to the client state layer
///
/// Cheap to clone; every clone drives the same three state machine actors
/// and the same event bus. Must be created inside a tokio runtime.
///
/// # Session
/// `get_session`, `scan_inputs`, `scan_outputs`, `scan`, `connect_input`,
/// `connect_output`, `disconnect_input`, `disconnect_output`
///
/// # Recorder
/// `get_recorder`, `start_recording`, `pause_recording`, `resume_recording`,
/// `stop_recording`, `save_recording`, `delete_recording`
///
/// # Playback
/// `get_playback`, `update_playback`, `load_track`, `eject_track`,
/// `play_recording`, `play_track`, `pause_playback`, `resume_playback`,
/// `stop_playback`
#[derive(Clone)]
pub struct SessionController {
    gateway: Arc<dyn CommandGateway>,
    session: MachineHandle<SessionMachine>,
    recorder: MachineHandle<RecorderMachine>,
    playback: MachineHandle<PlaybackMachine>,
    bus: EventBus,
    notifications: broadcast::Sender<Notification>,
    pump: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionController {
    /// Spawn the machine actors with every machine at its default state
    pub fn new(gateway: Arc<dyn CommandGateway>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let session = MachineActor::spawn(SessionMachine, gateway.clone(), notifications.clone());
        let playback =
            MachineActor::spawn(PlaybackMachine, gateway.clone(), notifications.clone());
        let recorder = MachineActor::spawn(
            RecorderMachine {
                playback: playback.watch(),
            },
            gateway.clone(),
            notifications.clone(),
        );

        Self {
            gateway,
            session,
            recorder,
            playback,
            bus: EventBus::new(),
            notifications,
            pump: Arc::new(Mutex::new(None)),
        }
    }

    /// Create the controller, attach the event bus and fetch initial state
    ///
    /// Initial fetch failures are reported like any other failure and leave
    /// the affected machine at its default; they do not abort startup.
    pub async fn start(gateway: Arc<dyn CommandGateway>) -> Result<Self, ControllerError> {
        let controller = Self::new(gateway);
        controller.connect_events().await?;
        controller.refresh().await;
        info!("Session controller started");
        Ok(controller)
    }

    /// Fetch all three machines from the backend
    pub async fn refresh(&self) {
        let _ = tokio::join!(self.get_session(), self.get_recorder(), self.get_playback());
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn session(&self) -> Session {
        self.session.current()
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.current()
    }

    pub fn playback(&self) -> Playback {
        self.playback.current()
    }

    pub fn watch_session(&self) -> watch::Receiver<Session> {
        self.session.watch()
    }

    pub fn watch_recorder(&self) -> watch::Receiver<Recorder> {
        self.recorder.watch()
    }

    pub fn watch_playback(&self) -> watch::Receiver<Playback> {
        self.playback.watch()
    }

    /// User-visible failure reports, one per failed command
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    // =========================================================================
    // Event bus
    // =========================================================================

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Register an inbound MIDI callback for `context`
    ///
    /// Replaces any callback already registered for the same context.
    pub fn subscribe_midi<F>(&self, context: ContextId, callback: F) -> Subscription
    where
        F: Fn(&MidiMessage) + Send + Sync + 'static,
    {
        self.bus.subscribe(context, callback)
    }

    /// Attach the bus to the gateway's inbound stream
    ///
    /// Calling it again replaces the previous stream.
    pub async fn connect_events(&self) -> Result<(), ControllerError> {
        let events = match self.gateway.subscribe_midi_events().await {
            Ok(events) => events,
            Err(source) => return Err(self.report(Component::Events, source)),
        };

        let pump = self.bus.spawn_pump(events);
        if let Some(previous) = self.pump.lock().replace(pump) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop delivering inbound MIDI to the bus
    pub fn disconnect_events(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }

    // =========================================================================
    // Outbound traffic
    // =========================================================================

    /// Send one message through the connected output
    ///
    /// A failure is reported but has no effect on any state machine.
    pub async fn send_midi_message(&self, message: MidiMessage) -> Result<(), ControllerError> {
        match self.gateway.send_midi_message(message).await {
            Ok(()) => Ok(()),
            Err(source) => Err(self.report(Component::Output, source)),
        }
    }

    fn report(&self, component: Component, source: GatewayError) -> ControllerError {
        warn!("{} failed: {}", component, source);
        let _ = self
            .notifications
            .send(Notification::failure(component, &source));
        ControllerError::Gateway { component, source }
    }

    // =========================================================================
    // Session
    // =========================================================================

    pub async fn get_session(&self) -> Result<Session, ControllerError> {
        self.session.request(SessionCommand::Get).await
    }

    pub async fn scan_inputs(&self) -> Result<Session, ControllerError> {
        self.session.request(SessionCommand::ScanInputs).await
    }

    pub async fn scan_outputs(&self) -> Result<Session, ControllerError> {
        self.session.request(SessionCommand::ScanOutputs).await
    }

    /// Scan inputs then outputs
    pub async fn scan(&self) -> Result<Session, ControllerError> {
        self.scan_inputs().await?;
        self.scan_outputs().await
    }

    pub async fn connect_input(&self, port_id: &str) -> Result<Session, ControllerError> {
        self.session
            .request(SessionCommand::ConnectInput(port_id.to_string()))
            .await
    }

    pub async fn connect_output(&self, port_id: &str) -> Result<Session, ControllerError> {
        self.session
            .request(SessionCommand::ConnectOutput(port_id.to_string()))
            .await
    }

    pub async fn disconnect_input(&self) -> Result<Session, ControllerError> {
        self.session.request(SessionCommand::DisconnectInput).await
    }

    pub async fn disconnect_output(&self) -> Result<Session, ControllerError> {
        self.session.request(SessionCommand::DisconnectOutput).await
    }

    // =========================================================================
    // Recorder
    // =========================================================================

    pub async fn get_recorder(&self) -> Result<Recorder, ControllerError> {
        self.recorder.request(RecorderCommand::Get).await
    }

    pub async fn start_recording(&self) -> Result<Recorder, ControllerError> {
        self.recorder.request(RecorderCommand::Start).await
    }

    pub async fn pause_recording(&self) -> Result<Recorder, ControllerError> {
        self.recorder.request(RecorderCommand::Pause).await
    }

    pub async fn resume_recording(&self) -> Result<Recorder, ControllerError> {
        self.recorder.request(RecorderCommand::Resume).await
    }

    pub async fn stop_recording(&self) -> Result<Recorder, ControllerError> {
        self.recorder.request(RecorderCommand::Stop).await
    }

    pub async fn save_recording(&self, index: u32) -> Result<Recorder, ControllerError> {
        self.recorder.request(RecorderCommand::Save(index)).await
    }

    /// Delete a recording
    ///
    /// Refused with [`ControllerError::RecordingInUse`], without contacting
    /// the backend, while playback is playing or paused on that recording.
    /// A delete renumbers later takes, so the playback copy is refetched
    /// afterwards to keep its recording identifier current.
    pub async fn delete_recording(&self, index: u32) -> Result<Recorder, ControllerError> {
        let recorder = self.recorder.request(RecorderCommand::Delete(index)).await?;
        // A failed refetch is already reported by the playback machine
        let _ = self.get_playback().await;
        Ok(recorder)
    }

    // =========================================================================
    // Playback
    // =========================================================================

    pub async fn get_playback(&self) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::Get).await
    }

    /// Refresh the playback position
    pub async fn update_playback(&self) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::Update).await
    }

    pub async fn load_track(&self) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::Load).await
    }

    pub async fn eject_track(&self, index: u32) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::Eject(index)).await
    }

    pub async fn play_recording(&self, index: u32) -> Result<Playback, ControllerError> {
        self.playback
            .request(PlaybackCommand::PlayRecording(index))
            .await
    }

    pub async fn play_track(&self, index: u32) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::PlayTrack(index)).await
    }

    pub async fn pause_playback(&self) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::Pause).await
    }

    pub async fn resume_playback(&self) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::Resume).await
    }

    pub async fn stop_playback(&self) -> Result<Playback, ControllerError> {
        self.playback.request(PlaybackCommand::Stop).await
    }
}
