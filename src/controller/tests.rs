//! Controller tests against a scripted in-memory gateway

use super::*;
use crate::bus::ContextId;
use crate::gateway::{CommandGateway, GatewayResult, MidiEventStream};
use crate::playback::{Playback, PlaybackIdentifier, PlaybackState, Track};
use crate::protocol::{MidiChannel, MidiMessage};
use crate::recorder::{Recorder, RecorderState, Recording, RecordingDuration};
use crate::session::{Port, PortDirection, Session};
use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

const TAKE_MS: u64 = 1_500;

/// Backend double with just enough behavior to exercise the controller
#[derive(Default)]
struct Script {
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    session: Session,
    recorder: Recorder,
    playback: Playback,
    fail_scan: bool,
    fail_send: bool,
    connect_delays: HashMap<String, Duration>,
    calls: Vec<String>,
    sent: Vec<MidiMessage>,
    events: Option<mpsc::UnboundedSender<MidiMessage>>,
}

#[derive(Default)]
struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    fn with_ports() -> Arc<Self> {
        let gateway = Self::default();
        {
            let mut script = gateway.script.lock();
            script.inputs = vec![Port::new("in-a", "Keys A"), Port::new("in-b", "Keys B")];
            script.outputs = vec![Port::new("out-a", "Synth")];
        }
        Arc::new(gateway)
    }

    fn log(&self, call: impl Into<String>) {
        self.script.lock().calls.push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.script.lock().calls.clone()
    }

    fn emit(&self, message: MidiMessage) {
        if let Some(events) = &self.script.lock().events {
            events.send(message).unwrap();
        }
    }

    fn connect(&self, direction: PortDirection, id: &str) -> GatewayResult<Session> {
        let mut script = self.script.lock();
        let catalog = match direction {
            PortDirection::Input => &script.inputs,
            PortDirection::Output => &script.outputs,
        };
        let port = catalog
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownPort {
                direction,
                id: id.to_string(),
            })?;
        match direction {
            PortDirection::Input => script.session.input_connection = Some(port),
            PortDirection::Output => script.session.output_connection = Some(port),
        }
        Ok(script.session.clone())
    }

    fn recorder_transition(
        &self,
        call: &str,
        legal: fn(&Recorder) -> bool,
        next: RecorderState,
    ) -> GatewayResult<Recorder> {
        self.log(call);
        let mut script = self.script.lock();
        if !legal(&script.recorder) {
            return Err(GatewayError::rejected(format!("{} not allowed", call)));
        }
        script.recorder.state = next;
        Ok(script.recorder.clone())
    }

    fn playback_transition(
        &self,
        call: &str,
        legal: fn(&Playback) -> bool,
        paused: bool,
    ) -> GatewayResult<Playback> {
        self.log(call);
        let mut script = self.script.lock();
        if !legal(&script.playback) {
            return Err(GatewayError::rejected(format!("{} not allowed", call)));
        }
        let duration_milliseconds = script.playback.duration_milliseconds().unwrap_or(0);
        let identifier = script
            .playback
            .identifier()
            .cloned()
            .ok_or_else(|| GatewayError::rejected("nothing is playing"))?;
        script.playback.state = if paused {
            PlaybackState::Paused {
                duration_milliseconds,
                identifier,
            }
        } else {
            PlaybackState::Playing {
                duration_milliseconds,
                identifier,
            }
        };
        Ok(script.playback.clone())
    }

    fn start_play(&self, identifier: PlaybackIdentifier, duration_milliseconds: u64) -> Playback {
        let mut script = self.script.lock();
        script.playback.state = PlaybackState::Playing {
            duration_milliseconds,
            identifier,
        };
        script.playback.position_milliseconds = 0;
        script.playback.clone()
    }
}

#[async_trait]
impl CommandGateway for ScriptedGateway {
    async fn get_session(&self) -> GatewayResult<Session> {
        self.log("get_session");
        Ok(self.script.lock().session.clone())
    }

    async fn scan_input_ports(&self) -> GatewayResult<Session> {
        self.log("scan_input_ports");
        let mut script = self.script.lock();
        if script.fail_scan {
            return Err(GatewayError::Enumeration("driver unavailable".into()));
        }
        script.session.available_input_ports = script.inputs.clone();
        Ok(script.session.clone())
    }

    async fn scan_output_ports(&self) -> GatewayResult<Session> {
        self.log("scan_output_ports");
        let mut script = self.script.lock();
        if script.fail_scan {
            return Err(GatewayError::Enumeration("driver unavailable".into()));
        }
        script.session.available_output_ports = script.outputs.clone();
        Ok(script.session.clone())
    }

    async fn connect_input_port(&self, port_id: &str) -> GatewayResult<Session> {
        self.log(format!("connect_input_port {}", port_id));
        let delay = self.script.lock().connect_delays.get(port_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.connect(PortDirection::Input, port_id)
    }

    async fn connect_output_port(&self, port_id: &str) -> GatewayResult<Session> {
        self.log(format!("connect_output_port {}", port_id));
        self.connect(PortDirection::Output, port_id)
    }

    async fn disconnect_input_port(&self) -> GatewayResult<Session> {
        self.log("disconnect_input_port");
        let mut script = self.script.lock();
        script.session.input_connection = None;
        Ok(script.session.clone())
    }

    async fn disconnect_output_port(&self) -> GatewayResult<Session> {
        self.log("disconnect_output_port");
        let mut script = self.script.lock();
        script.session.output_connection = None;
        Ok(script.session.clone())
    }

    async fn send_midi_message(&self, message: MidiMessage) -> GatewayResult<()> {
        let mut script = self.script.lock();
        if script.fail_send {
            return Err(GatewayError::NotConnected(PortDirection::Output));
        }
        script.sent.push(message);
        Ok(())
    }

    async fn subscribe_midi_events(&self) -> GatewayResult<MidiEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().events = Some(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn get_recorder_state(&self) -> GatewayResult<Recorder> {
        self.log("get_recorder_state");
        Ok(self.script.lock().recorder.clone())
    }

    async fn start_recording(&self) -> GatewayResult<Recorder> {
        self.recorder_transition(
            "start_recording",
            Recorder::can_start,
            RecorderState::Recording {
                elapsed: Some(RecordingDuration::ZERO),
            },
        )
    }

    async fn pause_recording(&self) -> GatewayResult<Recorder> {
        self.recorder_transition(
            "pause_recording",
            Recorder::can_pause,
            RecorderState::Paused {
                elapsed: Some(Duration::from_millis(TAKE_MS).into()),
            },
        )
    }

    async fn resume_recording(&self) -> GatewayResult<Recorder> {
        self.recorder_transition(
            "resume_recording",
            Recorder::can_resume,
            RecorderState::Recording {
                elapsed: Some(Duration::from_millis(TAKE_MS).into()),
            },
        )
    }

    async fn stop_recording(&self) -> GatewayResult<Recorder> {
        let mut recorder =
            self.recorder_transition("stop_recording", Recorder::can_stop, RecorderState::Stopped)?;
        let mut script = self.script.lock();
        let index = script.recorder.recordings.len() as u32;
        script.recorder.recordings.push(Recording {
            index,
            duration_milliseconds: TAKE_MS,
            saved_as: None,
        });
        recorder.recordings = script.recorder.recordings.clone();
        Ok(recorder)
    }

    async fn save_recording(&self, index: u32) -> GatewayResult<Recorder> {
        self.log(format!("save_recording {}", index));
        let mut script = self.script.lock();
        let len = script.recorder.recordings.len();
        let recording = script
            .recorder
            .recordings
            .get_mut(index as usize)
            .ok_or(GatewayError::IndexOutOfRange { index, len })?;
        recording.saved_as = Some(PathBuf::from(format!("take-{}.mid", index)));
        Ok(script.recorder.clone())
    }

    async fn delete_recording(&self, index: u32) -> GatewayResult<Recorder> {
        self.log(format!("delete_recording {}", index));
        let mut script = self.script.lock();
        let len = script.recorder.recordings.len();
        if index as usize >= len {
            return Err(GatewayError::IndexOutOfRange { index, len });
        }
        if script.playback.is_recording_active(index) {
            return Err(GatewayError::rejected("recording is being played"));
        }
        script.recorder.recordings.remove(index as usize);
        for (i, recording) in script.recorder.recordings.iter_mut().enumerate() {
            recording.index = i as u32;
        }
        if let PlaybackState::Playing { identifier, .. } | PlaybackState::Paused { identifier, .. } =
            &mut script.playback.state
        {
            if let PlaybackIdentifier::Recording(active) = identifier {
                if *active > index {
                    *active -= 1;
                }
            }
        }
        Ok(script.recorder.clone())
    }

    async fn get_playback_state(&self) -> GatewayResult<Playback> {
        self.log("get_playback_state");
        Ok(self.script.lock().playback.clone())
    }

    async fn update_playback_state(&self) -> GatewayResult<Playback> {
        self.log("update_playback_state");
        let mut script = self.script.lock();
        if script.playback.is_playing() {
            script.playback.position_milliseconds += 100;
        }
        Ok(script.playback.clone())
    }

    async fn load_track(&self) -> GatewayResult<Playback> {
        self.log("load_track");
        let mut script = self.script.lock();
        let index = script.playback.tracks.len() as u32;
        script.playback.tracks.push(Track {
            index,
            duration_milliseconds: 10_000,
            path: PathBuf::from(format!("/music/song-{}.mid", index)),
        });
        Ok(script.playback.clone())
    }

    async fn eject_track(&self, index: u32) -> GatewayResult<Playback> {
        self.log(format!("eject_track {}", index));
        let mut script = self.script.lock();
        let len = script.playback.tracks.len();
        if index as usize >= len {
            return Err(GatewayError::IndexOutOfRange { index, len });
        }
        script.playback.tracks.remove(index as usize);
        Ok(script.playback.clone())
    }

    async fn play_recording(&self, index: u32) -> GatewayResult<Playback> {
        self.log(format!("play_recording {}", index));
        let recording = self
            .script
            .lock()
            .recorder
            .recordings
            .get(index as usize)
            .cloned();
        let recording = recording.ok_or(GatewayError::IndexOutOfRange { index, len: 0 })?;
        Ok(self.start_play(
            PlaybackIdentifier::Recording(index),
            recording.duration_milliseconds,
        ))
    }

    async fn play_track(&self, index: u32) -> GatewayResult<Playback> {
        self.log(format!("play_track {}", index));
        let track = self.script.lock().playback.track(index).cloned();
        let track = track.ok_or(GatewayError::IndexOutOfRange { index, len: 0 })?;
        Ok(self.start_play(
            PlaybackIdentifier::MidiFile(track.path),
            track.duration_milliseconds,
        ))
    }

    async fn pause_playback(&self) -> GatewayResult<Playback> {
        self.playback_transition("pause_playback", Playback::can_pause, true)
    }

    async fn resume_playback(&self) -> GatewayResult<Playback> {
        self.playback_transition("resume_playback", Playback::can_resume, false)
    }

    async fn stop_playback(&self) -> GatewayResult<Playback> {
        self.log("stop_playback");
        let mut script = self.script.lock();
        script.playback.state = PlaybackState::Stopped;
        script.playback.position_milliseconds = 0;
        Ok(script.playback.clone())
    }
}

fn controller(gateway: &Arc<ScriptedGateway>) -> SessionController {
    SessionController::new(gateway.clone())
}

async fn with_recording(gateway: &Arc<ScriptedGateway>, controller: &SessionController) {
    controller.start_recording().await.unwrap();
    controller.stop_recording().await.unwrap();
    assert!(gateway.calls().contains(&"stop_recording".to_string()));
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test]
async fn test_scan_and_connect() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);

    let session = controller.scan().await.unwrap();
    assert_eq!(session.available_input_ports.len(), 2);
    assert_eq!(session.available_output_ports.len(), 1);

    let session = controller.connect_input("in-b").await.unwrap();
    assert_eq!(session.input_connection, Some(Port::new("in-b", "Keys B")));
    assert_eq!(controller.session(), session);

    // Replacing the connection keeps a single input
    let session = controller.connect_input("in-a").await.unwrap();
    assert_eq!(session.input_connection.unwrap().id, "in-a");
}

#[tokio::test]
async fn test_failed_scan_resets_session() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    let mut notifications = controller.notifications();

    controller.scan().await.unwrap();
    controller.connect_input("in-a").await.unwrap();
    controller.connect_output("out-a").await.unwrap();
    assert!(controller.session().is_connected(PortDirection::Output));

    gateway.script.lock().fail_scan = true;
    let err = controller.scan_inputs().await.unwrap_err();
    assert!(matches!(
        err.gateway_error(),
        Some(GatewayError::Enumeration(_))
    ));
    assert_eq!(controller.session(), Session::default());

    let notification = notifications.recv().await.unwrap();
    assert_eq!(notification.component, Component::Session);
    assert!(notification.message.contains("driver unavailable"));
}

#[tokio::test]
async fn test_unknown_port_resets_session() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    controller.scan().await.unwrap();

    let err = controller.connect_output("missing").await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Gateway {
            component: Component::Session,
            source: GatewayError::UnknownPort { .. },
        }
    ));
    assert_eq!(controller.session(), Session::default());
}

#[derive(Debug, Clone)]
enum InputOp {
    Connect(usize),
    Disconnect,
}

fn input_op() -> impl Strategy<Value = InputOp> {
    prop_oneof![
        (0usize..2).prop_map(InputOp::Connect),
        Just(InputOp::Disconnect),
    ]
}

proptest! {
    #[test]
    fn prop_single_input_connection(ops in prop::collection::vec(input_op(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let gateway = ScriptedGateway::with_ports();
            let controller = controller(&gateway);
            let catalog = controller.scan_inputs().await.unwrap().available_input_ports;
            let mut expected: Option<Port> = None;

            for op in ops {
                let session = match op {
                    InputOp::Connect(i) => {
                        expected = Some(catalog[i].clone());
                        controller.connect_input(&catalog[i].id).await.unwrap()
                    }
                    InputOp::Disconnect => {
                        expected = None;
                        controller.disconnect_input().await.unwrap()
                    }
                };
                assert_eq!(session.input_connection, expected);
                assert_eq!(session.available_input_ports, catalog);
                assert_eq!(controller.session(), session);
            }

            // Disconnect is idempotent
            let once = controller.disconnect_input().await.unwrap();
            let twice = controller.disconnect_input().await.unwrap();
            assert_eq!(once, twice);
            assert!(twice.input_connection.is_none());
        });
    }
}

#[tokio::test(start_paused = true)]
async fn test_requests_apply_in_issue_order() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    controller.scan().await.unwrap();

    // The first connect resolves long after the second one would have
    gateway
        .script
        .lock()
        .connect_delays
        .insert("in-a".to_string(), Duration::from_secs(5));

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.connect_input("in-a").await })
    };
    while !gateway.calls().contains(&"connect_input_port in-a".to_string()) {
        tokio::task::yield_now().await;
    }
    let second = controller.connect_input("in-b").await.unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(second.input_connection.unwrap().id, "in-b");
    assert_eq!(
        controller.session().input_connection.map(|p| p.id),
        Some("in-b".to_string())
    );
    assert_eq!(
        gateway.calls()[2..],
        [
            "connect_input_port in-a".to_string(),
            "connect_input_port in-b".to_string()
        ]
    );
}

// ============================================================================
// Recorder
// ============================================================================

#[tokio::test]
async fn test_recording_cycle_adds_one_take() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);

    let recorder = controller.start_recording().await.unwrap();
    assert!(recorder.is_recording());
    assert_eq!(recorder.elapsed(), Some(RecordingDuration::ZERO));

    let recorder = controller.pause_recording().await.unwrap();
    assert!(recorder.can_resume());
    controller.resume_recording().await.unwrap();

    let recorder = controller.stop_recording().await.unwrap();
    assert!(recorder.is_stopped());
    assert_eq!(recorder.recordings.len(), 1);
    assert_eq!(recorder.recordings[0].duration_milliseconds, TAKE_MS);
    assert_eq!(controller.recorder(), recorder);
}

#[tokio::test]
async fn test_illegal_transition_resets_recorder() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    with_recording(&gateway, &controller).await;
    assert_eq!(controller.recorder().recordings.len(), 1);

    let err = controller.resume_recording().await.unwrap_err();
    assert!(matches!(err.gateway_error(), Some(GatewayError::Rejected(_))));
    assert_eq!(controller.recorder(), Recorder::default());

    // The backend still holds the catalog; a refresh restores it
    let recorder = controller.get_recorder().await.unwrap();
    assert_eq!(recorder.recordings.len(), 1);
}

#[tokio::test]
async fn test_delete_of_playing_recording_is_refused() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    with_recording(&gateway, &controller).await;
    with_recording(&gateway, &controller).await;

    controller.play_recording(0).await.unwrap();
    let before = controller.recorder();

    let err = controller.delete_recording(0).await.unwrap_err();
    assert!(matches!(err, ControllerError::RecordingInUse(0)));
    assert_eq!(controller.recorder(), before);
    assert!(!gateway.calls().iter().any(|c| c.starts_with("delete_recording")));

    // Paused on the same recording is still in use
    controller.pause_playback().await.unwrap();
    assert!(matches!(
        controller.delete_recording(0).await,
        Err(ControllerError::RecordingInUse(0))
    ));

    // Another recording may go
    let recorder = controller.delete_recording(1).await.unwrap();
    assert_eq!(recorder.recordings.len(), 1);

    controller.stop_playback().await.unwrap();
    let recorder = controller.delete_recording(0).await.unwrap();
    assert!(recorder.recordings.is_empty());
}

#[tokio::test]
async fn test_save_recording_reports_file() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    with_recording(&gateway, &controller).await;

    let recorder = controller.save_recording(0).await.unwrap();
    assert_eq!(
        recorder.recordings[0].saved_as,
        Some(PathBuf::from("take-0.mid"))
    );

    let err = controller.save_recording(7).await.unwrap_err();
    assert!(matches!(
        err.gateway_error(),
        Some(GatewayError::IndexOutOfRange { index: 7, len: 1 })
    ));
}

// ============================================================================
// Playback
// ============================================================================

#[tokio::test]
async fn test_play_recording_pause_stop() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    with_recording(&gateway, &controller).await;

    let playback = controller.play_recording(0).await.unwrap();
    assert!(playback.is_playing());
    assert_eq!(playback.identifier(), Some(&PlaybackIdentifier::Recording(0)));

    let playback = controller.update_playback().await.unwrap();
    assert_eq!(playback.position_milliseconds, 100);

    let paused = controller.pause_playback().await.unwrap();
    assert!(paused.is_paused());
    assert_eq!(paused.identifier(), Some(&PlaybackIdentifier::Recording(0)));
    assert_eq!(paused.duration_milliseconds(), Some(TAKE_MS));

    // Position holds while paused
    let refreshed = controller.update_playback().await.unwrap();
    assert_eq!(refreshed.position_milliseconds, 100);

    let stopped = controller.stop_playback().await.unwrap();
    assert!(stopped.is_stopped());
    assert!(stopped.identifier().is_none());
    assert_eq!(stopped.position_milliseconds, 0);
}

#[tokio::test]
async fn test_play_track_identifier_is_file_path() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);

    controller.load_track().await.unwrap();
    controller.load_track().await.unwrap();
    let loaded = controller.load_track().await.unwrap();
    assert_eq!(loaded.tracks.len(), 3);
    assert!(loaded.is_stopped(), "loading never starts playback");

    let playback = controller.play_track(2).await.unwrap();
    assert_eq!(
        playback.identifier(),
        Some(&PlaybackIdentifier::MidiFile(PathBuf::from("/music/song-2.mid")))
    );

    let ejected = controller.eject_track(0).await.unwrap();
    assert_eq!(ejected.tracks.len(), 2);
}

#[tokio::test]
async fn test_stop_while_stopped_keeps_tracks() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    controller.load_track().await.unwrap();
    let mut notifications = controller.notifications();

    let playback = controller.stop_playback().await.unwrap();
    assert!(playback.is_stopped());
    assert_eq!(playback.tracks.len(), 1);
    assert_eq!(controller.playback(), playback);
    assert!(notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_play_while_playing_switches_source() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    with_recording(&gateway, &controller).await;
    controller.load_track().await.unwrap();

    controller.play_recording(0).await.unwrap();
    let playback = controller.play_track(0).await.unwrap();
    assert!(playback.is_playing());
    assert_eq!(
        playback.identifier(),
        Some(&PlaybackIdentifier::MidiFile(PathBuf::from("/music/song-0.mid")))
    );
    assert_eq!(controller.playback().tracks.len(), 1);
}

#[tokio::test]
async fn test_pause_while_stopped_resets_playback() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    controller.load_track().await.unwrap();
    let mut notifications = controller.notifications();

    assert!(controller.pause_playback().await.is_err());
    assert_eq!(controller.playback(), Playback::default());
    assert_eq!(
        notifications.recv().await.unwrap().component,
        Component::Playback
    );
}

// ============================================================================
// Traffic
// ============================================================================

#[tokio::test]
async fn test_send_failure_leaves_state_untouched() {
    let gateway = ScriptedGateway::with_ports();
    let controller = controller(&gateway);
    controller.scan().await.unwrap();
    let before = controller.session();
    let mut notifications = controller.notifications();

    let message = MidiMessage::note_on(MidiChannel::Channel1, 60, 100).unwrap();
    controller.send_midi_message(message.clone()).await.unwrap();
    assert_eq!(gateway.script.lock().sent, vec![message.clone()]);

    gateway.script.lock().fail_send = true;
    let err = controller.send_midi_message(message).await.unwrap_err();
    assert!(matches!(
        err,
        ControllerError::Gateway {
            component: Component::Output,
            source: GatewayError::NotConnected(PortDirection::Output),
        }
    ));
    assert_eq!(controller.session(), before);
    assert_eq!(notifications.recv().await.unwrap().component, Component::Output);
}

#[tokio::test]
async fn test_bus_delivers_to_latest_registration() {
    let gateway = ScriptedGateway::with_ports();
    let controller = SessionController::start(gateway.clone()).await.unwrap();

    let context = ContextId::new();
    let (a_tx, mut a_rx) = mpsc::unbounded_channel();
    let (b_tx, mut b_rx) = mpsc::unbounded_channel();

    let _a = controller.subscribe_midi(context, move |m: &MidiMessage| {
        let _ = a_tx.send(m.clone());
    });
    let _b = controller.subscribe_midi(context, move |m: &MidiMessage| {
        let _ = b_tx.send(m.clone());
    });

    let message = MidiMessage::control_change(MidiChannel::Channel2, 7, 64).unwrap();
    gateway.emit(message.clone());

    assert_eq!(b_rx.recv().await.unwrap(), message);
    assert!(a_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_start_fetches_initial_state() {
    let gateway = ScriptedGateway::with_ports();
    gateway.script.lock().session.available_input_ports = vec![Port::new("in-a", "Keys A")];

    let controller = SessionController::start(gateway.clone()).await.unwrap();
    assert_eq!(controller.session().available_input_ports.len(), 1);

    let calls = gateway.calls();
    for call in ["get_session", "get_recorder_state", "get_playback_state"] {
        assert!(calls.contains(&call.to_string()), "missing {}", call);
    }
}
