//! Local engine - in-process backend behind the command gateway
//!
//! Owns the real MIDI connections, the capture buffer and the player, and
//! answers every gateway call with a fresh snapshot of the machine it
//! touched. All locks are `parking_lot` mutexes, never held across an
//! `.await`.

mod capture;
mod midir_driver;
mod picker;
mod player;
mod ports;
mod smf;


use async_trait::async_trait;
use chrono::Local;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, trace};

use crate::config::AppConfig;
use crate::gateway::{CommandGateway, GatewayError, GatewayResult, MidiEventStream};
use crate::paths::AppPaths;
use crate::playback::{Playback, PlaybackIdentifier, Track};
use crate::protocol::{format_hex, MidiChannel, MidiMessage};
use crate::recorder::Recorder;
use crate::session::{Port, PortDirection, Session};

pub use capture::TimedMessage;
pub use midir_driver::MidirDriver;
pub use picker::{QueuedPicker, TrackPicker};
pub use player::SilencePolicy;
pub use ports::{InputCallback, InputLink, OutputLink, PortDriver};
pub use smf::Sequence;

use capture::Capture;
use player::Player;

/// Output connection shared by direct sends and the player
pub(crate) type OutputSlot = Arc<Mutex<Option<Box<dyn OutputLink>>>>;

type Subscribers = Arc<Mutex<Vec<mpsc::UnboundedSender<MidiMessage>>>>;

/// Engine behavior knobs, usually derived from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Where `save_recording` writes SMF files
    pub recorder_directory: PathBuf,
    /// Drop timing clock and active sensing while capturing
    pub ignore_housekeeping: bool,
    pub silence: SilencePolicy,
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig, paths: &AppPaths) -> Self {
        Self {
            recorder_directory: config.recorder.directory_in(paths),
            ignore_housekeeping: config.recorder.ignore_realtime,
            silence: SilencePolicy {
                enabled: config.playback.silence_on_stop,
                channels: config
                    .playback
                    .silence_channels
                    .iter()
                    .filter_map(|&n| MidiChannel::from_number(n))
                    .collect(),
            },
        }
    }
}

struct LoadedTrack {
    path: PathBuf,
    sequence: Sequence,
}

pub struct LocalEngine {
    driver: Arc<dyn PortDriver>,
    picker: Arc<dyn TrackPicker>,
    options: EngineOptions,
    session: Mutex<Session>,
    input: Mutex<Option<Box<dyn InputLink>>>,
    output: OutputSlot,
    subscribers: Subscribers,
    capture: Arc<Mutex<Capture>>,
    tracks: Mutex<Vec<LoadedTrack>>,
    player: Player,
}

impl LocalEngine {
    pub fn new(
        driver: Arc<dyn PortDriver>,
        picker: Arc<dyn TrackPicker>,
        options: EngineOptions,
    ) -> Self {
        let output: OutputSlot = Arc::new(Mutex::new(None));
        info!("Local engine using {} driver", driver.name());
        Self {
            driver,
            picker,
            session: Mutex::new(Session::default()),
            input: Mutex::new(None),
            output: output.clone(),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capture: Arc::new(Mutex::new(Capture::new(options.ignore_housekeeping))),
            tracks: Mutex::new(Vec::new()),
            player: Player::new(output, options.silence.clone()),
            options,
        }
    }

    fn session_snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    fn recorder_snapshot(&self) -> Recorder {
        self.capture.lock().snapshot(Instant::now())
    }

    fn playback_snapshot(&self) -> Playback {
        let tracks = self
            .tracks
            .lock()
            .iter()
            .enumerate()
            .map(|(index, track)| Track {
                index: index as u32,
                duration_milliseconds: track.sequence.duration.as_millis() as u64,
                path: track.path.clone(),
            })
            .collect();
        self.player.snapshot(tracks)
    }

    fn known_port(&self, direction: PortDirection, port_id: &str) -> GatewayResult<Port> {
        self.session
            .lock()
            .find(direction, port_id)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownPort {
                direction,
                id: port_id.to_string(),
            })
    }

    /// Driver-thread entry point for inbound bytes
    fn input_callback(&self) -> InputCallback {
        let capture = self.capture.clone();
        let subscribers = self.subscribers.clone();
        Box::new(move |bytes: &[u8]| {
            let message = match MidiMessage::try_from(bytes) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Dropping inbound {}: {}", format_hex(bytes), e);
                    return;
                }
            };
            trace!("Received: {} | {}", format_hex(bytes), message);
            capture.lock().record(&message, Instant::now());
            subscribers
                .lock()
                .retain(|subscriber| subscriber.send(message.clone()).is_ok());
        })
    }

    fn recording_sequence(&self, index: u32) -> GatewayResult<Sequence> {
        let capture = self.capture.lock();
        let take = capture.take(index)?;
        Ok(Sequence::new(take.events.clone(), take.duration))
    }
}

#[async_trait]
impl CommandGateway for LocalEngine {
    async fn get_session(&self) -> GatewayResult<Session> {
        Ok(self.session_snapshot())
    }

    async fn scan_input_ports(&self) -> GatewayResult<Session> {
        let ports = self.driver.input_ports()?;
        let mut session = self.session.lock();
        session.available_input_ports = ports;
        Ok(session.clone())
    }

    async fn scan_output_ports(&self) -> GatewayResult<Session> {
        let ports = self.driver.output_ports()?;
        let mut session = self.session.lock();
        session.available_output_ports = ports;
        Ok(session.clone())
    }

    async fn connect_input_port(&self, port_id: &str) -> GatewayResult<Session> {
        let port = self.known_port(PortDirection::Input, port_id)?;
        // Close the previous port before opening, some drivers allow one client only
        self.input.lock().take();
        self.session.lock().input_connection = None;
        let link = self.driver.open_input(&port, self.input_callback())?;
        *self.input.lock() = Some(link);

        let mut session = self.session.lock();
        session.input_connection = Some(port);
        Ok(session.clone())
    }

    async fn connect_output_port(&self, port_id: &str) -> GatewayResult<Session> {
        let port = self.known_port(PortDirection::Output, port_id)?;
        self.output.lock().take();
        self.session.lock().output_connection = None;
        let link = self.driver.open_output(&port)?;
        *self.output.lock() = Some(link);

        let mut session = self.session.lock();
        session.output_connection = Some(port);
        Ok(session.clone())
    }

    async fn disconnect_input_port(&self) -> GatewayResult<Session> {
        if self.input.lock().take().is_some() {
            info!("Input port disconnected");
        }
        let mut session = self.session.lock();
        session.input_connection = None;
        Ok(session.clone())
    }

    async fn disconnect_output_port(&self) -> GatewayResult<Session> {
        if self.output.lock().take().is_some() {
            info!("Output port disconnected");
        }
        let mut session = self.session.lock();
        session.output_connection = None;
        Ok(session.clone())
    }

    async fn send_midi_message(&self, message: MidiMessage) -> GatewayResult<()> {
        message.validate()?;
        let mut output = self.output.lock();
        let link = output
            .as_mut()
            .ok_or(GatewayError::NotConnected(PortDirection::Output))?;
        link.send(&message.encode())?;
        trace!("Sent {}", message);
        Ok(())
    }

    async fn subscribe_midi_events(&self) -> GatewayResult<MidiEventStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn get_recorder_state(&self) -> GatewayResult<Recorder> {
        Ok(self.recorder_snapshot())
    }

    async fn start_recording(&self) -> GatewayResult<Recorder> {
        self.capture.lock().start(Instant::now())?;
        Ok(self.recorder_snapshot())
    }

    async fn pause_recording(&self) -> GatewayResult<Recorder> {
        self.capture.lock().pause(Instant::now())?;
        Ok(self.recorder_snapshot())
    }

    async fn resume_recording(&self) -> GatewayResult<Recorder> {
        self.capture.lock().resume(Instant::now())?;
        Ok(self.recorder_snapshot())
    }

    async fn stop_recording(&self) -> GatewayResult<Recorder> {
        self.capture.lock().stop(Instant::now())?;
        Ok(self.recorder_snapshot())
    }

    async fn save_recording(&self, index: u32) -> GatewayResult<Recorder> {
        let sequence = self.recording_sequence(index)?;

        let directory = &self.options.recorder_directory;
        tokio::fs::create_dir_all(directory).await?;
        let file_name = format!(
            "recording-{}-{}.mid",
            Local::now().format("%Y%m%d-%H%M%S"),
            index
        );
        let path = directory.join(file_name);
        smf::export(&sequence, &path).await?;

        // The catalog may have changed while writing
        self.capture.lock().mark_saved(index, path.clone())?;
        info!("Saved recording {} to {}", index, path.display());
        Ok(self.recorder_snapshot())
    }

    async fn delete_recording(&self, index: u32) -> GatewayResult<Recorder> {
        if self.player.identifier() == Some(PlaybackIdentifier::Recording(index)) {
            return Err(GatewayError::rejected(format!(
                "recording {} is being played",
                index
            )));
        }
        self.capture.lock().delete(index)?;
        self.player.recording_deleted(index);
        info!("Deleted recording {}", index);
        Ok(self.recorder_snapshot())
    }

    async fn get_playback_state(&self) -> GatewayResult<Playback> {
        Ok(self.playback_snapshot())
    }

    async fn update_playback_state(&self) -> GatewayResult<Playback> {
        Ok(self.playback_snapshot())
    }

    async fn load_track(&self) -> GatewayResult<Playback> {
        let path = self.picker.pick().ok_or(GatewayError::NoTrackSelected)?;
        let sequence = smf::import(&path).await?;
        info!(
            "Loaded track {} ({} events)",
            path.display(),
            sequence.events.len()
        );
        self.tracks.lock().push(LoadedTrack { path, sequence });
        Ok(self.playback_snapshot())
    }

    async fn eject_track(&self, index: u32) -> GatewayResult<Playback> {
        {
            let mut tracks = self.tracks.lock();
            let len = tracks.len();
            if index as usize >= len {
                return Err(GatewayError::IndexOutOfRange { index, len });
            }
            let track = tracks.remove(index as usize);
            info!("Ejected track {}", track.path.display());
        }
        Ok(self.playback_snapshot())
    }

    async fn play_recording(&self, index: u32) -> GatewayResult<Playback> {
        let sequence = self.recording_sequence(index)?;
        self.player
            .play(PlaybackIdentifier::Recording(index), sequence)?;
        Ok(self.playback_snapshot())
    }

    async fn play_track(&self, index: u32) -> GatewayResult<Playback> {
        let (path, sequence) = {
            let tracks = self.tracks.lock();
            let track = tracks
                .get(index as usize)
                .ok_or(GatewayError::IndexOutOfRange {
                    index,
                    len: tracks.len(),
                })?;
            (track.path.clone(), track.sequence.clone())
        };
        self.player.play(PlaybackIdentifier::MidiFile(path), sequence)?;
        Ok(self.playback_snapshot())
    }

    async fn pause_playback(&self) -> GatewayResult<Playback> {
        self.player.pause()?;
        Ok(self.playback_snapshot())
    }

    async fn resume_playback(&self) -> GatewayResult<Playback> {
        self.player.resume()?;
        Ok(self.playback_snapshot())
    }

    async fn stop_playback(&self) -> GatewayResult<Playback> {
        self.player.stop();
        Ok(self.playback_snapshot())
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.player.stop();
    }
}
