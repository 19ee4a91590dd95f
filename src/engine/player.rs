//! Playback task
//!
//! One tokio task per play session walks the sequence and sends each event
//! through the shared output link when the session clock reaches its
//! offset. The task is steered through a `watch` control channel. Sessions
//! are numbered so a task that outlives its session never touches a newer
//! one.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::smf::Sequence;
use super::OutputSlot;
use crate::gateway::{GatewayError, GatewayResult};
use crate::playback::{Playback, PlaybackIdentifier, PlaybackState, Track};
use crate::protocol::{MidiChannel, MidiMessage};
use crate::session::PortDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Play,
    Pause,
    Stop,
}

/// Play position that only advances while running
#[derive(Debug, Clone, Copy)]
pub struct PlayClock {
    banked: Duration,
    running_since: Option<Instant>,
}

impl PlayClock {
    pub fn started(now: Instant) -> Self {
        Self {
            banked: Duration::ZERO,
            running_since: Some(now),
        }
    }

    pub fn position(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.banked + now.saturating_duration_since(since),
            None => self.banked,
        }
    }

    pub fn pause(&mut self, now: Instant) {
        self.banked = self.position(now);
        self.running_since = None;
    }

    pub fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }
}

struct ActiveSession {
    generation: u64,
    identifier: PlaybackIdentifier,
    duration: Duration,
    clock: PlayClock,
    channels: BTreeSet<MidiChannel>,
    control: watch::Sender<Control>,
}

#[derive(Default)]
struct Slot {
    active: Option<ActiveSession>,
    generation: u64,
}

impl Slot {
    fn position_of(&self, generation: u64, now: Instant) -> Option<Duration> {
        self.active
            .as_ref()
            .filter(|session| session.generation == generation)
            .map(|session| session.clock.position(now))
    }
}

/// What to send when a session ends
#[derive(Debug, Clone, Default)]
pub struct SilencePolicy {
    pub enabled: bool,
    /// Always silenced, in addition to the channels the session played on
    pub channels: Vec<MidiChannel>,
}

pub struct Player {
    slot: Arc<Mutex<Slot>>,
    output: OutputSlot,
    silence: SilencePolicy,
}

impl Player {
    pub fn new(output: OutputSlot, silence: SilencePolicy) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::default())),
            output,
            silence,
        }
    }

    /// Start a new session from the top of `sequence`, ending any current one
    pub fn play(&self, identifier: PlaybackIdentifier, sequence: Sequence) -> GatewayResult<()> {
        if self.output.lock().is_none() {
            return Err(GatewayError::NotConnected(PortDirection::Output));
        }

        let (control, control_rx) = watch::channel(Control::Play);
        let (generation, replaced) = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            let generation = slot.generation;
            let replaced = slot.active.replace(ActiveSession {
                generation,
                identifier: identifier.clone(),
                duration: sequence.duration,
                clock: PlayClock::started(Instant::now()),
                channels: sequence
                    .events
                    .iter()
                    .filter_map(|event| event.message.channel())
                    .collect(),
                control,
            });
            (generation, replaced)
        };
        if let Some(previous) = replaced {
            self.retire(previous);
        }

        info!(
            "Playing {} ({} events, {:?})",
            identifier,
            sequence.events.len(),
            sequence.duration
        );

        tokio::spawn(run(
            sequence,
            generation,
            control_rx,
            self.slot.clone(),
            self.output.clone(),
            self.silence.clone(),
        ));
        Ok(())
    }

    pub fn pause(&self) -> GatewayResult<()> {
        let mut slot = self.slot.lock();
        let session = match slot.active.as_mut() {
            Some(session) if session.clock.is_running() => session,
            _ => return Err(GatewayError::rejected("playback is not playing")),
        };
        session.clock.pause(Instant::now());
        session.control.send_replace(Control::Pause);
        debug!("Playback paused at {:?}", session.clock.position(Instant::now()));
        Ok(())
    }

    pub fn resume(&self) -> GatewayResult<()> {
        let mut slot = self.slot.lock();
        let session = match slot.active.as_mut() {
            Some(session) if !session.clock.is_running() => session,
            _ => return Err(GatewayError::rejected("playback is not paused")),
        };
        session.clock.resume(Instant::now());
        session.control.send_replace(Control::Play);
        debug!("Playback resumed");
        Ok(())
    }

    /// End the current session; stopping an idle player does nothing
    pub fn stop(&self) {
        let session = self.slot.lock().active.take();
        match session {
            Some(session) => self.retire(session),
            None => debug!("Playback already stopped"),
        }
    }

    fn retire(&self, session: ActiveSession) {
        session.control.send_replace(Control::Stop);
        info!("Playback stopped: {}", session.identifier);
        silence(&self.output, &self.silence, &session.channels);
    }

    pub fn identifier(&self) -> Option<PlaybackIdentifier> {
        self.slot
            .lock()
            .active
            .as_ref()
            .map(|session| session.identifier.clone())
    }

    /// Shift a recording identifier after the catalog entry `deleted` went away
    pub fn recording_deleted(&self, deleted: u32) {
        if let Some(session) = self.slot.lock().active.as_mut() {
            if let PlaybackIdentifier::Recording(index) = &mut session.identifier {
                if *index > deleted {
                    *index -= 1;
                }
            }
        }
    }

    pub fn snapshot(&self, tracks: Vec<Track>) -> Playback {
        let slot = self.slot.lock();
        let Some(session) = slot.active.as_ref() else {
            return Playback {
                tracks,
                ..Playback::default()
            };
        };

        let duration_milliseconds = session.duration.as_millis() as u64;
        let identifier = session.identifier.clone();
        let position = session.clock.position(Instant::now()).min(session.duration);
        let state = if session.clock.is_running() {
            PlaybackState::Playing {
                duration_milliseconds,
                identifier,
            }
        } else {
            PlaybackState::Paused {
                duration_milliseconds,
                identifier,
            }
        };

        Playback {
            state,
            position_milliseconds: position.as_millis() as u64,
            tracks,
        }
    }
}

fn send(output: &OutputSlot, message: &MidiMessage) {
    let mut output = output.lock();
    let Some(link) = output.as_mut() else {
        trace!("No output connected, dropping {}", message);
        return;
    };
    if let Err(e) = link.send(&message.encode()) {
        warn!("Playback send failed for {}: {}", message, e);
    }
}

fn silence(output: &OutputSlot, policy: &SilencePolicy, played: &BTreeSet<MidiChannel>) {
    if !policy.enabled {
        return;
    }
    let channels: BTreeSet<MidiChannel> = played
        .iter()
        .chain(policy.channels.iter())
        .copied()
        .collect();
    for channel in channels {
        send(output, &MidiMessage::all_notes_off(channel));
        send(output, &MidiMessage::all_sound_off(channel));
    }
}

async fn run(
    sequence: Sequence,
    generation: u64,
    mut control: watch::Receiver<Control>,
    slot: Arc<Mutex<Slot>>,
    output: OutputSlot,
    silence_policy: SilencePolicy,
) {
    let mut next = 0usize;

    loop {
        let state = *control.borrow_and_update();
        match state {
            Control::Stop => return,
            Control::Pause => {
                if control.changed().await.is_err() {
                    return;
                }
                continue;
            }
            Control::Play => {}
        }

        let Some(position) = slot.lock().position_of(generation, Instant::now()) else {
            return;
        };

        let due = sequence
            .events
            .get(next)
            .map(|event| event.offset)
            .unwrap_or(sequence.duration);

        if due > position {
            tokio::select! {
                _ = tokio::time::sleep(due - position) => {}
                changed = control.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            continue;
        }

        match sequence.events.get(next) {
            Some(event) => {
                trace!("play +{:?} {}", event.offset, event.message);
                send(&output, &event.message);
                next += 1;
            }
            None => break,
        }
    }

    // Natural end: retire the session unless a newer one replaced it
    let finished = {
        let mut slot = slot.lock();
        match slot.active.as_ref() {
            Some(session) if session.generation == generation => slot.active.take(),
            _ => None,
        }
    };
    if let Some(session) = finished {
        info!("Playback finished: {}", session.identifier);
        silence(&output, &silence_policy, &session.channels);
    }
}
