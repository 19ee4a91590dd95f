//! Capture buffer behind the recorder
//!
//! Elapsed time only accumulates while recording: each resume opens a new
//! segment and pause banks it. Every stop turns the buffer into a take,
//! appended to the catalog even when nothing was played.

use std::mem;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::gateway::{GatewayError, GatewayResult};
use crate::protocol::MidiMessage;
use crate::recorder::{Recorder, RecorderState, Recording};

/// A message stamped with its offset from the start of a take or file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMessage {
    pub offset: Duration,
    pub message: MidiMessage,
}

impl TimedMessage {
    pub fn new(offset: Duration, message: MidiMessage) -> Self {
        Self { offset, message }
    }
}

/// One finished take
#[derive(Debug, Clone)]
pub struct Take {
    pub events: Vec<TimedMessage>,
    pub duration: Duration,
    pub saved_as: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Stopped,
    Recording { resumed_at: Instant, banked: Duration },
    Paused { elapsed: Duration },
}

pub struct Capture {
    phase: Phase,
    buffer: Vec<TimedMessage>,
    takes: Vec<Take>,
    ignore_housekeeping: bool,
}

impl Capture {
    pub fn new(ignore_housekeeping: bool) -> Self {
        Self {
            phase: Phase::Stopped,
            buffer: Vec::new(),
            takes: Vec::new(),
            ignore_housekeeping,
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        match self.phase {
            Phase::Stopped => Duration::ZERO,
            Phase::Recording { resumed_at, banked } => banked + now.saturating_duration_since(resumed_at),
            Phase::Paused { elapsed } => elapsed,
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.phase, Phase::Recording { .. })
    }

    pub fn start(&mut self, now: Instant) -> GatewayResult<()> {
        if !matches!(self.phase, Phase::Stopped) {
            return Err(GatewayError::rejected("recorder is already running"));
        }
        self.buffer.clear();
        self.phase = Phase::Recording {
            resumed_at: now,
            banked: Duration::ZERO,
        };
        info!("Recording started");
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> GatewayResult<()> {
        if !self.is_recording() {
            return Err(GatewayError::rejected("recorder is not recording"));
        }
        self.phase = Phase::Paused {
            elapsed: self.elapsed(now),
        };
        debug!("Recording paused");
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> GatewayResult<()> {
        let Phase::Paused { elapsed } = self.phase else {
            return Err(GatewayError::rejected("recorder is not paused"));
        };
        self.phase = Phase::Recording {
            resumed_at: now,
            banked: elapsed,
        };
        debug!("Recording resumed");
        Ok(())
    }

    /// Close the running take and append it to the catalog
    pub fn stop(&mut self, now: Instant) -> GatewayResult<u32> {
        if matches!(self.phase, Phase::Stopped) {
            return Err(GatewayError::rejected("recorder is not running"));
        }
        let take = Take {
            events: mem::take(&mut self.buffer),
            duration: self.elapsed(now),
            saved_as: None,
        };
        self.phase = Phase::Stopped;

        let index = self.takes.len() as u32;
        info!(
            "Recording stopped: take {} with {} events over {:?}",
            index,
            take.events.len(),
            take.duration
        );
        self.takes.push(take);
        Ok(index)
    }

    /// Append an inbound message to the running take
    ///
    /// Ignored unless recording; clock and active sensing are dropped when
    /// configured.
    pub fn record(&mut self, message: &MidiMessage, now: Instant) {
        if !self.is_recording() || (self.ignore_housekeeping && message.is_housekeeping()) {
            return;
        }
        let offset = self.elapsed(now);
        trace!("capture +{:?} {}", offset, message);
        self.buffer.push(TimedMessage::new(offset, message.clone()));
    }

    pub fn take(&self, index: u32) -> GatewayResult<&Take> {
        self.takes
            .get(index as usize)
            .ok_or(GatewayError::IndexOutOfRange {
                index,
                len: self.takes.len(),
            })
    }

    pub fn mark_saved(&mut self, index: u32, path: PathBuf) -> GatewayResult<()> {
        let len = self.takes.len();
        let take = self
            .takes
            .get_mut(index as usize)
            .ok_or(GatewayError::IndexOutOfRange { index, len })?;
        take.saved_as = Some(path);
        Ok(())
    }

    /// Remove a take; later takes move down one index
    pub fn delete(&mut self, index: u32) -> GatewayResult<Take> {
        let len = self.takes.len();
        if index as usize >= len {
            return Err(GatewayError::IndexOutOfRange { index, len });
        }
        Ok(self.takes.remove(index as usize))
    }

    pub fn snapshot(&self, now: Instant) -> Recorder {
        let elapsed = Some(self.elapsed(now).into());
        let state = match self.phase {
            Phase::Stopped => RecorderState::Stopped,
            Phase::Recording { .. } => RecorderState::Recording { elapsed },
            Phase::Paused { .. } => RecorderState::Paused { elapsed },
        };
        let recordings = self
            .takes
            .iter()
            .enumerate()
            .map(|(index, take)| Recording {
                index: index as u32,
                duration_milliseconds: take.duration.as_millis() as u64,
                saved_as: take.saved_as.clone(),
            })
            .collect();
        Recorder { state, recordings }
    }
}
