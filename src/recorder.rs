//! Recorder state machine
//!
//! ```text
//! stopped --start--> recording --pause--> paused
//!    ^                   ^                  |
//!    |                   +-----resume-------+
//!    +-------stop------- recording | paused
//! ```
//!
//! The client never runs its own clock: `elapsed` is whatever the backend
//! reported with the last state it returned.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SECOND: u32 = 1_000_000_000;

#[derive(Debug, Error)]
#[error("nanoseconds must be below 1_000_000_000, got {0}")]
pub struct InvalidDuration(pub u32);

#[derive(Deserialize)]
struct RawDuration {
    seconds: u64,
    nanoseconds: u32,
}

/// Elapsed recording time as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDuration")]
pub struct RecordingDuration {
    seconds: u64,
    nanoseconds: u32,
}

impl RecordingDuration {
    pub const ZERO: RecordingDuration = RecordingDuration {
        seconds: 0,
        nanoseconds: 0,
    };

    pub fn new(seconds: u64, nanoseconds: u32) -> Result<Self, InvalidDuration> {
        if nanoseconds >= NANOS_PER_SECOND {
            return Err(InvalidDuration(nanoseconds));
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Whole milliseconds, saturating at `u64::MAX`
    pub fn as_millis(&self) -> u64 {
        self.seconds
            .saturating_mul(1000)
            .saturating_add(u64::from(self.nanoseconds / 1_000_000))
    }
}

impl TryFrom<RawDuration> for RecordingDuration {
    type Error = InvalidDuration;

    fn try_from(raw: RawDuration) -> Result<Self, Self::Error> {
        Self::new(raw.seconds, raw.nanoseconds)
    }
}

impl From<Duration> for RecordingDuration {
    fn from(duration: Duration) -> Self {
        Self {
            seconds: duration.as_secs(),
            nanoseconds: duration.subsec_nanos(),
        }
    }
}

impl From<RecordingDuration> for Duration {
    fn from(duration: RecordingDuration) -> Self {
        Duration::new(duration.seconds, duration.nanoseconds)
    }
}

/// A finished take held by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub index: u32,
    pub duration_milliseconds: u64,
    /// File written by the last `saveRecording`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_as: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RecorderState {
    #[default]
    Stopped,
    Recording {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed: Option<RecordingDuration>,
    },
    Paused {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed: Option<RecordingDuration>,
    },
}

/// Recorder snapshot: run state plus the recordings catalog
///
/// Catalog order is recording order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recorder {
    #[serde(flatten)]
    pub state: RecorderState,
    #[serde(default)]
    pub recordings: Vec<Recording>,
}

impl Recorder {
    pub fn is_stopped(&self) -> bool {
        matches!(self.state, RecorderState::Stopped)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, RecorderState::Paused { .. })
    }

    pub fn elapsed(&self) -> Option<RecordingDuration> {
        match self.state {
            RecorderState::Stopped => None,
            RecorderState::Recording { elapsed } | RecorderState::Paused { elapsed } => elapsed,
        }
    }

    // Control guards. The backend remains the authority on legality; these
    // only reflect the last known state so a UI can disable controls.

    pub fn can_start(&self) -> bool {
        self.is_stopped()
    }

    pub fn can_pause(&self) -> bool {
        self.is_recording()
    }

    pub fn can_resume(&self) -> bool {
        self.is_paused()
    }

    pub fn can_stop(&self) -> bool {
        !self.is_stopped()
    }

    pub fn recording(&self, index: u32) -> Option<&Recording> {
        self.recordings.iter().find(|r| r.index == index)
    }
}
