//! Playback state machine
//!
//! ```text
//! stopped --playRecording(i) | playTrack(i)--> playing --pause--> paused
//!                                                 ^                 |
//!                                                 +-----resume------+
//! playing | paused --stop--> stopped
//! ```
//!
//! Position is backend-reported and only moves while playing. It is
//! refreshed by polling, never pushed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A loaded, playable MIDI file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub index: u32,
    pub duration_milliseconds: u64,
    pub path: PathBuf,
}

impl Track {
    /// File name without directories
    pub fn title(&self) -> String {
        file_title(&self.path)
    }
}

fn file_title(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// What the current play session is replaying
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackIdentifier {
    /// A recording from the recorder catalog, by index
    Recording(u32),
    /// A loaded track, by file path
    MidiFile(PathBuf),
}

impl fmt::Display for PlaybackIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackIdentifier::Recording(index) => write!(f, "Recording #{}", index),
            PlaybackIdentifier::MidiFile(path) => write!(f, "{}", file_title(path)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    #[serde(rename_all = "camelCase")]
    Playing {
        duration_milliseconds: u64,
        identifier: PlaybackIdentifier,
    },
    #[serde(rename_all = "camelCase")]
    Paused {
        duration_milliseconds: u64,
        identifier: PlaybackIdentifier,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playback {
    #[serde(flatten)]
    pub state: PlaybackState,
    #[serde(default)]
    pub position_milliseconds: u64,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl Playback {
    pub fn is_stopped(&self) -> bool {
        matches!(self.state, PlaybackState::Stopped)
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, PlaybackState::Paused { .. })
    }

    pub fn identifier(&self) -> Option<&PlaybackIdentifier> {
        match &self.state {
            PlaybackState::Stopped => None,
            PlaybackState::Playing { identifier, .. } | PlaybackState::Paused { identifier, .. } => {
                Some(identifier)
            }
        }
    }

    pub fn duration_milliseconds(&self) -> Option<u64> {
        match self.state {
            PlaybackState::Stopped => None,
            PlaybackState::Playing {
                duration_milliseconds,
                ..
            }
            | PlaybackState::Paused {
                duration_milliseconds,
                ..
            } => Some(duration_milliseconds),
        }
    }

    /// True while recording `index` is playing or paused
    pub fn is_recording_active(&self, index: u32) -> bool {
        self.identifier() == Some(&PlaybackIdentifier::Recording(index))
    }

    pub fn track(&self, index: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.index == index)
    }

    pub fn can_pause(&self) -> bool {
        self.is_playing()
    }

    pub fn can_resume(&self) -> bool {
        self.is_paused()
    }

    pub fn can_stop(&self) -> bool {
        !self.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_is_stopped() {
        let playback = Playback::default();
        assert!(playback.is_stopped());
        assert_eq!(playback.position_milliseconds, 0);
        assert!(playback.identifier().is_none());
        assert!(playback.duration_milliseconds().is_none());
        assert!(!playback.can_stop());
    }

    #[test]
    fn test_identifier_wire_shape() {
        assert_eq!(
            serde_json::to_value(PlaybackIdentifier::Recording(3)).unwrap(),
            json!({"recording": 3})
        );
        assert_eq!(
            serde_json::to_value(PlaybackIdentifier::MidiFile(PathBuf::from("/tmp/a.mid"))).unwrap(),
            json!({"midiFile": "/tmp/a.mid"})
        );
    }

    #[test]
    fn test_playback_wire_shape() {
        let playback = Playback {
            state: PlaybackState::Playing {
                duration_milliseconds: 4000,
                identifier: PlaybackIdentifier::Recording(0),
            },
            position_milliseconds: 250,
            tracks: vec![Track {
                index: 0,
                duration_milliseconds: 9000,
                path: PathBuf::from("song.mid"),
            }],
        };
        let value = serde_json::to_value(&playback).unwrap();
        assert_eq!(
            value,
            json!({
                "state": "playing",
                "durationMilliseconds": 4000,
                "identifier": {"recording": 0},
                "positionMilliseconds": 250,
                "tracks": [{"index": 0, "durationMilliseconds": 9000, "path": "song.mid"}]
            })
        );
        assert_eq!(serde_json::from_value::<Playback>(value).unwrap(), playback);
    }

    #[test]
    fn test_recording_activity() {
        let paused = Playback {
            state: PlaybackState::Paused {
                duration_milliseconds: 10,
                identifier: PlaybackIdentifier::Recording(2),
            },
            ..Playback::default()
        };
        assert!(paused.is_recording_active(2));
        assert!(!paused.is_recording_active(1));
        assert!(!Playback::default().is_recording_active(2));
        assert_eq!(paused.identifier().unwrap().to_string(), "Recording #2");
    }
}
