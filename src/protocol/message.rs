//! MIDI message types
//!
//! Mirrors the MIDI 1.0 message taxonomy: a message is either scoped
//! to one of 16 channels (voice or mode) or addressed to the whole system
//! (common, real-time or exclusive).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::codec::DecodeError;
use super::value::{U14, U7};

/// One of the 16 MIDI channels, serialized as `"channel1"` .. `"channel16"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MidiChannel {
    Channel1,
    Channel2,
    Channel3,
    Channel4,
    Channel5,
    Channel6,
    Channel7,
    Channel8,
    Channel9,
    Channel10,
    Channel11,
    Channel12,
    Channel13,
    Channel14,
    Channel15,
    Channel16,
}

impl MidiChannel {
    pub const ALL: [MidiChannel; 16] = [
        MidiChannel::Channel1,
        MidiChannel::Channel2,
        MidiChannel::Channel3,
        MidiChannel::Channel4,
        MidiChannel::Channel5,
        MidiChannel::Channel6,
        MidiChannel::Channel7,
        MidiChannel::Channel8,
        MidiChannel::Channel9,
        MidiChannel::Channel10,
        MidiChannel::Channel11,
        MidiChannel::Channel12,
        MidiChannel::Channel13,
        MidiChannel::Channel14,
        MidiChannel::Channel15,
        MidiChannel::Channel16,
    ];

    /// Wire nibble (0-15)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Build from the wire nibble (0-15)
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Build from the user-facing channel number (1-16)
    pub fn from_number(number: u8) -> Option<Self> {
        number.checked_sub(1).and_then(Self::from_index)
    }

    /// User-facing channel number (1-16)
    pub fn number(self) -> u8 {
        self.index() + 1
    }
}

impl fmt::Display for MidiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelVoiceMessage {
    NoteOff { note: U7, velocity: U7 },
    /// Velocity 0 is kept as a note-on so the message re-encodes unchanged
    NoteOn { note: U7, velocity: U7 },
    PolyphonicKeyPressure { note: U7, pressure: U7 },
    /// Controllers 120-127 are channel mode messages and never appear here
    ControlChange { controller: U7, value: U7 },
    ProgramChange(U7),
    ChannelPressure(U7),
    PitchBendChange(U14),
}

/// Channel mode messages (control change numbers 120-127)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelModeMessage {
    AllSoundOff,
    ResetAllControllers,
    LocalControlOff,
    LocalControlOn,
    AllNotesOff,
    OmniModeOff,
    OmniModeOn,
    #[serde(rename_all = "camelCase")]
    MonoMode {
        number_of_voices: U7,
    },
    PolyMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelMessage {
    Voice(ChannelVoiceMessage),
    Mode(ChannelModeMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemCommonMessage {
    /// Carries the raw message-type/value byte
    MidiTimeCodeQuarterFrame(U7),
    SongPositionPointer(U14),
    SongSelect(U7),
    TuneRequest,
    EndOfSystemExclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemRealTimeMessage {
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    SystemReset,
}

/// Manufacturer id of a system exclusive message
///
/// Either one byte (0x01-0x7C) or three bytes starting with 0x00. The
/// shape is checked on construction, so a malformed id cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<U7>", into = "Vec<U7>")]
pub struct ManufacturerId(Vec<U7>);

impl ManufacturerId {
    pub fn as_slice(&self) -> &[U7] {
        &self.0
    }
}

impl TryFrom<Vec<U7>> for ManufacturerId {
    type Error = DecodeError;

    fn try_from(bytes: Vec<U7>) -> Result<Self, Self::Error> {
        let well_formed = match bytes.as_slice() {
            [single] => (0x01..=0x7C).contains(&single.get()),
            [first, _, _] => first.get() == 0x00,
            _ => false,
        };
        if !well_formed {
            return Err(DecodeError::InvalidManufacturerId(
                bytes.iter().map(|b| b.get()).collect(),
            ));
        }
        Ok(Self(bytes))
    }
}

impl From<ManufacturerId> for Vec<U7> {
    fn from(id: ManufacturerId) -> Self {
        id.0
    }
}

/// First byte(s) after 0xF0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemExclusiveSubId {
    ManufacturerIdentification(ManufacturerId),
    NonCommercial,
    NonRealTime,
    RealTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemExclusiveMessage {
    pub sub_id: SystemExclusiveSubId,
    pub data: Vec<U7>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemMessage {
    Common(SystemCommonMessage),
    RealTime(SystemRealTimeMessage),
    Exclusive(SystemExclusiveMessage),
}

/// A complete MIDI 1.0 message
///
/// JSON shape: `{"channel": {"channel": "channel1", "message": {...}}}` or
/// `{"system": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MidiMessage {
    Channel {
        channel: MidiChannel,
        message: ChannelMessage,
    },
    System(SystemMessage),
}

impl MidiMessage {
    fn voice(channel: MidiChannel, message: ChannelVoiceMessage) -> Self {
        MidiMessage::Channel {
            channel,
            message: ChannelMessage::Voice(message),
        }
    }

    fn mode(channel: MidiChannel, message: ChannelModeMessage) -> Self {
        MidiMessage::Channel {
            channel,
            message: ChannelMessage::Mode(message),
        }
    }

    pub fn note_on(channel: MidiChannel, note: u8, velocity: u8) -> Result<Self, DecodeError> {
        Ok(Self::voice(
            channel,
            ChannelVoiceMessage::NoteOn {
                note: note.try_into()?,
                velocity: velocity.try_into()?,
            },
        ))
    }

    pub fn note_off(channel: MidiChannel, note: u8, velocity: u8) -> Result<Self, DecodeError> {
        Ok(Self::voice(
            channel,
            ChannelVoiceMessage::NoteOff {
                note: note.try_into()?,
                velocity: velocity.try_into()?,
            },
        ))
    }

    pub fn control_change(
        channel: MidiChannel,
        controller: u8,
        value: u8,
    ) -> Result<Self, DecodeError> {
        if controller >= 0x78 {
            return Err(DecodeError::ReservedController(controller));
        }
        Ok(Self::voice(
            channel,
            ChannelVoiceMessage::ControlChange {
                controller: controller.try_into()?,
                value: value.try_into()?,
            },
        ))
    }

    pub fn program_change(channel: MidiChannel, program: u8) -> Result<Self, DecodeError> {
        Ok(Self::voice(
            channel,
            ChannelVoiceMessage::ProgramChange(program.try_into()?),
        ))
    }

    pub fn all_notes_off(channel: MidiChannel) -> Self {
        Self::mode(channel, ChannelModeMessage::AllNotesOff)
    }

    pub fn all_sound_off(channel: MidiChannel) -> Self {
        Self::mode(channel, ChannelModeMessage::AllSoundOff)
    }

    pub fn real_time(message: SystemRealTimeMessage) -> Self {
        MidiMessage::System(SystemMessage::RealTime(message))
    }

    /// Channel for channel messages, `None` for system messages
    pub fn channel(&self) -> Option<MidiChannel> {
        match self {
            MidiMessage::Channel { channel, .. } => Some(*channel),
            MidiMessage::System(_) => None,
        }
    }

    pub fn is_channel_message(&self) -> bool {
        self.channel().is_some()
    }

    /// Clock and active-sensing traffic that carries no musical content
    pub fn is_housekeeping(&self) -> bool {
        matches!(
            self,
            MidiMessage::System(SystemMessage::RealTime(
                SystemRealTimeMessage::TimingClock | SystemRealTimeMessage::ActiveSensing
            ))
        )
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiMessage::Channel { channel, message } => match message {
                ChannelMessage::Voice(voice) => match voice {
                    ChannelVoiceMessage::NoteOff { note, velocity } => {
                        write!(f, "NoteOff ch:{} n:{} v:{}", channel, note, velocity)
                    }
                    ChannelVoiceMessage::NoteOn { note, velocity } => {
                        write!(f, "NoteOn ch:{} n:{} v:{}", channel, note, velocity)
                    }
                    ChannelVoiceMessage::PolyphonicKeyPressure { note, pressure } => {
                        write!(f, "PolyPressure ch:{} n:{} p:{}", channel, note, pressure)
                    }
                    ChannelVoiceMessage::ControlChange { controller, value } => {
                        write!(f, "CC ch:{} cc:{} v:{}", channel, controller, value)
                    }
                    ChannelVoiceMessage::ProgramChange(program) => {
                        write!(f, "ProgramChange ch:{} p:{}", channel, program)
                    }
                    ChannelVoiceMessage::ChannelPressure(pressure) => {
                        write!(f, "ChannelPressure ch:{} p:{}", channel, pressure)
                    }
                    ChannelVoiceMessage::PitchBendChange(value) => {
                        write!(f, "PitchBend ch:{} v:{}", channel, value)
                    }
                },
                ChannelMessage::Mode(mode) => write!(f, "Mode ch:{} {:?}", channel, mode),
            },
            MidiMessage::System(SystemMessage::Exclusive(sysex)) => {
                write!(f, "SysEx {:?} {} bytes", sysex.sub_id, sysex.data.len())
            }
            MidiMessage::System(SystemMessage::Common(common)) => write!(f, "{:?}", common),
            MidiMessage::System(SystemMessage::RealTime(real_time)) => {
                write!(f, "{:?}", real_time)
            }
        }
    }
}
