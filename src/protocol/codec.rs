//! Byte and JSON codecs for [`MidiMessage`]
//!
//! Decoding is strict: anything outside the MIDI 1.0 grammar is refused
//! rather than masked into range.

use thiserror::Error;

use super::message::{
    ChannelMessage, ChannelModeMessage, ChannelVoiceMessage, ManufacturerId, MidiChannel,
    MidiMessage, SystemCommonMessage, SystemExclusiveMessage, SystemExclusiveSubId, SystemMessage,
    SystemRealTimeMessage,
};
use super::value::{U14, U7};

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("MIDI message cannot be empty")]
    Empty,

    #[error("invalid MIDI status byte 0x{0:02X}")]
    InvalidStatus(u8),

    #[error("status 0x{status:02X} requires {expected} data byte(s), got {actual}")]
    WrongLength {
        status: u8,
        expected: usize,
        actual: usize,
    },

    #[error("data byte {0} is out of range (0-127)")]
    DataByteOutOfRange(u8),

    #[error("14-bit value {0} is out of range (0-16383)")]
    ValueOutOfRange(u16),

    #[error("invalid local control value {0}; must be 0 or 127")]
    InvalidLocalControl(u8),

    #[error("controller {0} is reserved for channel mode messages")]
    ReservedController(u8),

    #[error("malformed manufacturer id {0:02X?}")]
    InvalidManufacturerId(Vec<u8>),

    #[error("system exclusive message has no sub id")]
    EmptySystemExclusive,

    #[error("malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),
}

fn data(status: u8, bytes: &[u8], expected: usize) -> Result<Vec<U7>, DecodeError> {
    if bytes.len() != expected {
        return Err(DecodeError::WrongLength {
            status,
            expected,
            actual: bytes.len(),
        });
    }
    bytes.iter().map(|&b| U7::try_from(b)).collect()
}

fn decode_channel(status: u8, bytes: &[u8]) -> Result<MidiMessage, DecodeError> {
    let channel =
        MidiChannel::from_index(status & 0x0F).ok_or(DecodeError::InvalidStatus(status))?;

    let message = match status & 0xF0 {
        0x80 => {
            let d = data(status, bytes, 2)?;
            ChannelMessage::Voice(ChannelVoiceMessage::NoteOff {
                note: d[0],
                velocity: d[1],
            })
        }
        0x90 => {
            let d = data(status, bytes, 2)?;
            ChannelMessage::Voice(ChannelVoiceMessage::NoteOn {
                note: d[0],
                velocity: d[1],
            })
        }
        0xA0 => {
            let d = data(status, bytes, 2)?;
            ChannelMessage::Voice(ChannelVoiceMessage::PolyphonicKeyPressure {
                note: d[0],
                pressure: d[1],
            })
        }
        0xB0 => {
            let d = data(status, bytes, 2)?;
            match d[0].get() {
                0x78 => ChannelMessage::Mode(ChannelModeMessage::AllSoundOff),
                0x79 => ChannelMessage::Mode(ChannelModeMessage::ResetAllControllers),
                0x7A => match d[1].get() {
                    0x00 => ChannelMessage::Mode(ChannelModeMessage::LocalControlOff),
                    0x7F => ChannelMessage::Mode(ChannelModeMessage::LocalControlOn),
                    other => return Err(DecodeError::InvalidLocalControl(other)),
                },
                0x7B => ChannelMessage::Mode(ChannelModeMessage::AllNotesOff),
                0x7C => ChannelMessage::Mode(ChannelModeMessage::OmniModeOff),
                0x7D => ChannelMessage::Mode(ChannelModeMessage::OmniModeOn),
                0x7E => ChannelMessage::Mode(ChannelModeMessage::MonoMode {
                    number_of_voices: d[1],
                }),
                0x7F => ChannelMessage::Mode(ChannelModeMessage::PolyMode),
                _ => ChannelMessage::Voice(ChannelVoiceMessage::ControlChange {
                    controller: d[0],
                    value: d[1],
                }),
            }
        }
        0xC0 => {
            let d = data(status, bytes, 1)?;
            ChannelMessage::Voice(ChannelVoiceMessage::ProgramChange(d[0]))
        }
        0xD0 => {
            let d = data(status, bytes, 1)?;
            ChannelMessage::Voice(ChannelVoiceMessage::ChannelPressure(d[0]))
        }
        0xE0 => {
            let d = data(status, bytes, 2)?;
            ChannelMessage::Voice(ChannelVoiceMessage::PitchBendChange(U14::from_lsb_msb(
                d[0], d[1],
            )))
        }
        _ => return Err(DecodeError::InvalidStatus(status)),
    };

    Ok(MidiMessage::Channel { channel, message })
}

fn decode_sysex(bytes: &[u8]) -> Result<MidiMessage, DecodeError> {
    // Drivers usually hand over the terminating EOX with the payload
    let body = match bytes.split_last() {
        Some((&SYSEX_END, rest)) => rest,
        _ => bytes,
    };
    let body: Vec<U7> = body
        .iter()
        .map(|&b| U7::try_from(b))
        .collect::<Result<_, _>>()?;

    let (sub_id, rest) = match body.first().map(|b| b.get()) {
        None => return Err(DecodeError::EmptySystemExclusive),
        Some(0x7D) => (SystemExclusiveSubId::NonCommercial, &body[1..]),
        Some(0x7E) => (SystemExclusiveSubId::NonRealTime, &body[1..]),
        Some(0x7F) => (SystemExclusiveSubId::RealTime, &body[1..]),
        Some(first) => {
            let width = (if first == 0x00 { 3 } else { 1 }).min(body.len());
            let id = ManufacturerId::try_from(body[..width].to_vec())?;
            (
                SystemExclusiveSubId::ManufacturerIdentification(id),
                &body[width..],
            )
        }
    };

    Ok(MidiMessage::System(SystemMessage::Exclusive(
        SystemExclusiveMessage {
            sub_id,
            data: rest.to_vec(),
        },
    )))
}

fn decode_system(status: u8, bytes: &[u8]) -> Result<MidiMessage, DecodeError> {
    let common = |m: SystemCommonMessage| -> Result<MidiMessage, DecodeError> {
        Ok(MidiMessage::System(SystemMessage::Common(m)))
    };
    let real_time = |m: SystemRealTimeMessage| -> Result<MidiMessage, DecodeError> {
        data(status, bytes, 0)?;
        Ok(MidiMessage::real_time(m))
    };

    match status {
        SYSEX_START => decode_sysex(bytes),
        0xF1 => {
            let d = data(status, bytes, 1)?;
            common(SystemCommonMessage::MidiTimeCodeQuarterFrame(d[0]))
        }
        0xF2 => {
            let d = data(status, bytes, 2)?;
            common(SystemCommonMessage::SongPositionPointer(U14::from_lsb_msb(
                d[0], d[1],
            )))
        }
        0xF3 => {
            let d = data(status, bytes, 1)?;
            common(SystemCommonMessage::SongSelect(d[0]))
        }
        0xF6 => {
            data(status, bytes, 0)?;
            common(SystemCommonMessage::TuneRequest)
        }
        SYSEX_END => {
            data(status, bytes, 0)?;
            common(SystemCommonMessage::EndOfSystemExclusive)
        }
        0xF8 => real_time(SystemRealTimeMessage::TimingClock),
        0xFA => real_time(SystemRealTimeMessage::Start),
        0xFB => real_time(SystemRealTimeMessage::Continue),
        0xFC => real_time(SystemRealTimeMessage::Stop),
        0xFE => real_time(SystemRealTimeMessage::ActiveSensing),
        0xFF => real_time(SystemRealTimeMessage::SystemReset),
        // 0xF4, 0xF5, 0xF9, 0xFD are undefined
        _ => Err(DecodeError::InvalidStatus(status)),
    }
}

impl TryFrom<&[u8]> for MidiMessage {
    type Error = DecodeError;

    /// Decode one complete message. Running status is not supported.
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let (&status, rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
        match status {
            0x80..=0xEF => decode_channel(status, rest),
            0xF0..=0xFF => decode_system(status, rest),
            _ => Err(DecodeError::InvalidStatus(status)),
        }
    }
}

impl MidiMessage {
    /// Encode to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            MidiMessage::Channel { channel, message } => {
                let ch = channel.index();
                let cc = |controller: u8, value: u8| vec![0xB0 | ch, controller, value];
                match message {
                    ChannelMessage::Voice(voice) => match voice {
                        ChannelVoiceMessage::NoteOff { note, velocity } => {
                            vec![0x80 | ch, note.get(), velocity.get()]
                        }
                        ChannelVoiceMessage::NoteOn { note, velocity } => {
                            vec![0x90 | ch, note.get(), velocity.get()]
                        }
                        ChannelVoiceMessage::PolyphonicKeyPressure { note, pressure } => {
                            vec![0xA0 | ch, note.get(), pressure.get()]
                        }
                        ChannelVoiceMessage::ControlChange { controller, value } => {
                            cc(controller.get(), value.get())
                        }
                        ChannelVoiceMessage::ProgramChange(program) => {
                            vec![0xC0 | ch, program.get()]
                        }
                        ChannelVoiceMessage::ChannelPressure(pressure) => {
                            vec![0xD0 | ch, pressure.get()]
                        }
                        ChannelVoiceMessage::PitchBendChange(value) => {
                            vec![0xE0 | ch, value.lsb().get(), value.msb().get()]
                        }
                    },
                    ChannelMessage::Mode(mode) => match mode {
                        ChannelModeMessage::AllSoundOff => cc(0x78, 0x00),
                        ChannelModeMessage::ResetAllControllers => cc(0x79, 0x00),
                        ChannelModeMessage::LocalControlOff => cc(0x7A, 0x00),
                        ChannelModeMessage::LocalControlOn => cc(0x7A, 0x7F),
                        ChannelModeMessage::AllNotesOff => cc(0x7B, 0x00),
                        ChannelModeMessage::OmniModeOff => cc(0x7C, 0x00),
                        ChannelModeMessage::OmniModeOn => cc(0x7D, 0x00),
                        ChannelModeMessage::MonoMode { number_of_voices } => {
                            cc(0x7E, number_of_voices.get())
                        }
                        ChannelModeMessage::PolyMode => cc(0x7F, 0x00),
                    },
                }
            }
            MidiMessage::System(SystemMessage::Common(common)) => match common {
                SystemCommonMessage::MidiTimeCodeQuarterFrame(value) => vec![0xF1, value.get()],
                SystemCommonMessage::SongPositionPointer(position) => {
                    vec![0xF2, position.lsb().get(), position.msb().get()]
                }
                SystemCommonMessage::SongSelect(song) => vec![0xF3, song.get()],
                SystemCommonMessage::TuneRequest => vec![0xF6],
                SystemCommonMessage::EndOfSystemExclusive => vec![SYSEX_END],
            },
            MidiMessage::System(SystemMessage::RealTime(real_time)) => vec![match real_time {
                SystemRealTimeMessage::TimingClock => 0xF8,
                SystemRealTimeMessage::Start => 0xFA,
                SystemRealTimeMessage::Continue => 0xFB,
                SystemRealTimeMessage::Stop => 0xFC,
                SystemRealTimeMessage::ActiveSensing => 0xFE,
                SystemRealTimeMessage::SystemReset => 0xFF,
            }],
            MidiMessage::System(SystemMessage::Exclusive(sysex)) => {
                let mut bytes = vec![SYSEX_START];
                match &sysex.sub_id {
                    SystemExclusiveSubId::ManufacturerIdentification(id) => {
                        bytes.extend(id.as_slice().iter().map(|b| b.get()))
                    }
                    SystemExclusiveSubId::NonCommercial => bytes.push(0x7D),
                    SystemExclusiveSubId::NonRealTime => bytes.push(0x7E),
                    SystemExclusiveSubId::RealTime => bytes.push(0x7F),
                }
                bytes.extend(sysex.data.iter().map(|b| b.get()));
                bytes.push(SYSEX_END);
                bytes
            }
        }
    }

    /// Structural checks that the serde shape alone cannot express
    pub fn validate(&self) -> Result<(), DecodeError> {
        match self {
            MidiMessage::Channel {
                message: ChannelMessage::Voice(ChannelVoiceMessage::ControlChange { controller, .. }),
                ..
            } if controller.get() >= 0x78 => {
                Err(DecodeError::ReservedController(controller.get()))
            }
            _ => Ok(()),
        }
    }

    /// Decode the JSON wire form, refusing structurally invalid messages
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        let message: MidiMessage = serde_json::from_str(json)?;
        message.validate()?;
        Ok(message)
    }

    pub fn to_json(&self) -> Result<String, DecodeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Format MIDI bytes as a hex string for logs
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
