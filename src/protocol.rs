//! MIDI 1.0 message grammar
//!
//! Closed sum types for channel and system messages, 7/14-bit value types
//! that refuse out-of-range data, and the byte and JSON codecs used at the
//! edges of the crate.

mod codec;
mod message;
mod value;

pub use codec::{format_hex, DecodeError};
pub use message::{
    ChannelMessage, ChannelModeMessage, ChannelVoiceMessage, ManufacturerId, MidiChannel,
    MidiMessage, SystemCommonMessage, SystemExclusiveMessage, SystemExclusiveSubId, SystemMessage,
    SystemRealTimeMessage,
};
pub use value::{U14, U7};
