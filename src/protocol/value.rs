//! Range-checked MIDI data values

use serde::{Deserialize, Serialize};
use std::fmt;

use super::codec::DecodeError;

/// A 7-bit MIDI data byte (0-127)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct U7(u8);

impl U7 {
    pub const MIN: U7 = U7(0);
    pub const MAX: U7 = U7(0x7F);

    /// Returns `None` when `value` has the high bit set
    pub const fn new(value: u8) -> Option<Self> {
        if value <= 0x7F {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for U7 {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(DecodeError::DataByteOutOfRange(value))
    }
}

impl From<U7> for u8 {
    fn from(value: U7) -> Self {
        value.0
    }
}

impl fmt::Display for U7 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 14-bit MIDI value (0-16383), sent on the wire as LSB then MSB
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct U14(u16);

impl U14 {
    pub const MIN: U14 = U14(0);
    pub const MAX: U14 = U14(0x3FFF);
    /// Pitch bend rest position
    pub const CENTER: U14 = U14(0x2000);

    pub const fn new(value: u16) -> Option<Self> {
        if value <= 0x3FFF {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub fn from_lsb_msb(lsb: U7, msb: U7) -> Self {
        Self(((msb.get() as u16) << 7) | lsb.get() as u16)
    }

    pub fn lsb(self) -> U7 {
        U7((self.0 & 0x7F) as u8)
    }

    pub fn msb(self) -> U7 {
        U7(((self.0 >> 7) & 0x7F) as u8)
    }
}

impl TryFrom<u16> for U14 {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(DecodeError::ValueOutOfRange(value))
    }
}

impl From<U14> for u16 {
    fn from(value: U14) -> Self {
        value.0
    }
}

impl fmt::Display for U14 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
