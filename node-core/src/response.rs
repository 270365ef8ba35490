//! Response grammar for the sensor circuits.
//!
//! Every response opens with a status byte. Success responses carry an ASCII
//! reading after it, terminated by NUL or by the end of the transfer. Every
//! status value, mapped or not, turns into an [`Outcome`] that gets reported.

use core::fmt;

use heapless::String;

use crate::bus::{BusFault, READ_BUFFER_CAPACITY, ReadBuffer};
use crate::channels::Channel;

/// The command completed and a reading follows.
pub const STATUS_SUCCESS: u8 = 1;
/// The circuit rejected the command.
pub const STATUS_COMMAND_FAILED: u8 = 2;
/// The circuit is still computing the reading.
pub const STATUS_NOT_READY: u8 = 254;
/// The circuit has nothing further to send.
pub const STATUS_NO_DATA: u8 = 255;

/// Decoded status byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCode {
    Success,
    CommandFailed,
    CircuitNotReady,
    NoData,
    Unknown(u8),
}

impl StatusCode {
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            STATUS_SUCCESS => StatusCode::Success,
            STATUS_COMMAND_FAILED => StatusCode::CommandFailed,
            STATUS_NOT_READY => StatusCode::CircuitNotReady,
            STATUS_NO_DATA => StatusCode::NoData,
            other => StatusCode::Unknown(other),
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            StatusCode::Success => STATUS_SUCCESS,
            StatusCode::CommandFailed => STATUS_COMMAND_FAILED,
            StatusCode::CircuitNotReady => STATUS_NOT_READY,
            StatusCode::NoData => STATUS_NO_DATA,
            StatusCode::Unknown(raw) => raw,
        }
    }
}

impl From<u8> for StatusCode {
    fn from(raw: u8) -> Self {
        Self::from_raw(raw)
    }
}

/// Reading text copied out of a successful response.
pub type Payload = String<READ_BUFFER_CAPACITY>;

/// Classified result of polling one channel.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    /// Status 1. `truncated` is set when the circuit sent more than the
    /// buffer holds; `reading` then keeps the leading bytes only.
    Success { reading: Payload, truncated: bool },
    /// Status 2.
    CommandFailed,
    /// Status 254.
    CircuitNotReady,
    /// Status 255, or no status byte at all.
    NoData,
    /// Any status byte outside the table.
    Unknown(u8),
    /// Status 1 with a payload that is not ASCII text.
    Malformed,
}

impl Outcome {
    /// Returns the reading text for successful outcomes.
    #[must_use]
    pub fn reading(&self) -> Option<&str> {
        match self {
            Outcome::Success { reading, .. } => Some(reading.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { reading, .. } => f.write_str(reading),
            Outcome::CommandFailed => f.write_str("command failed"),
            Outcome::CircuitNotReady => f.write_str("circuit not ready"),
            Outcome::NoData => f.write_str("no data"),
            Outcome::Unknown(code) => write!(f, "unknown status code {code}"),
            Outcome::Malformed => f.write_str("malformed payload"),
        }
    }
}

/// Classifies a status byte and the payload already collected in `buffer`.
#[must_use]
pub fn classify_buffer(status: u8, buffer: &ReadBuffer) -> Outcome {
    match StatusCode::from_raw(status) {
        StatusCode::Success => decode_reading(buffer),
        StatusCode::CommandFailed => Outcome::CommandFailed,
        StatusCode::CircuitNotReady => Outcome::CircuitNotReady,
        StatusCode::NoData => Outcome::NoData,
        StatusCode::Unknown(code) => Outcome::Unknown(code),
    }
}

/// Classifies a status byte and its raw payload bytes.
///
/// The payload is bounded exactly as a poll would bound it: cut at the first
/// NUL and truncated to [`READ_BUFFER_CAPACITY`] bytes.
#[must_use]
pub fn classify(status: u8, raw: &[u8]) -> Outcome {
    classify_buffer(status, &ReadBuffer::from_payload(raw))
}

/// Classifies the result of a poll. A bus failure has no status byte and is
/// treated as [`Outcome::NoData`].
#[must_use]
pub fn classify_response(response: Result<u8, BusFault>, buffer: &ReadBuffer) -> Outcome {
    match response {
        Ok(status) => classify_buffer(status, buffer),
        Err(_) => Outcome::NoData,
    }
}

fn decode_reading(buffer: &ReadBuffer) -> Outcome {
    let bytes = buffer.as_bytes();
    if !bytes.is_ascii() {
        return Outcome::Malformed;
    }

    Outcome::Success {
        reading: bytes.iter().copied().map(char::from).collect(),
        truncated: buffer.overflowed(),
    }
}

/// Classified reading for one channel; lives only until it is reported.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorReading<'a> {
    pub channel: Channel<'a>,
    pub outcome: Outcome,
}

impl<'a> SensorReading<'a> {
    #[must_use]
    pub const fn new(channel: Channel<'a>, outcome: Outcome) -> Self {
        Self { channel, outcome }
    }
}
