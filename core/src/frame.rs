//! Hexadecimal frame codec.
//!
//! The remote service speaks in flat hexadecimal strings: a command frame is the command bytes,
//! a response frame is the response payload followed by the two status bytes SW1 and SW2.
//! No separators, no byte reordering.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Frame has an odd number of hex digits")]
    OddLength,

    #[error("Invalid hex character {character:?} at position {index}")]
    InvalidCharacter { index: usize, character: char },
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        match e {
            hex::FromHexError::InvalidHexCharacter { c, index } => Error::InvalidCharacter {
                index,
                character: c,
            },
            _ => Error::OddLength,
        }
    }
}

/// Parses a hexadecimal string into bytes, two digits per byte.
pub fn decode(frame: &str) -> Result<Vec<u8>> {
    hex::decode(frame).map_err(Error::from)
}

/// Renders the payload and the status bytes as an uppercase hexadecimal response frame.
pub fn encode(payload: &[u8], sw1: u8, sw2: u8) -> ResponseFrame {
    let mut frame = String::with_capacity(payload.len() * 2 + 4);
    frame.push_str(&hex::encode_upper(payload));
    frame.push_str(&hex::encode_upper([sw1, sw2]));

    ResponseFrame(frame)
}

/// A command frame issued by the remote service, as received.
///
/// The contents are not validated until the frame is decoded for transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandFrame(String);

impl CommandFrame {
    pub fn new(frame: impl Into<String>) -> Self {
        Self(frame.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the frame into the command bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        decode(&self.0)
    }
}

impl From<&str> for CommandFrame {
    fn from(frame: &str) -> Self {
        Self::new(frame)
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A response frame ready to be sent back: `payload || SW1 || SW2` in uppercase hex.
///
/// Only [`encode`] builds one, so the status bytes are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResponseFrame(String);

impl ResponseFrame {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The status bytes at the end of the frame.
    pub fn status(&self) -> (u8, u8) {
        let tail = &self.0[self.0.len() - 4..];
        let sw = hex::decode(tail).unwrap_or_default();

        match sw.as_slice() {
            [sw1, sw2] => (*sw1, *sw2),
            _ => (0x00, 0x00),
        }
    }

    /// The payload portion of the frame, still hex encoded.
    pub fn payload(&self) -> &str {
        &self.0[..self.0.len() - 4]
    }
}

impl PartialEq<&str> for ResponseFrame {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
