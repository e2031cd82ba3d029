// ble-session Source Code File
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

//! Conversions between the representations a characteristic value takes on its way from a
//! text field to the radio and back: text, lowercase hex, raw bytes and base64.
//!
//! Text is treated as a sequence of 8-bit code points: every character maps to exactly two
//! hex digits, and every byte decodes to the character U+0000..=U+00FF with that value.
//! Malformed input is rejected, never truncated.

use data_encoding::{DecodeError, DecodeKind, BASE64, HEXLOWER, HEXLOWER_PERMISSIVE};
use std::fmt::{self, Display, Formatter};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Hex string has odd length {0}")]
    OddLength(usize),
    #[error("Invalid hex digit at position {0}")]
    InvalidHex(usize),
    #[error("Invalid base64: {0}")]
    InvalidBase64(#[source] DecodeError),
    #[error("Character {character:?} at position {position} does not fit in one byte")]
    NonByteCharacter { character: char, position: usize },
}

pub type Result<T> = std::result::Result<T, EncodingError>;

/// Lowercase hex, two digits per byte.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    HEXLOWER.encode(bytes)
}

/// Decodes hex in either case. Whitespace is not allowed.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(EncodingError::OddLength(hex.len()));
    }
    HEXLOWER_PERMISSIVE
        .decode(hex.as_bytes())
        .map_err(|e| match e.kind {
            DecodeKind::Length => EncodingError::OddLength(hex.len()),
            _ => EncodingError::InvalidHex(e.position),
        })
}

/// Standard, padded base64.
pub fn bytes_to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn base64_to_bytes(base64: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(base64.as_bytes())
        .map_err(EncodingError::InvalidBase64)
}

/// Maps each character to its code point as two lowercase hex digits.
pub fn text_to_hex(text: &str) -> Result<String> {
    text_to_bytes(text).map(|bytes| bytes_to_hex(&bytes))
}

/// Two hex digits per output character.
pub fn hex_to_text(hex: &str) -> Result<String> {
    hex_to_bytes(hex).map(|bytes| bytes_to_text(&bytes))
}

pub fn hex_to_base64(hex: &str) -> Result<String> {
    hex_to_bytes(hex).map(|bytes| bytes_to_base64(&bytes))
}

pub fn base64_to_hex(base64: &str) -> Result<String> {
    base64_to_bytes(base64).map(|bytes| bytes_to_hex(&bytes))
}

pub fn text_to_base64(text: &str) -> Result<String> {
    text_to_bytes(text).map(|bytes| bytes_to_base64(&bytes))
}

pub fn base64_to_text(base64: &str) -> Result<String> {
    base64_to_hex(base64).and_then(|hex| hex_to_text(&hex))
}

/// One byte per character; fails on the first character above U+00FF.
pub fn text_to_bytes(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .enumerate()
        .map(|(position, character)| {
            u8::try_from(character)
                .map_err(|_| EncodingError::NonByteCharacter { character, position })
        })
        .collect()
}

/// One character per byte. Total: every byte is a valid code point.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// A characteristic value in transport encoding (base64). This is the only form in which
/// values cross the [`Transport`](crate::api::Transport) boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EncodedValue(String);

impl EncodedValue {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        EncodedValue(bytes_to_base64(bytes))
    }

    /// Accepts a string only if it is valid base64.
    pub fn parse(encoded: impl Into<String>) -> Result<Self> {
        let encoded = encoded.into();
        base64_to_bytes(&encoded)?;
        Ok(EncodedValue(encoded))
    }

    /// Wraps whatever a misbehaving stack might hand over, unvalidated.
    #[cfg(any(test, feature = "mock"))]
    pub(crate) fn unchecked(encoded: impl Into<String>) -> Self {
        EncodedValue(encoded.into())
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        base64_to_bytes(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EncodedValue {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value a caller wants written, in whichever form they have it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Sent one byte per character.
    Text(String),
    Hex(String),
    Bytes(Vec<u8>),
    Base64(String),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    pub fn hex(hex: impl Into<String>) -> Self {
        Payload::Hex(hex.into())
    }

    pub fn base64(base64: impl Into<String>) -> Self {
        Payload::Base64(base64.into())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Text(text) => text_to_bytes(text),
            Payload::Hex(hex) => hex_to_bytes(hex),
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::Base64(base64) => base64_to_bytes(base64),
        }
    }

    pub fn encode(&self) -> Result<EncodedValue> {
        match self {
            Payload::Text(text) => text_to_base64(text).map(EncodedValue),
            _ => self.to_bytes().map(|bytes| EncodedValue::from_bytes(&bytes)),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}
