//! Binary signal codec
//!
//! Turns the hex payload sent by a sensor client into an ordered sequence of
//! samples. Every element encoding is little-endian; integer encodings are
//! widened to `f64` after decode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Decoded sample sequence
pub type DecodedSignal = Vec<f64>;

/// Declared element encoding of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// IEEE-754 single precision, little-endian
    Float32Le,
    /// Unsigned 16-bit integer, little-endian
    Uint16Le,
}

impl Encoding {
    /// Size in bytes of one encoded element
    pub fn element_size(self) -> usize {
        match self {
            Encoding::Float32Le => 4,
            Encoding::Uint16Le => 2,
        }
    }

    /// Canonical tag
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Float32Le => "float32le",
            Encoding::Uint16Le => "uint16le",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = DecodeError;

    /// Accepts the short tags used by the sensor firmware (`float`, `uint16`)
    /// and the explicit ones (`float32le`, `uint16le`).
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "float" | "float32le" => Ok(Encoding::Float32Le),
            "uint16" | "uint16le" => Ok(Encoding::Uint16Le),
            other => Err(DecodeError::UnsupportedEncoding(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("unsupported data format '{0}'")]
    UnsupportedEncoding(String),
}

/// Decode a hex payload with an encoding tag as sent on the wire
pub fn decode_tagged(payload: &str, tag: &str) -> Result<DecodedSignal, DecodeError> {
    let encoding: Encoding = tag.parse()?;
    decode(payload, encoding)
}

/// Decode a hex payload.
///
/// A trailing partial element is dropped. An empty payload decodes to an
/// empty signal.
pub fn decode(payload: &str, encoding: Encoding) -> Result<DecodedSignal, DecodeError> {
    tracing::debug!(
        "Decoding {} payload (preview: {})",
        encoding,
        payload.get(..50).unwrap_or(payload)
    );

    let bytes = hex::decode(payload)?;

    let values: DecodedSignal = match encoding {
        Encoding::Float32Le => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        Encoding::Uint16Le => bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]) as f64)
            .collect(),
    };

    let dropped = bytes.len() % encoding.element_size();
    if dropped != 0 {
        tracing::debug!("Dropped {} trailing byte(s) of a partial element", dropped);
    }
    tracing::debug!("Decoded {} values", values.len());

    Ok(values)
}
