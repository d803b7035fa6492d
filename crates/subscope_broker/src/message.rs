//! Message definitions shared across the inspector.
//!
//! `ApplicationMessage` is what the operator asks the broker to transmit;
//! `InboundMessage` is what the broker delivers back. Payload formats and QoS
//! levels are closed enums so every interpretation happens in one exhaustive
//! match instead of string comparisons scattered across call sites.

use std::fmt;

use thiserror::Error;

/// Delivery-guarantee level negotiated per publish/subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    /// Numeric code used on the wire and in operator commands.
    pub fn code(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<QoS> {
        match code {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QoS::AtMostOnce => write!(f, "0 (At most once)"),
            QoS::AtLeastOnce => write!(f, "1 (At least once)"),
            QoS::ExactlyOnce => write!(f, "2 (Exactly once)"),
        }
    }
}

/// How a raw payload string typed by the operator is turned into the payload
/// that actually gets transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Transmit the text as-is.
    Text,
    /// Validate as JSON and transmit the compact rendering.
    Json,
    /// Interpret as hex bytes (whitespace ignored) and transmit the decoded
    /// text.
    Hex,
}

impl PayloadFormat {
    pub fn from_code(code: u8) -> Option<PayloadFormat> {
        match code {
            0 => Some(PayloadFormat::Text),
            1 => Some(PayloadFormat::Json),
            2 => Some(PayloadFormat::Hex),
            _ => None,
        }
    }

    /// Encode a raw operator-typed payload. This is the single site where
    /// format codes are interpreted.
    pub fn encode(self, raw: &str) -> Result<String, PayloadError> {
        match self {
            PayloadFormat::Text => Ok(raw.to_string()),
            PayloadFormat::Json => serde_json::from_str::<serde_json::Value>(raw)
                .map(|value| value.to_string())
                .map_err(|e| PayloadError::Json(e.to_string())),
            PayloadFormat::Hex => decode_hex(raw),
        }
    }
}

fn decode_hex(raw: &str) -> Result<String, PayloadError> {
    let digits: Vec<char> = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(PayloadError::OddHexLength);
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        let hi = pair[0]
            .to_digit(16)
            .ok_or(PayloadError::InvalidHexDigit(pair[0]))?;
        let lo = pair[1]
            .to_digit(16)
            .ok_or(PayloadError::InvalidHexDigit(pair[1]))?;
        bytes.push((hi * 16 + lo) as u8);
    }

    String::from_utf8(bytes).map_err(|_| PayloadError::NonUtf8)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload is not valid JSON: {0}")]
    Json(String),
    #[error("hex payload must contain an even number of digits")]
    OddHexLength,
    #[error("'{0}' is not a hex digit")]
    InvalidHexDigit(char),
    #[error("decoded hex payload is not valid UTF-8")]
    NonUtf8,
}

/// A message the operator wants transmitted, one-shot or on a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

/// A message delivered by the broker. Payload bytes are decoded to text by
/// the ingestion pipeline, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}
