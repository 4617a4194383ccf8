//! Codec for inbound payloads and outbound frames.
//!
//! Inbound text must parse as JSON to be relayed. The parsed value is wrapped
//! in a `{"message": ...}` envelope and serialized once, so the same string can
//! be handed to every peer. Object keys keep the sender's order, and
//! integral floats such as `1.0` are written back as `1`.

use serde_json::{Number, Value};
use thiserror::Error;

use crate::frames::ServerFrame;

/// Default maximum inbound payload size (64 KiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload exceeds the configured size limit.
    #[error("Payload size {size} exceeds maximum {max}")]
    TooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Payload is not valid JSON.
    #[error("Malformed payload: {0}")]
    Malformed(#[source] serde_json::Error),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Short label used for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ProtocolError::TooLarge { .. } => "oversize",
            ProtocolError::Malformed(_) => "malformed",
            ProtocolError::Encode(_) => "encode",
        }
    }
}

/// Parse an inbound payload as JSON.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the text is not a JSON document.
pub fn parse_payload(text: &str) -> Result<Value, ProtocolError> {
    let mut value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
    normalize_numbers(&mut value);
    Ok(value)
}

/// Rewrite floats with no fractional part as integers, recursively.
fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) if n.is_f64() => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER {
                    *n = Number::from(f as i64);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(map) => map.values_mut().for_each(normalize_numbers),
        _ => {}
    }
}

/// Encode a server frame to its JSON text form.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(frame: &ServerFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Parse `text` and wrap it as a relay envelope.
///
/// # Errors
///
/// Returns an error if the payload is not JSON.
pub fn relay_envelope(text: &str) -> Result<String, ProtocolError> {
    let value = parse_payload(text)?;
    encode(&ServerFrame::relay(value))
}

/// Size-aware codec used by the relay loop.
#[derive(Debug, Clone, Copy)]
pub struct RelayCodec {
    max_payload_size: usize,
}

impl Default for RelayCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_SIZE)
    }
}

impl RelayCodec {
    /// Create a codec that refuses payloads above `max_payload_size` bytes.
    #[must_use]
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    /// Get the configured payload limit.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Validate and wrap an inbound payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large or not JSON.
    pub fn envelope(&self, text: &str) -> Result<String, ProtocolError> {
        if text.len() > self.max_payload_size {
            return Err(ProtocolError::TooLarge {
                size: text.len(),
                max: self.max_payload_size,
            });
        }
        relay_envelope(text)
    }
}
