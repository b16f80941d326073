//! Request and response envelopes for the RPC channel
//!
//! Envelopes travel as JSON objects. Decoding is forward-compatible:
//! unknown fields are ignored so older agents keep working when callers
//! start sending more metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while decoding an inbound request
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload was not a well-formed JSON object of the expected shape
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A required field was absent from an otherwise readable payload.
    /// Carries whatever correlation metadata could be salvaged so the
    /// failure response can still be routed.
    #[error("missing required field `{field}`")]
    MissingField {
        field: &'static str,
        corr: Option<String>,
        reply_to: Option<String>,
    },
}

impl DecodeError {
    /// Correlation id salvaged from the partial envelope, if any
    pub fn corr(&self) -> Option<&str> {
        match self {
            DecodeError::MissingField { corr, .. } => corr.as_deref(),
            DecodeError::MalformedPayload(_) => None,
        }
    }

    /// Reply destination salvaged from the partial envelope, if any
    pub fn reply_to(&self) -> Option<&str> {
        match self {
            DecodeError::MissingField { reply_to, .. } => reply_to.as_deref(),
            DecodeError::MalformedPayload(_) => None,
        }
    }
}

/// An inbound RPC request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Opaque correlation id; generated by the agent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corr: Option<String>,
    /// Command name resolved against the registry
    pub cmd: String,
    /// Command arguments keyed by name
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Destination for the response; the agent derives a default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

/// The correlated answer to a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corr: Option<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Create a successful response carrying the handler's result
    pub fn success(corr: impl Into<String>, data: Value) -> Self {
        Self {
            corr: Some(corr.into()),
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create a failure response carrying a human-readable description
    pub fn failure(corr: Option<String>, error: impl Into<String>) -> Self {
        Self {
            corr,
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Retained heartbeat payload published on the heartbeat topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Seconds since Unix epoch
    pub ts: u64,
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Decode an inbound request payload.
///
/// Fails with [`DecodeError::MalformedPayload`] when the bytes are not a
/// JSON object, and with [`DecodeError::MissingField`] when `cmd` is
/// absent; the latter salvages `corr` and `reply_to` when present.
pub fn decode_request(bytes: &[u8]) -> Result<RequestEnvelope, DecodeError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::MalformedPayload(e.to_string()))?;

    if !value.is_object() {
        return Err(DecodeError::MalformedPayload(
            "payload is not a JSON object".into(),
        ));
    }

    if value.get("cmd").is_none() {
        return Err(DecodeError::MissingField {
            field: "cmd",
            corr: string_field(&value, "corr"),
            reply_to: string_field(&value, "reply_to"),
        });
    }

    serde_json::from_value(value).map_err(|e| DecodeError::MalformedPayload(e.to_string()))
}

/// Encode a response envelope for publishing
pub fn encode_response(response: &ResponseEnvelope) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(response)
}
