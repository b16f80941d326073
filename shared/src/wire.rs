//! Bridge wire protocol frames
//!
//! Frames travel over the bridge connection as length-prefixed JSON (see
//! [`crate::codec`]). Payload bytes are base64-encoded so arbitrary
//! content survives the JSON encoding.

use serde::{Deserialize, Serialize};

/// Delivery quality for publishes and subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

/// Message the broker publishes on the client's behalf if the connection
/// is lost without a clean shutdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastWill {
    pub topic: String,
    #[serde(with = "b64")]
    pub payload: Vec<u8>,
    pub retain: bool,
}

/// A single frame on the bridge connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Client hello carrying identity, credentials, and the last will
    Connect {
        client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        will: Option<LastWill>,
    },
    /// Register interest in a topic
    Subscribe { topic: String, qos: Qos },
    /// Outbound publish from the client
    Publish {
        topic: String,
        #[serde(with = "b64")]
        payload: Vec<u8>,
        qos: Qos,
        retain: bool,
    },
    /// Inbound delivery for a subscribed topic
    Message {
        topic: String,
        #[serde(with = "b64")]
        payload: Vec<u8>,
    },
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
