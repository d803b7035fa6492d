//! Wire frames for the JSON-over-WebSocket broker protocol.
//!
//! Frames are tagged with a `type` field. QoS travels as its numeric code;
//! conversion to [`crate::QoS`](crate::message::QoS) happens at the client
//! boundary so the rest of the tool never sees raw codes.

use serde::{Deserialize, Serialize};

/// Frames sent by this client to the broker.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String, qos: u8 },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        payload: String,
        message_id: Option<String>,
        qos: Option<u8>,
        retain: Option<bool>,
    },
}

/// Frames delivered by the broker.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "message")]
    Message {
        topic: String,
        payload: String,
        timestamp: i64,
        message_id: String,
        qos: u8,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
