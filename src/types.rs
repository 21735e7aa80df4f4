//! Wire shapes shared by the fetcher, the stream client, and the
//! bundled fallback catalog. Payload contents stay opaque
//! (`serde_json::Value`); only the envelope fields are typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Inbound push message envelope. The `type` field doubles as the topic
/// used for subscriber dispatch; everything else rides along in
/// `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl StreamMessage {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }
}

/// Auth payload sent as the first frame after a connection opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub session_id: Uuid,
    pub platform: String,
    pub timestamp: i64,
}

/// Per-topic subscribe frame sent after auth, and again after every
/// reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeFrame {
    #[serde(rename = "type")]
    pub kind: String,
    pub stream: String,
    pub session_id: Uuid,
    pub timestamp: i64,
}

impl SubscribeFrame {
    pub fn new(stream: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            kind: "subscribe".to_string(),
            stream: stream.into(),
            session_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Team record used by the bundled fallback catalog and the tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub code: String,
}
