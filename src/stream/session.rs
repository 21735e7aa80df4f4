//! Per-connection session bookkeeping for the live stream client.

use crate::types::{AuthPayload, SubscribeFrame};
use log::debug;
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use uuid::Uuid;

/// Session state owned exclusively by the stream client. A fresh
/// `session_id` is generated for every connection attempt; the
/// reconnect counter resets on success. Outbound messages queued while
/// disconnected live in a bounded drop-oldest buffer.
#[derive(Debug)]
pub struct StreamSession {
    session_id: Uuid,
    subscriptions: BTreeSet<String>,
    reconnect_attempt: u32,
    pending_outbound: VecDeque<String>,
    pending_cap: usize,
    dropped_outbound: u64,
}

impl StreamSession {
    pub fn new(pending_cap: usize) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            subscriptions: BTreeSet::new(),
            reconnect_attempt: 0,
            pending_outbound: VecDeque::new(),
            pending_cap: pending_cap.max(1),
            dropped_outbound: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub fn dropped_outbound(&self) -> u64 {
        self.dropped_outbound
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.iter().map(String::as_str)
    }

    /// Returns true if the topic was newly added.
    pub fn add_subscription(&mut self, topic: &str) -> bool {
        self.subscriptions.insert(topic.to_string())
    }

    /// Rotate the session id for a new connection attempt.
    pub fn begin_attempt(&mut self) -> Uuid {
        self.session_id = Uuid::new_v4();
        self.session_id
    }

    pub fn record_connected(&mut self) {
        self.reconnect_attempt = 0;
    }

    /// Count a failed connect (or a dropped connection). Returns the
    /// updated attempt count.
    pub fn record_failed_attempt(&mut self) -> u32 {
        self.reconnect_attempt += 1;
        self.reconnect_attempt
    }

    /// Buffer an outbound message while disconnected; past the cap the
    /// oldest queued message is dropped.
    pub fn enqueue_outbound(&mut self, message: String) {
        if self.pending_outbound.len() >= self.pending_cap {
            self.pending_outbound.pop_front();
            self.dropped_outbound += 1;
            debug!(
                "Pending outbound queue full ({}), dropped oldest message",
                self.pending_cap
            );
        }
        self.pending_outbound.push_back(message);
    }

    pub fn pending_len(&self) -> usize {
        self.pending_outbound.len()
    }

    /// Drain the buffer for the flush-on-reconnect routine, oldest
    /// first.
    pub fn drain_pending(&mut self) -> Vec<String> {
        self.pending_outbound.drain(..).collect()
    }

    /// The auth frame sent first after a connection opens.
    pub fn auth_frame(&self, platform: &str) -> Value {
        let payload = AuthPayload {
            session_id: self.session_id,
            platform: platform.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        serde_json::to_value(payload).unwrap_or(Value::Null)
    }

    /// One subscribe frame per topic, sent after auth and re-sent after
    /// every reconnect.
    pub fn subscribe_frames(&self) -> Vec<Value> {
        self.subscriptions
            .iter()
            .map(|topic| {
                serde_json::to_value(SubscribeFrame::new(topic.clone(), self.session_id))
                    .unwrap_or(Value::Null)
            })
            .collect()
    }
}
