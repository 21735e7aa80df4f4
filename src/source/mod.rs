//! Swappable data sources for dashboard widgets.
//!
//! `DataSource` is the seam: production wires `LiveStreamSource`
//! (backed by the reconnecting stream client), demos wire
//! `SimulatedSource` (timer-driven jittered updates). Consumers cannot
//! tell them apart.

use crate::stream::{ConnectionStatus, LiveStreamClient};
use crate::types::StreamMessage;
use async_trait::async_trait;
use log::{debug, info};
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;

#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Channel of messages for the topic. Registering is idempotent.
    async fn subscribe(&self, topic: &str) -> broadcast::Receiver<StreamMessage>;

    async fn status(&self) -> ConnectionStatus;
}

/// Production source: delegates to a shared `LiveStreamClient`.
pub struct LiveStreamSource {
    client: Arc<LiveStreamClient>,
}

impl LiveStreamSource {
    pub fn new(client: Arc<LiveStreamClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DataSource for LiveStreamSource {
    fn name(&self) -> &str {
        "live-stream"
    }

    async fn subscribe(&self, topic: &str) -> broadcast::Receiver<StreamMessage> {
        self.client.subscribe(topic).await
    }

    async fn status(&self) -> ConnectionStatus {
        self.client.status().await
    }
}

/// Knobs for the simulated feed.
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    pub tick_interval: Duration,
    /// Relative jitter applied to the baseline value each tick
    pub jitter: f64,
    pub baseline: f64,
    pub channel_size: usize,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            jitter: 0.05,
            baseline: 100.0,
            channel_size: 256,
        }
    }
}

/// Demo source: emits jittered values on a timer for every subscribed
/// topic. Always reports `Connected`; there is nothing to lose.
pub struct SimulatedSource {
    config: SimulatedConfig,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<StreamMessage>>>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedSource {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            config,
            topics: Arc::new(RwLock::new(HashMap::new())),
            handle: None,
        }
    }

    /// Start the tick loop. Each tick publishes one message per
    /// registered topic.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        info!(
            "Starting simulated data source (tick every {:?})",
            self.config.tick_interval
        );
        let topics = Arc::clone(&self.topics);
        let config = self.config.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = interval(config.tick_interval);
            let mut sequence: u64 = 0;
            loop {
                ticker.tick().await;
                sequence += 1;
                let topics = topics.read().await;
                for (topic, tx) in topics.iter() {
                    let swing = rand::thread_rng().gen_range(-config.jitter..=config.jitter);
                    let value = config.baseline * (1.0 + swing);
                    let message = StreamMessage::new(
                        topic.clone(),
                        json!({ "value": value, "sequence": sequence }),
                    );
                    if tx.send(message).is_err() {
                        debug!("Simulated topic {} has no subscribers", topic);
                    }
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Simulated data source stopped");
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl DataSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn subscribe(&self, topic: &str) -> broadcast::Receiver<StreamMessage> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.config.channel_size).0)
            .subscribe()
    }

    async fn status(&self) -> ConnectionStatus {
        ConnectionStatus::Connected
    }
}
