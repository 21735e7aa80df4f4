//! Reconnecting live stream client.
//!
//! Maintains one WebSocket connection to the push feed, re-sending the
//! auth/subscribe handshake and flushing buffered outbound messages on
//! every reconnect. Inbound JSON messages are dispatched by their
//! `type` field to per-topic broadcast channels; malformed frames are
//! logged and dropped without touching connection health. Delivery is
//! FIFO within a connection and at-most-once across reconnects.

pub mod session;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::types::{StreamMessage, SubscribeFrame};
use futures_util::{SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use session::StreamSession;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};
use uuid::Uuid;

const DEFAULT_RECONNECT_BASE_MS: u64 = 2_000;
const DEFAULT_RECONNECT_CAP_EXPONENT: u32 = 5;
const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 60_000;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 12;
const OUTBOUND_CHANNEL_SIZE: usize = 64;

/// Connection lifecycle as observed by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Lifecycle notifications delivered on the event channel.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected { session_id: Uuid },
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    /// Terminal: the reconnect budget is spent. Fires exactly once.
    ReconnectExhausted { attempts: u32 },
}

/// Stream client counters.
#[derive(Debug, Clone, Default)]
pub struct StreamMetrics {
    pub messages_received: u64,
    pub messages_dispatched: u64,
    pub parse_failures: u64,
    pub reconnects: u32,
    pub last_message_timestamp: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub platform: String,
    pub reconnect_base_delay: Duration,
    pub reconnect_cap_exponent: u32,
    pub reconnect_max_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub pending_outbound_cap: usize,
    pub channel_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            platform: "web".to_string(),
            reconnect_base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
            reconnect_cap_exponent: DEFAULT_RECONNECT_CAP_EXPONENT,
            reconnect_max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_DELAY_MS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            pending_outbound_cap: 64,
            channel_size: 256,
        }
    }
}

impl StreamConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.ws_url.clone(),
            platform: config.platform.clone(),
            reconnect_base_delay: Duration::from_millis(config.ws_reconnect_base_delay_ms),
            reconnect_cap_exponent: config.ws_reconnect_cap_exponent,
            reconnect_max_delay: Duration::from_millis(config.ws_reconnect_max_delay_ms),
            max_reconnect_attempts: config.ws_max_reconnect_attempts,
            pending_outbound_cap: config.pending_outbound_cap,
            channel_size: config.stream_channel_size,
        }
    }
}

/// Backoff before reconnect attempt `attempt` (0-based):
/// `min(max_delay, base × 2^min(attempt, cap_exponent))`.
pub fn reconnect_delay(
    attempt: u32,
    base: Duration,
    cap_exponent: u32,
    max_delay: Duration,
) -> Duration {
    let exponent = attempt.min(cap_exponent);
    let delay_ms = base.as_millis().saturating_mul(1u128 << exponent);
    Duration::from_millis(delay_ms.min(max_delay.as_millis()) as u64)
}

enum ConnectionExit {
    Shutdown,
    Dropped,
}

/// Shared handles threaded through the supervisor and read loop.
#[derive(Clone)]
struct StreamShared {
    config: StreamConfig,
    session: Arc<Mutex<StreamSession>>,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<StreamMessage>>>>,
    events_tx: broadcast::Sender<StreamEvent>,
    status: Arc<RwLock<ConnectionStatus>>,
    metrics: Arc<RwLock<StreamMetrics>>,
    sink: Arc<RwLock<Option<mpsc::Sender<Message>>>>,
}

impl StreamShared {
    async fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().await = status;
    }

    fn emit(&self, event: StreamEvent) {
        // Nobody listening is fine; events are advisory
        let _ = self.events_tx.send(event);
    }
}

/// Reconnecting push-channel client. Owns the session exclusively;
/// subscribers hold only broadcast receivers.
pub struct LiveStreamClient {
    shared: StreamShared,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handle: Option<JoinHandle<()>>,
}

impl LiveStreamClient {
    pub fn new(config: StreamConfig) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = StreamSession::new(config.pending_outbound_cap);
        Self {
            shared: StreamShared {
                config,
                session: Arc::new(Mutex::new(session)),
                topics: Arc::new(RwLock::new(HashMap::new())),
                events_tx,
                status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
                metrics: Arc::new(RwLock::new(StreamMetrics::default())),
                sink: Arc::new(RwLock::new(None)),
            },
            shutdown_tx,
            shutdown_rx,
            handle: None,
        }
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.shared.status.read().await.clone()
    }

    pub async fn metrics(&self) -> StreamMetrics {
        self.shared.metrics.read().await.clone()
    }

    /// Lifecycle event channel (connected, reconnecting, terminal).
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Register interest in a topic and get its message channel. When
    /// already connected, the subscribe frame goes out immediately;
    /// otherwise it rides the next handshake.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<StreamMessage> {
        let receiver = {
            let mut topics = self.shared.topics.write().await;
            let channel_size = self.shared.config.channel_size;
            topics
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(channel_size).0)
                .subscribe()
        };

        let frame = {
            let mut session = self.shared.session.lock().await;
            if session.add_subscription(topic) {
                Some(SubscribeFrame::new(topic, session.session_id()))
            } else {
                None
            }
        };

        if let Some(frame) = frame {
            if let Some(tx) = self.shared.sink.read().await.clone() {
                let text = serde_json::to_string(&frame).unwrap_or_default();
                if tx.send(Message::Text(text)).await.is_err() {
                    debug!("Subscribe frame for {} deferred to next handshake", topic);
                }
            }
        }

        receiver
    }

    /// Send a message upstream. Connected: immediate. Disconnected:
    /// buffered in the bounded pending queue and flushed on reconnect.
    pub async fn send(&self, payload: serde_json::Value) {
        let text = payload.to_string();
        let maybe_sink = self.shared.sink.read().await.clone();
        match maybe_sink {
            Some(tx) => {
                if tx.send(Message::Text(text.clone())).await.is_err() {
                    // Connection is going down underneath us
                    self.shared.session.lock().await.enqueue_outbound(text);
                }
            }
            None => {
                self.shared.session.lock().await.enqueue_outbound(text);
            }
        }
    }

    /// Open the connection and start the supervising reconnect loop.
    /// Registers the given topics before the first handshake.
    pub async fn connect(&mut self, topics: &[&str]) -> Result<()> {
        if self.handle.is_some() {
            return Err(SyncError::StreamError(
                "stream client already connected".to_string(),
            ));
        }
        if self.shared.config.url.is_empty() {
            return Err(SyncError::Config("stream URL is empty".to_string()));
        }

        for topic in topics {
            let _ = self.subscribe(topic).await;
        }

        // A previous disconnect() leaves the flag set; clear it
        let _ = self.shutdown_tx.send(false);

        let shared = self.shared.clone();
        let shutdown_rx = self.shutdown_rx.clone();
        self.handle = Some(tokio::spawn(async move {
            supervisor(shared, shutdown_rx).await;
        }));
        Ok(())
    }

    /// Close with a normal-closure code, suppress auto-reconnect, and
    /// cancel any pending reconnect timer immediately.
    pub async fn disconnect(&mut self) {
        info!("Disconnecting live stream client");
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.shared.set_status(ConnectionStatus::Disconnected).await;
    }
}

async fn supervisor(shared: StreamShared, mut shutdown_rx: watch::Receiver<bool>) {
    // Mark the current flag value seen so stale writes don't wake us
    {
        let _ = shutdown_rx.borrow_and_update();
    }
    let mut ever_connected = false;

    loop {
        if *shutdown_rx.borrow() {
            shared.set_status(ConnectionStatus::Disconnected).await;
            break;
        }

        shared
            .set_status(if ever_connected {
                ConnectionStatus::Reconnecting
            } else {
                ConnectionStatus::Connecting
            })
            .await;

        let session_id = shared.session.lock().await.begin_attempt();
        debug!(
            "Connecting to {} (session {})",
            shared.config.url, session_id
        );

        match connect_async(shared.config.url.as_str()).await {
            Ok((ws_stream, _)) => {
                shared.session.lock().await.record_connected();
                if ever_connected {
                    shared.metrics.write().await.reconnects += 1;
                }
                ever_connected = true;
                shared.set_status(ConnectionStatus::Connected).await;
                shared.emit(StreamEvent::Connected { session_id });
                info!("🌐 Live stream connected (session {})", session_id);

                match run_connection(ws_stream, &shared, &mut shutdown_rx).await {
                    ConnectionExit::Shutdown => {
                        shared.set_status(ConnectionStatus::Disconnected).await;
                        info!("Live stream closed normally");
                        break;
                    }
                    ConnectionExit::Dropped => {
                        warn!("Live stream connection dropped");
                        shared.emit(StreamEvent::Disconnected);
                    }
                }
            }
            Err(e) => {
                warn!("Live stream connect failed: {}", e);
            }
        }

        if *shutdown_rx.borrow() {
            shared.set_status(ConnectionStatus::Disconnected).await;
            break;
        }

        let attempts = shared.session.lock().await.record_failed_attempt();
        if attempts > shared.config.max_reconnect_attempts {
            error!(
                "Live stream reconnect budget spent after {} attempts",
                attempts - 1
            );
            shared.emit(StreamEvent::ReconnectExhausted {
                attempts: attempts - 1,
            });
            shared.set_status(ConnectionStatus::Failed).await;
            break;
        }

        let delay = reconnect_delay(
            attempts - 1,
            shared.config.reconnect_base_delay,
            shared.config.reconnect_cap_exponent,
            shared.config.reconnect_max_delay,
        );
        shared.set_status(ConnectionStatus::Reconnecting).await;
        shared.emit(StreamEvent::Reconnecting {
            attempt: attempts,
            delay,
        });
        debug!("Reconnect attempt {} in {:?}", attempts, delay);

        tokio::select! {
            _ = sleep(delay) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    shared.set_status(ConnectionStatus::Disconnected).await;
                    break;
                }
            }
        }
    }
}

/// Run one established connection to completion, then tear down the
/// writer task and clear the shared sink.
async fn run_connection(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    shared: &StreamShared,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnectionExit {
    let (mut write, mut read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_SIZE);
    *shared.sink.write().await = Some(out_tx.clone());

    // Forward queued frames to the socket sink
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if write.send(msg).await.is_err() {
                warn!("Live stream write error, closing connection");
                break;
            }
        }
    });

    let exit = drive_connection(&out_tx, &mut read, shared, shutdown_rx).await;

    // Clearing the sink closes the channel once in-flight clones drop,
    // which ends the writer task
    *shared.sink.write().await = None;
    drop(out_tx);
    let _ = writer.await;
    exit
}

/// Handshake plus the read/dispatch loop for one connection.
async fn drive_connection<S>(
    out_tx: &mpsc::Sender<Message>,
    read: &mut S,
    shared: &StreamShared,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> ConnectionExit
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    // Handshake: auth, subscriptions, then the pending backlog
    let (frames, pending) = {
        let mut session = shared.session.lock().await;
        let mut frames = vec![session.auth_frame(&shared.config.platform)];
        frames.extend(session.subscribe_frames());
        (frames, session.drain_pending())
    };
    for frame in frames {
        if out_tx.send(Message::Text(frame.to_string())).await.is_err() {
            return ConnectionExit::Dropped;
        }
    }
    if !pending.is_empty() {
        info!("Flushing {} buffered outbound messages", pending.len());
        for text in pending {
            if out_tx.send(Message::Text(text)).await.is_err() {
                return ConnectionExit::Dropped;
            }
        }
    }

    loop {
        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    dispatch_message(&text, shared).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = out_tx.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return ConnectionExit::Dropped;
                }
                Some(Ok(_)) => {} // binary/pong frames aren't part of the protocol
                Some(Err(e)) => {
                    warn!("Live stream read error: {}", e);
                    return ConnectionExit::Dropped;
                }
            },
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let close = Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    }));
                    let _ = out_tx.send(close).await;
                    return ConnectionExit::Shutdown;
                }
            }
        }
    }
}

/// Parse one inbound frame and fan it out to the topic's subscribers.
/// Parse failures are counted and dropped, never fatal.
async fn dispatch_message(text: &str, shared: &StreamShared) {
    {
        let mut metrics = shared.metrics.write().await;
        metrics.messages_received += 1;
        metrics.last_message_timestamp = Some(chrono::Utc::now().timestamp_millis());
    }

    match serde_json::from_str::<StreamMessage>(text) {
        Ok(message) => {
            let topics = shared.topics.read().await;
            match topics.get(&message.topic) {
                Some(tx) => {
                    if tx.send(message).is_ok() {
                        shared.metrics.write().await.messages_dispatched += 1;
                    } else {
                        debug!("No live subscribers for dispatched topic");
                    }
                }
                None => {
                    debug!("Message for unsubscribed topic dropped");
                }
            }
        }
        Err(e) => {
            shared.metrics.write().await.parse_failures += 1;
            warn!(
                "{}",
                SyncError::MalformedMessage(format!("dropping unparseable frame: {}", e))
            );
        }
    }
}
