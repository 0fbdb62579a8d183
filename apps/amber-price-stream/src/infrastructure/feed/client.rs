//! Subscription Client
//!
//! Owns the feed connection lifecycle for one site:
//!
//! - Authenticated connect through a [`FeedConnector`]
//! - One subscribe message per connection
//! - Heartbeat monitoring
//! - Decode and fan-out of every inbound payload
//! - Automatic reconnection with bounded exponential backoff
//!
//! The loop runs as one background task between [`SubscriptionClient::start`]
//! and [`SubscriptionClient::stop`]. Every suspension point is raced against a
//! [`CancellationToken`], so `stop` interrupts a connect, a read or a backoff
//! sleep immediately.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::codec::FeedCodec;
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::messages::SubscribeRequest;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{
    ConnectRequest, FeedConnection, FeedConnector, Frame, TransportError,
};
use crate::domain::payload::PricePayload;
use crate::infrastructure::broadcast::{
    EventBus, ListenerHandle, ListenerRegistry, PriceUpdateEvent,
};
use crate::infrastructure::config::StreamConfig;
use crate::infrastructure::metrics::{self, FrameKind};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connect-and-listen cycle.
///
/// None of them are fatal: the loop logs them and backs off.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Transport failure while connecting, sending or receiving.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No inbound traffic after a ping.
    #[error("heartbeat timeout after {0:?} of silence")]
    HeartbeatTimeout(Duration),

    /// The subscribe message could not be encoded.
    #[error("failed to encode subscribe message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FeedError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(TransportError::InvalidRequest(_)) => "invalid_request",
            Self::Transport(TransportError::Connect(_)) => "connect",
            Self::Transport(TransportError::Send(_)) => "send",
            Self::Transport(TransportError::Receive(_)) => "receive",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::HeartbeatTimeout(_) => "heartbeat_timeout",
            Self::Encode(_) => "encode",
        }
    }
}

/// How a cycle ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// The server closed the connection or the stream ended.
    Closed,
    /// Stop was requested.
    Cancelled,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the subscription client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// Endpoint and authentication.
    pub request: ConnectRequest,
    /// Site to subscribe to.
    pub site_id: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Upper bound on the handshake.
    pub connect_timeout: Duration,
    /// Capacity of the host event channel.
    pub event_capacity: usize,
}

impl FeedClientConfig {
    /// Create a configuration with default timings.
    #[must_use]
    pub fn new(request: ConnectRequest, site_id: impl Into<String>) -> Self {
        Self {
            request,
            site_id: site_id.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            connect_timeout: Duration::from_secs(30),
            event_capacity: 256,
        }
    }

    /// Create configuration from the loaded stream configuration.
    #[must_use]
    pub fn from_stream_config(config: &StreamConfig) -> Self {
        Self {
            request: config.connect_request(),
            site_id: config.credentials.site_id().to_string(),
            reconnect: ReconnectConfig::from_websocket_settings(&config.websocket),
            heartbeat: HeartbeatConfig::from_websocket_settings(&config.websocket),
            connect_timeout: config.websocket.connect_timeout,
            event_capacity: config.websocket.event_capacity,
        }
    }
}

// =============================================================================
// Subscription Client
// =============================================================================

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Client for the live-prices feed of one site.
pub struct SubscriptionClient {
    shared: Arc<ClientShared>,
    running: Mutex<Option<RunningLoop>>,
}

struct ClientShared {
    config: FeedClientConfig,
    connector: Arc<dyn FeedConnector>,
    codec: FeedCodec,
    listeners: ListenerRegistry<Arc<PricePayload>>,
    events: EventBus,
}

impl SubscriptionClient {
    /// Create a client. Nothing connects until [`start`](Self::start).
    #[must_use]
    pub fn new(config: FeedClientConfig, connector: Arc<dyn FeedConnector>) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            shared: Arc::new(ClientShared {
                config,
                connector,
                codec: FeedCodec::new(),
                listeners: ListenerRegistry::new("feed_client"),
                events,
            }),
            running: Mutex::new(None),
        }
    }

    /// Launch the connection loop in the background.
    ///
    /// No-op while a loop is already active. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!(site_id = %self.shared.config.site_id, "Feed client already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self.shared).run(cancel.clone()));
        *running = Some(RunningLoop { cancel, handle });
    }

    /// Stop the loop, close the connection and wait for the task to exit.
    ///
    /// Safe to call when never started or already stopped. Once it returns no
    /// further payloads are delivered.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(RunningLoop { cancel, handle }) = running else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Feed client task ended abnormally");
        }
    }

    /// Whether the background loop is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Register a callback for every decoded payload.
    ///
    /// Callbacks run on the client's task, in no particular order. The handle
    /// removes the registration, also from inside the callback itself.
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&Arc<PricePayload>) + Send + Sync + 'static,
    {
        self.shared.listeners.add(callback)
    }

    /// Number of registered payload listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Receive a [`PriceUpdateEvent`] for every decoded payload.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<PriceUpdateEvent> {
        self.shared.events.subscribe()
    }

    /// The site this client subscribes to.
    #[must_use]
    pub fn site_id(&self) -> &str {
        &self.shared.config.site_id
    }
}

impl Drop for SubscriptionClient {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for SubscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionClient")
            .field("site_id", &self.shared.config.site_id)
            .field("url", &self.shared.config.request.url)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Connection Loop
// =============================================================================

impl ClientShared {
    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());
        tracing::info!(site_id = %self.config.site_id, "Price feed client started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let session_id = Uuid::new_v4();
            let span = tracing::info_span!(
                "feed_session",
                %session_id,
                site_id = %self.config.site_id
            );
            let outcome = self
                .connect_and_listen(&cancel, &mut reconnect_policy)
                .instrument(span)
                .await;
            metrics::set_connected(false);

            match outcome {
                Ok(CycleEnd::Cancelled) => break,
                Ok(CycleEnd::Closed) => {
                    tracing::info!(%session_id, "Price feed connection closed");
                }
                Err(e) => {
                    metrics::record_cycle_failure(e.kind());
                    tracing::warn!(%session_id, error = %e, "Price feed connection error");
                }
            }

            if cancel.is_cancelled() {
                break;
            }

            let delay = reconnect_policy.next_delay();
            metrics::record_reconnect();
            tracing::info!(
                attempt = reconnect_policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to price feed"
            );

            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::debug!("Cancelled during reconnect delay");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(site_id = %self.config.site_id, "Price feed client stopped");
    }

    async fn connect_and_listen(
        &self,
        cancel: &CancellationToken,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<CycleEnd, FeedError> {
        tracing::info!(url = %self.config.request.url, "Connecting to price feed");

        let timeout = self.config.connect_timeout;
        let connect = tokio::time::timeout(timeout, self.connector.connect(&self.config.request));
        let mut connection = tokio::select! {
            biased;

            () = cancel.cancelled() => return Ok(CycleEnd::Cancelled),
            result = connect => match result {
                Ok(connection) => connection?,
                Err(_) => return Err(FeedError::ConnectTimeout(timeout)),
            },
        };

        let outcome = self
            .listen(connection.as_mut(), cancel, reconnect_policy)
            .await;
        connection.close().await;
        outcome
    }

    async fn listen(
        &self,
        connection: &mut dyn FeedConnection,
        cancel: &CancellationToken,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<CycleEnd, FeedError> {
        let subscribe = SubscribeRequest::live_prices(&self.config.site_id).to_json()?;
        connection.send_text(subscribe).await?;

        reconnect_policy.reset();
        metrics::set_connected(true);
        tracing::info!("Subscribed to live prices");

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
        let heartbeat_cancel = cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel,
            )
            .run(),
        );
        let mut heartbeat_open = true;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return Ok(CycleEnd::Cancelled),
                event = heartbeat_rx.recv(), if heartbeat_open => {
                    match event {
                        Some(HeartbeatEvent::SendPing) => {
                            heartbeat_state.mark_ping_sent();
                            connection.send_ping().await?;
                        }
                        Some(HeartbeatEvent::Timeout { silent_for }) => {
                            return Err(FeedError::HeartbeatTimeout(silent_for));
                        }
                        None => {
                            tracing::debug!("Heartbeat channel closed");
                            heartbeat_open = false;
                        }
                    }
                }
                frame = connection.next_frame() => {
                    match frame {
                        Some(Ok(Frame::Text(text))) => {
                            heartbeat_state.record_activity();
                            metrics::record_frame(FrameKind::Text);
                            self.decode_and_dispatch(&text);
                        }
                        Some(Ok(Frame::Binary(data))) => {
                            heartbeat_state.record_activity();
                            metrics::record_frame(FrameKind::Binary);
                            tracing::trace!(len = data.len(), "Ignoring binary frame");
                        }
                        Some(Ok(Frame::Ping | Frame::Pong)) => {
                            heartbeat_state.record_activity();
                            metrics::record_frame(FrameKind::Control);
                        }
                        Some(Ok(Frame::Close(reason))) => {
                            metrics::record_frame(FrameKind::Close);
                            tracing::info!(
                                reason = reason.as_deref().unwrap_or_default(),
                                "Server sent close frame"
                            );
                            return Ok(CycleEnd::Closed);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("Price feed stream ended");
                            return Ok(CycleEnd::Closed);
                        }
                    }
                }
            }
        }
    }

    /// Decode one text frame and fan it out. Undecodable frames are dropped.
    fn decode_and_dispatch(&self, text: &str) {
        let payload = match self.codec.decode(text) {
            Ok(payload) => Arc::new(payload),
            Err(e) => {
                metrics::record_decode_failure();
                tracing::debug!(error = %e, len = text.len(), "Dropping undecodable frame");
                return;
            }
        };

        self.events.publish(PriceUpdateEvent {
            site_id: self.config.site_id.clone(),
            payload: Arc::clone(&payload),
        });

        let panicked = self.listeners.dispatch(&payload);
        metrics::record_payload_dispatched();
        tracing::debug!(
            listeners = self.listeners.len(),
            panicked,
            "Dispatched price payload"
        );
    }
}
