//! Feed Client
//!
//! Owns the WebSocket session to the feed: connects with the current session
//! credential, replays subscriptions on every open, keeps the session alive
//! with heartbeats, and reconnects after any transport failure until shut
//! down.
//!
//! # Pipeline
//!
//! ```text
//! socket -> FeedProtocol::decode -> QuoteBook::merge -> Dispatcher -> callbacks
//! ```
//!
//! # States
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> ...
//!        \____________\______________\______> Closed (shutdown)
//! ```
//!
//! All writes (handshake, subscriptions, heartbeats, pongs) go through one
//! sink lock. Callers that send while disconnected wait for the next open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, DecodedFrame, RawFrame};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::protocol::{FeedProtocol, ProtocolError, ProtocolKind};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{FeedCallbacks, SessionError, SessionProvider};
use crate::application::services::{DEFAULT_MESSAGE_LOG_CAPACITY, Dispatcher};
use crate::domain::instrument::{Instrument, InstrumentKey};
use crate::domain::quote::{DepthSnapshot, MarketDepth, QuoteBook, TickSnapshot};
use crate::domain::streaming::{ConnectionState, ExchangeNotice, FeedEvent, FeedMode, MarketStatus};
use crate::domain::subscription::{
    SegmentTopic, Subscription, SubscriptionChanges, SubscriptionRegistry,
};
use crate::infrastructure::metrics::{self, DropReason};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Default interval at which blocked senders re-check the connection.
pub const DEFAULT_SEND_POLL_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Session credential could not be obtained.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Request could not be encoded for the active protocol.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Subscribe or unsubscribe called without instruments.
    #[error("instrument list is empty")]
    EmptyInstrumentList,

    /// Client has been shut down.
    #[error("feed client is closed")]
    Closed,

    /// Server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// No inbound frame within the idle timeout.
    #[error("feed idle timeout")]
    HeartbeatTimeout,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL template (`{token}` is replaced by the session id).
    pub url: String,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Interval at which blocked senders re-check the connection.
    pub send_poll_interval: Duration,
    /// Entries kept in each segment message log.
    pub message_log_capacity: usize,
}

impl FeedClientConfig {
    /// Default configuration for a protocol.
    #[must_use]
    pub fn for_protocol(kind: ProtocolKind) -> Self {
        Self {
            url: kind.default_url().to_string(),
            heartbeat: HeartbeatConfig::new(kind.default_heartbeat_interval(), None),
            reconnect: ReconnectConfig::default(),
            send_poll_interval: DEFAULT_SEND_POLL_INTERVAL,
            message_log_capacity: DEFAULT_MESSAGE_LOG_CAPACITY,
        }
    }

    /// Override the endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Connection manager for the market data feed.
///
/// Quotes and subscriptions outlive individual connections: a reconnect
/// replays the registry and keeps merging into the same quote book.
pub struct FeedClient {
    config: FeedClientConfig,
    protocol: FeedProtocol,
    session: Arc<dyn SessionProvider>,
    quotes: QuoteBook,
    registry: SubscriptionRegistry,
    dispatcher: Dispatcher,
    sink: Mutex<Option<WsSink>>,
    state: RwLock<ConnectionState>,
    cancel: CancellationToken,
    /// Cancelled when the current connection must be torn down.
    link: parking_lot::Mutex<CancellationToken>,
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        protocol: FeedProtocol,
        session: Arc<dyn SessionProvider>,
        callbacks: FeedCallbacks,
        cancel: CancellationToken,
    ) -> Self {
        let dispatcher = Dispatcher::new(callbacks, config.message_log_capacity);
        Self {
            config,
            protocol,
            session,
            quotes: QuoteBook::new(),
            registry: SubscriptionRegistry::new(),
            dispatcher,
            sink: Mutex::new(None),
            state: RwLock::new(ConnectionState::Disconnected),
            link: parking_lot::Mutex::new(cancel.child_token()),
            cancel,
        }
    }

    /// Spawn the connection loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<Result<(), FeedClientError>> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Stop the connection loop and fail pending sends.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down feed client");
        self.cancel.cancel();
        *self.state.write() = ConnectionState::Closed;
    }

    /// Run the connection loop until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`FeedClientError::MaxReconnectAttemptsExceeded`] when a
    /// bounded reconnect policy runs out of attempts.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let result = self.connect_and_run(&mut policy).await;
            let was_connected = self.state() == ConnectionState::Connected;
            self.sink.lock().await.take();
            self.set_state(ConnectionState::Disconnected);
            metrics::set_connected(false);

            let Err(error) = result else {
                break;
            };

            tracing::warn!(error = %error, "Feed connection lost");
            if was_connected {
                self.dispatcher.notify_disconnect();
            }
            self.dispatcher.notify_error(&error);

            let Some(delay) = policy.next_delay() else {
                self.set_state(ConnectionState::Closed);
                return Err(FeedClientError::MaxReconnectAttemptsExceeded);
            };
            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to feed"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Closed);
        tracing::info!("Feed client stopped");
        Ok(())
    }

    /// Connect, replay subscriptions, and pump frames until the connection
    /// fails (`Err`) or the client is shut down (`Ok`).
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedClientError> {
        self.set_state(ConnectionState::Connecting);
        let credentials = self.session.credentials().await?;
        let url = self.protocol.connect_url(&self.config.url, &credentials);

        tracing::info!(protocol = %self.protocol.kind(), "Connecting to feed");
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(url.as_str()) => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        // Handshake and replay happen before the sink is shared, so caller
        // requests queue behind them.
        if let Some(handshake) = self.protocol.handshake(&credentials)? {
            write.send(Message::Text(handshake.into())).await?;
        }
        self.replay_subscriptions(&mut write).await?;

        // Torn down on exit, or early by a sender whose write failed.
        let link = self.cancel.child_token();
        let _link_guard = link.clone().drop_guard();
        *self.link.lock() = link.clone();
        *self.sink.lock().await = Some(write);

        self.set_state(ConnectionState::Connected);
        policy.reset();
        metrics::set_connected(true);
        tracing::info!(subscriptions = self.registry.len(), "Feed connected");
        self.dispatcher.notify_connect();

        let heartbeat_state = Arc::new(HeartbeatState::new());
        let (heartbeat_tx, mut heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(4);
        tokio::spawn(
            HeartbeatManager::new(
                self.config.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                link.clone(),
            )
            .run(),
        );
        let mut heartbeat_active = true;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    if let Some(mut sink) = self.sink.lock().await.take()
                        && let Err(e) = sink.close().await
                    {
                        tracing::debug!(error = %e, "Error closing feed socket");
                    }
                    return Ok(());
                }
                () = link.cancelled() => {
                    return Err(FeedClientError::ConnectionClosed);
                }
                event = heartbeat_rx.recv(), if heartbeat_active => {
                    match event {
                        Some(HeartbeatEvent::SendHeartbeat) => {
                            self.send_heartbeat(&heartbeat_state).await;
                        }
                        Some(HeartbeatEvent::IdleTimeout) => {
                            return Err(FeedClientError::HeartbeatTimeout);
                        }
                        None => heartbeat_active = false,
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat_state.record_activity();
                            self.handle_frame(RawFrame::Text(text.as_str()));
                        }
                        Some(Ok(Message::Binary(data))) => {
                            heartbeat_state.record_activity();
                            self.handle_frame(RawFrame::Binary(&data));
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat_state.record_activity();
                            self.write(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            heartbeat_state.record_activity();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    async fn replay_subscriptions(&self, write: &mut WsSink) -> Result<(), FeedClientError> {
        for (mode, instruments) in self.registry.group_by_mode() {
            match self.protocol.subscribe(&instruments, mode) {
                Ok(request) => {
                    write.send(Message::Text(request.into())).await?;
                    tracing::debug!(%mode, count = instruments.len(), "Replayed subscriptions");
                }
                Err(e) => tracing::warn!(error = %e, %mode, "Cannot replay subscriptions"),
            }
        }
        for topic in self.registry.topics() {
            match self.protocol.subscribe_topic(topic) {
                Ok(request) => write.send(Message::Text(request.into())).await?,
                Err(e) => tracing::warn!(error = %e, ?topic, "Cannot replay topic"),
            }
        }
        Ok(())
    }

    async fn send_heartbeat(&self, heartbeat_state: &HeartbeatState) {
        let result = match self.protocol.heartbeat() {
            Ok(payload) => self.write(Message::Text(payload.into())).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(()) => {
                heartbeat_state.record_heartbeat_sent();
                tracing::trace!("Heartbeat sent");
            }
            Err(e) => tracing::warn!(error = %e, "Failed to send heartbeat"),
        }
    }

    /// Write to the current connection without waiting.
    async fn write(&self, message: Message) -> Result<(), FeedClientError> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(FeedClientError::ConnectionClosed)?;
        sink.send(message).await?;
        Ok(())
    }

    /// Write once connected, waiting through reconnects.
    async fn send(&self, payload: String) -> Result<(), FeedClientError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(FeedClientError::Closed);
            }
            if self.state() == ConnectionState::Connected {
                let mut guard = self.sink.lock().await;
                if let Some(sink) = guard.as_mut() {
                    match sink.send(Message::Text(payload.clone().into())).await {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            // The socket is dead; wait for the next open.
                            guard.take();
                            drop(guard);
                            self.link.lock().cancel();
                            let error = FeedClientError::from(e);
                            tracing::warn!(error = %error, "Send failed, waiting for reconnect");
                            self.dispatcher.notify_error(&error);
                        }
                    }
                }
            }
            tokio::select! {
                () = self.cancel.cancelled() => return Err(FeedClientError::Closed),
                () = tokio::time::sleep(self.config.send_poll_interval) => {}
            }
        }
    }

    fn handle_frame(&self, frame: RawFrame<'_>) {
        let started = Instant::now();
        match self.protocol.decode(frame) {
            Ok(decoded) => {
                metrics::record_frame(decoded.category());
                if let Some(event) = self.apply(decoded) {
                    self.dispatcher.dispatch(&event);
                }
                metrics::record_processing_duration(started.elapsed());
            }
            Err(e) => {
                let reason = drop_reason(&e);
                metrics::record_frame_dropped(reason);
                tracing::warn!(error = %e, reason = reason.as_str(), "Dropping feed frame");
                self.dispatcher.notify_error(&e);
            }
        }
    }

    fn apply(&self, decoded: DecodedFrame) -> Option<FeedEvent> {
        match decoded {
            DecodedFrame::ConnectionAck => {
                tracing::debug!("Feed session acknowledged");
                None
            }
            DecodedFrame::Heartbeat => None,
            DecodedFrame::Quote {
                category,
                instrument,
                update,
            } => {
                tracing::trace!(%instrument, ?category, "Merging quote update");
                Some(self.quotes.merge(&instrument, category, &update))
            }
            DecodedFrame::MarketStatus(status) => Some(FeedEvent::MarketStatus(status)),
            DecodedFrame::ExchangeMessage(notice) => Some(FeedEvent::ExchangeMessage(notice)),
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != ConnectionState::Closed {
            *state = next;
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe instruments in one mode.
    ///
    /// The request is validated before the registry changes; the registry is
    /// updated before the request is sent, so an open that happens while
    /// waiting replays it.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty list, a mode or exchange the protocol
    /// does not support, a closed client, or a failed write.
    pub async fn subscribe(
        &self,
        instruments: &[Arc<Instrument>],
        mode: FeedMode,
    ) -> Result<SubscriptionChanges, FeedClientError> {
        if instruments.is_empty() {
            return Err(FeedClientError::EmptyInstrumentList);
        }
        let request = self.protocol.subscribe(instruments, mode)?;
        let changes = self.registry.add_all(instruments, mode);
        metrics::set_subscriptions(self.registry.len());
        tracing::info!(
            %mode,
            added = changes.added.len(),
            mode_changed = changes.mode_changed.len(),
            "Subscribing"
        );
        self.send(request).await?;
        Ok(changes)
    }

    /// Unsubscribe instruments, whatever mode they were subscribed with.
    ///
    /// Instruments that are not subscribed are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty list, a closed client, or a failed
    /// write.
    pub async fn unsubscribe(
        &self,
        instruments: &[Arc<Instrument>],
    ) -> Result<Vec<Subscription>, FeedClientError> {
        if instruments.is_empty() {
            return Err(FeedClientError::EmptyInstrumentList);
        }
        let removed = self.registry.remove_all(instruments);
        metrics::set_subscriptions(self.registry.len());
        if removed.is_empty() {
            return Ok(removed);
        }

        for (mode, group) in SubscriptionRegistry::group(&removed) {
            let request = self.protocol.unsubscribe(&group, mode)?;
            tracing::info!(%mode, count = group.len(), "Unsubscribing");
            self.send(request).await?;
        }
        Ok(removed)
    }

    /// Subscribe to market status messages.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotSupported`] on the JSON feed, or a send
    /// error.
    pub async fn subscribe_market_status(&self) -> Result<(), FeedClientError> {
        self.subscribe_topic(SegmentTopic::MarketStatus).await
    }

    /// Subscribe to exchange messages.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotSupported`] on the JSON feed, or a send
    /// error.
    pub async fn subscribe_exchange_messages(&self) -> Result<(), FeedClientError> {
        self.subscribe_topic(SegmentTopic::ExchangeMessages).await
    }

    async fn subscribe_topic(&self, topic: SegmentTopic) -> Result<(), FeedClientError> {
        let request = self.protocol.subscribe_topic(topic)?;
        self.registry.add_topic(topic);
        self.send(request).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.registry.list()
    }

    /// Latest tick view of an instrument.
    #[must_use]
    pub fn tick(&self, key: &InstrumentKey) -> Option<TickSnapshot> {
        self.quotes.tick(key)
    }

    /// Latest depth view of an instrument.
    #[must_use]
    pub fn depth(&self, key: &InstrumentKey) -> Option<DepthSnapshot> {
        self.quotes.depth(key)
    }

    /// Latest tick and depth views of an instrument.
    #[must_use]
    pub fn market_depth(&self, key: &InstrumentKey) -> Option<MarketDepth> {
        self.quotes.market_depth(key)
    }

    /// Retained market status messages, oldest first.
    #[must_use]
    pub fn market_status_messages(&self) -> Vec<MarketStatus> {
        self.dispatcher.market_status_messages()
    }

    /// Retained exchange messages, oldest first.
    #[must_use]
    pub fn exchange_messages(&self) -> Vec<ExchangeNotice> {
        self.dispatcher.exchange_messages()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check whether the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

const fn drop_reason(error: &CodecError) -> DropReason {
    match error {
        CodecError::UnknownInstrument { .. } => DropReason::UnknownInstrument,
        CodecError::DeprecatedMode(_) => DropReason::DeprecatedMode,
        _ => DropReason::Malformed,
    }
}
