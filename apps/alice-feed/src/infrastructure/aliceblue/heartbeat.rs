//! Heartbeat Manager
//!
//! Keeps the feed session alive with periodic application-level heartbeat
//! messages, and optionally forces a reconnect when the connection goes
//! quiet for too long.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between heartbeat messages.
    pub interval: Duration,
    /// Inbound silence after which the connection is considered dead.
    /// `None` disables the check.
    pub idle_timeout: Option<Duration>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            idle_timeout: None,
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(interval: Duration, idle_timeout: Option<Duration>) -> Self {
        Self {
            interval,
            idle_timeout,
        }
    }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Request to send a heartbeat message.
    SendHeartbeat,
    /// No inbound frame within the idle timeout.
    IdleTimeout,
}

/// State shared between the heartbeat manager and the connection reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: RwLock<Instant>,
    heartbeats_sent: AtomicU64,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: RwLock::new(Instant::now()),
            heartbeats_sent: AtomicU64::new(0),
        }
    }

    /// Record that an inbound frame arrived.
    pub fn record_activity(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Record that a heartbeat was written.
    pub fn record_heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of heartbeats written on this connection.
    #[must_use]
    pub fn heartbeats_sent(&self) -> u64 {
        self.heartbeats_sent.load(Ordering::Relaxed)
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }
}

/// Periodic heartbeat driver for one connection.
///
/// The manager never writes to the socket itself; it asks the connection
/// loop to do so through the event channel, which keeps all writes on the
/// serialized send path.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the event channel closes, or the idle timeout
    /// fires. The first heartbeat goes out one interval after start.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.tick().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Returns `Err(())` when the loop should stop.
    async fn tick(&self) -> Result<(), ()> {
        if let Some(timeout) = self.config.idle_timeout {
            let idle = self.state.idle_for();
            if idle > timeout {
                tracing::warn!(
                    idle_ms = idle.as_millis(),
                    timeout_ms = timeout.as_millis(),
                    "Feed idle timeout"
                );
                let _ = self.event_tx.send(HeartbeatEvent::IdleTimeout).await;
                return Err(());
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendHeartbeat).await.is_err() {
            tracing::debug!("Event channel closed, stopping heartbeat");
            return Err(());
        }

        Ok(())
    }
}
