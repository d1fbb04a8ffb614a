//! Port Interfaces
//!
//! Contracts between the feed engine and the code around it.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`SessionProvider`]: supplies the session credential for each connect
//! - [`InstrumentResolver`](crate::domain::instrument::InstrumentResolver):
//!   resolves `(exchange, token)` pairs while decoding
//!
//! ## Driver Ports (Inbound)
//!
//! - [`FeedCallbacks`]: typed subscriber callbacks invoked per event

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::quote::{MarketDepth, OpenInterestSnapshot, PriceBandSnapshot, TickSnapshot};
use crate::domain::streaming::{ExchangeNotice, MarketStatus};

// =============================================================================
// Session
// =============================================================================

/// Credentials of an authenticated venue session.
///
/// The session id is secret; `Debug` output redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    user_id: String,
    session_id: String,
}

impl SessionCredentials {
    /// Create credentials from a user id and an authenticated session id.
    #[must_use]
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Get the user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Get the session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("user_id", &self.user_id)
            .field("session_id", &"[REDACTED]")
            .finish()
    }
}

/// Errors raised while obtaining a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is available.
    #[error("no active session: {0}")]
    Unavailable(String),

    /// The session was rejected or has expired.
    #[error("session rejected: {0}")]
    Rejected(String),
}

/// Source of the session credential used on every connect attempt.
///
/// Authentication itself happens elsewhere; implementations only hand out
/// the current credential, so a refreshed session is picked up on the next
/// reconnect.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Get the current session credentials.
    async fn credentials(&self) -> Result<SessionCredentials, SessionError>;
}

/// Session provider returning a fixed credential.
#[derive(Debug, Clone)]
pub struct StaticSession {
    credentials: SessionCredentials,
}

impl StaticSession {
    /// Wrap fixed credentials.
    #[must_use]
    pub const fn new(credentials: SessionCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn credentials(&self) -> Result<SessionCredentials, SessionError> {
        if self.credentials.session_id.is_empty() {
            return Err(SessionError::Unavailable("empty session id".to_string()));
        }
        Ok(self.credentials.clone())
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Callback receiving one event payload.
pub type EventCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callback for connection lifecycle notifications.
pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving errors absorbed by the feed.
pub type ErrorCallback = Arc<dyn Fn(&(dyn Error + 'static)) + Send + Sync>;

/// Subscriber callbacks, one optional slot per event kind.
///
/// Empty slots are skipped.
///
/// # Example
///
/// ```rust
/// use alice_feed::application::ports::FeedCallbacks;
///
/// let callbacks = FeedCallbacks::new()
///     .on_tick(|tick| println!("{} {}", tick.instrument, tick.ltp))
///     .on_disconnect(|| println!("feed lost"));
/// assert!(callbacks.has_tick());
/// ```
#[derive(Clone, Default)]
pub struct FeedCallbacks {
    pub(crate) tick: Option<EventCallback<TickSnapshot>>,
    pub(crate) depth: Option<EventCallback<MarketDepth>>,
    pub(crate) open_interest: Option<EventCallback<OpenInterestSnapshot>>,
    pub(crate) price_band: Option<EventCallback<PriceBandSnapshot>>,
    pub(crate) market_status: Option<EventCallback<MarketStatus>>,
    pub(crate) exchange_message: Option<EventCallback<ExchangeNotice>>,
    pub(crate) connect: Option<LifecycleCallback>,
    pub(crate) disconnect: Option<LifecycleCallback>,
    pub(crate) error: Option<ErrorCallback>,
}

impl FeedCallbacks {
    /// Create an empty callback set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the tick callback.
    #[must_use]
    pub fn on_tick(mut self, f: impl Fn(&TickSnapshot) + Send + Sync + 'static) -> Self {
        self.tick = Some(Arc::new(f));
        self
    }

    /// Register the depth callback.
    #[must_use]
    pub fn on_depth(mut self, f: impl Fn(&MarketDepth) + Send + Sync + 'static) -> Self {
        self.depth = Some(Arc::new(f));
        self
    }

    /// Register the open interest callback.
    #[must_use]
    pub fn on_open_interest(
        mut self,
        f: impl Fn(&OpenInterestSnapshot) + Send + Sync + 'static,
    ) -> Self {
        self.open_interest = Some(Arc::new(f));
        self
    }

    /// Register the price band callback.
    #[must_use]
    pub fn on_price_band(
        mut self,
        f: impl Fn(&PriceBandSnapshot) + Send + Sync + 'static,
    ) -> Self {
        self.price_band = Some(Arc::new(f));
        self
    }

    /// Register the market status callback.
    #[must_use]
    pub fn on_market_status(mut self, f: impl Fn(&MarketStatus) + Send + Sync + 'static) -> Self {
        self.market_status = Some(Arc::new(f));
        self
    }

    /// Register the exchange message callback.
    #[must_use]
    pub fn on_exchange_message(
        mut self,
        f: impl Fn(&ExchangeNotice) + Send + Sync + 'static,
    ) -> Self {
        self.exchange_message = Some(Arc::new(f));
        self
    }

    /// Register the callback fired after each successful (re)connect.
    #[must_use]
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connect = Some(Arc::new(f));
        self
    }

    /// Register the callback fired when the transport drops.
    #[must_use]
    pub fn on_disconnect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Arc::new(f));
        self
    }

    /// Register the callback receiving absorbed errors.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&(dyn Error + 'static)) + Send + Sync + 'static) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    /// Check whether a tick callback is registered.
    #[must_use]
    pub const fn has_tick(&self) -> bool {
        self.tick.is_some()
    }
}

impl fmt::Debug for FeedCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedCallbacks")
            .field("tick", &self.tick.is_some())
            .field("depth", &self.depth.is_some())
            .field("open_interest", &self.open_interest.is_some())
            .field("price_band", &self.price_band.is_some())
            .field("market_status", &self.market_status.is_some())
            .field("exchange_message", &self.exchange_message.is_some())
            .field("connect", &self.connect.is_some())
            .field("disconnect", &self.disconnect.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_session() {
        let credentials = SessionCredentials::new("AB123", "super-secret");
        let debug = format!("{credentials:?}");
        assert!(debug.contains("AB123"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn static_session_returns_credentials() {
        let session = StaticSession::new(SessionCredentials::new("AB123", "s1"));
        let credentials = tokio_test::block_on(session.credentials()).unwrap();
        assert_eq!(credentials.user_id(), "AB123");
        assert_eq!(credentials.session_id(), "s1");
    }

    #[tokio::test]
    async fn static_session_rejects_empty_session() {
        let session = StaticSession::new(SessionCredentials::new("AB123", ""));
        assert!(matches!(
            session.credentials().await,
            Err(SessionError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn mock_session_provider() {
        let mut provider = MockSessionProvider::new();
        provider
            .expect_credentials()
            .times(1)
            .returning(|| Err(SessionError::Rejected("expired".to_string())));

        let result = provider.credentials().await;
        assert!(matches!(result, Err(SessionError::Rejected(reason)) if reason == "expired"));
    }

    #[test]
    fn builder_fills_slots() {
        let callbacks = FeedCallbacks::new()
            .on_tick(|_| {})
            .on_connect(|| {})
            .on_error(|_| {});
        assert!(callbacks.has_tick());
        assert!(callbacks.depth.is_none());
        assert!(callbacks.connect.is_some());
        assert!(callbacks.error.is_some());

        let debug = format!("{callbacks:?}");
        assert!(debug.contains("tick: true"));
        assert!(debug.contains("depth: false"));
    }
}
