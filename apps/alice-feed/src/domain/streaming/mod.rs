//! Market Data Streaming Types
//!
//! Codec-agnostic vocabulary of the feed: subscription modes, frame
//! categories, the events handed to consumers and the connection
//! lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::instrument::Exchange;
use super::quote::{MarketDepth, OpenInterestSnapshot, PriceBandSnapshot, TickSnapshot};

// =============================================================================
// Subscription Mode
// =============================================================================

/// Granularity of an instrument subscription.
///
/// `Tick` and `Depth` are understood by both wire protocols. The remaining
/// modes only exist on the binary feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    /// Touchline updates.
    Tick,
    /// Five-level market depth.
    Depth,
    /// Compact market data (binary feed only).
    Compact,
    /// Snap quote (binary feed only).
    SnapQuote,
    /// Full snap quote (binary feed only).
    FullSnapQuote,
}

impl FeedMode {
    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Depth => "depth",
            Self::Compact => "compact",
            Self::SnapQuote => "snap_quote",
            Self::FullSnapQuote => "full_snap_quote",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognised mode name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown feed mode: {0}")]
pub struct UnknownFeedMode(pub String);

impl FromStr for FeedMode {
    type Err = UnknownFeedMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "tick" | "touchline" => Ok(Self::Tick),
            "depth" => Ok(Self::Depth),
            "compact" => Ok(Self::Compact),
            "snap_quote" | "snapquote" => Ok(Self::SnapQuote),
            "full_snap_quote" | "full_snapquote" => Ok(Self::FullSnapQuote),
            _ => Err(UnknownFeedMode(s.to_string())),
        }
    }
}

// =============================================================================
// Categories
// =============================================================================

/// Category of an instrument-scoped quote frame.
///
/// Selects which merged view is handed to consumers after the update is
/// applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteCategory {
    /// Tick-level update.
    Tick,
    /// Depth update.
    Depth,
    /// Open interest update.
    OpenInterest,
    /// Circuit price band update.
    PriceBand,
}

impl QuoteCategory {
    /// Widen into the frame category.
    #[must_use]
    pub const fn feed_category(self) -> FeedCategory {
        match self {
            Self::Tick => FeedCategory::Tick,
            Self::Depth => FeedCategory::Depth,
            Self::OpenInterest => FeedCategory::OpenInterest,
            Self::PriceBand => FeedCategory::PriceBand,
        }
    }
}

/// Category of any inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedCategory {
    /// Tick-level update.
    Tick,
    /// Depth update.
    Depth,
    /// Open interest update.
    OpenInterest,
    /// Circuit price band update.
    PriceBand,
    /// Market status message.
    MarketStatus,
    /// Exchange message.
    ExchangeMessage,
    /// Connection acknowledgement.
    ConnectionAck,
    /// Heartbeat echo.
    Heartbeat,
    /// Anything that could not be classified.
    Unknown,
}

impl FeedCategory {
    /// Get the category label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Depth => "depth",
            Self::OpenInterest => "open_interest",
            Self::PriceBand => "price_band",
            Self::MarketStatus => "market_status",
            Self::ExchangeMessage => "exchange_message",
            Self::ConnectionAck => "connection_ack",
            Self::Heartbeat => "heartbeat",
            Self::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Venue Messages
// =============================================================================

/// Trading session status for a market segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStatus {
    /// Exchange the status applies to.
    pub exchange: Exchange,
    /// Market type, e.g. `Normal Market`.
    pub market_type: String,
    /// Status text, e.g. `Open`.
    pub status: String,
}

/// Free-form broadcast message from an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeNotice {
    /// Originating exchange.
    pub exchange: Exchange,
    /// Message text.
    pub message: String,
    /// Exchange timestamp, if supplied.
    pub exchange_timestamp: Option<DateTime<Utc>>,
}

// =============================================================================
// Events
// =============================================================================

/// Event delivered to consumers after a frame has been processed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Merged tick view.
    Tick(TickSnapshot),
    /// Merged tick and depth view.
    Depth(MarketDepth),
    /// Open interest view.
    OpenInterest(OpenInterestSnapshot),
    /// Circuit price band view.
    PriceBand(PriceBandSnapshot),
    /// Market status message.
    MarketStatus(MarketStatus),
    /// Exchange message.
    ExchangeMessage(ExchangeNotice),
}

impl FeedEvent {
    /// Get the category of this event.
    #[must_use]
    pub const fn category(&self) -> FeedCategory {
        match self {
            Self::Tick(_) => FeedCategory::Tick,
            Self::Depth(_) => FeedCategory::Depth,
            Self::OpenInterest(_) => FeedCategory::OpenInterest,
            Self::PriceBand(_) => FeedCategory::PriceBand,
            Self::MarketStatus(_) => FeedCategory::MarketStatus,
            Self::ExchangeMessage(_) => FeedCategory::ExchangeMessage,
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected; a reconnect may be pending.
    #[default]
    Disconnected,
    /// Transport is being established.
    Connecting,
    /// Transport is open and requests may be sent.
    Connected,
    /// Shut down; terminal.
    Closed,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("tick", FeedMode::Tick)]
    #[test_case("TOUCHLINE", FeedMode::Tick)]
    #[test_case("Depth", FeedMode::Depth)]
    #[test_case("compact", FeedMode::Compact)]
    #[test_case("snap-quote", FeedMode::SnapQuote)]
    #[test_case("full_snapquote", FeedMode::FullSnapQuote)]
    fn parses_feed_mode(input: &str, expected: FeedMode) {
        assert_eq!(input.parse::<FeedMode>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_feed_mode() {
        assert_eq!(
            "quotes".parse::<FeedMode>(),
            Err(UnknownFeedMode("quotes".to_string()))
        );
    }

    #[test]
    fn quote_category_widens() {
        assert_eq!(QuoteCategory::Tick.feed_category(), FeedCategory::Tick);
        assert_eq!(
            QuoteCategory::PriceBand.feed_category().as_str(),
            "price_band"
        );
    }

    #[test]
    fn connection_state_defaults_to_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }
}
