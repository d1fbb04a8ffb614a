#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Alice Feed - Market Data Feed Engine
//!
//! Client-side engine for the Alice Blue market data feed. It keeps one
//! WebSocket session to the venue, decodes its JSON or binary frames,
//! merges partial updates into a complete per-instrument tick and depth
//! view, and hands typed events to subscriber callbacks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Instrument identity, sticky quote merge, subscriptions
//!   - `instrument`: Instruments and the instrument directory
//!   - `quote`: Partial updates and the merged tick/depth views
//!   - `streaming`: Feed modes, event categories, connection state
//!   - `subscription`: Subscription registry
//!
//! - **Application**: Ports and services
//!   - `ports`: Session provider, subscriber callbacks
//!   - `services`: Event dispatcher and message logs
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `aliceblue`: Frame decoders, request encoding, connection manager
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing and OpenTelemetry export
//!
//! # Data Flow
//!
//! ```text
//!                    ┌──────────────┐   ┌───────────┐   ┌────────────┐
//! Alice Blue WS ────►│ FrameDecoder │──►│ QuoteBook │──►│ Dispatcher │──► callbacks
//!                    └──────────────┘   └───────────┘   └────────────┘
//!                           ▲
//!                  InstrumentDirectory
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use alice_feed::{
//!     FeedCallbacks, FeedClient, FeedClientConfig, FeedMode, FeedProtocol, Instrument,
//!     InstrumentDirectory, ProtocolKind, SessionCredentials, StaticSession,
//! };
//! use alice_feed::domain::instrument::Exchange;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut directory = InstrumentDirectory::new();
//! let infy = directory.insert(Instrument::new(Exchange::Nse, 1594, "INFY-EQ"));
//!
//! let client = Arc::new(FeedClient::new(
//!     FeedClientConfig::for_protocol(ProtocolKind::Json),
//!     FeedProtocol::new(ProtocolKind::Json, Arc::new(directory)),
//!     Arc::new(StaticSession::new(SessionCredentials::new("AB123", "session-id"))),
//!     FeedCallbacks::new().on_tick(|tick| println!("{} {}", tick.instrument, tick.ltp)),
//!     CancellationToken::new(),
//! ));
//! let handle = client.start();
//! client.subscribe(&[infy], FeedMode::Tick).await?;
//! client.shutdown();
//! handle.await??;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Feed types and the quote merge, free of I/O.
pub mod domain;

/// Application layer - Ports and event dispatch.
pub mod application;

/// Infrastructure layer - Venue adapters and ambient services.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::instrument::{
    DerivativeKind, Instrument, InstrumentDirectory, InstrumentKey, InstrumentResolver,
};
pub use domain::quote::{DepthSnapshot, MarketDepth, QuoteBook, TickSnapshot};
pub use domain::streaming::{ConnectionState, FeedCategory, FeedEvent, FeedMode};
pub use domain::subscription::{Subscription, SubscriptionRegistry};

// Ports and services
pub use application::ports::{FeedCallbacks, SessionCredentials, SessionProvider, StaticSession};
pub use application::services::Dispatcher;

// Feed client
pub use infrastructure::aliceblue::{
    FeedClient, FeedClientConfig, FeedClientError, FeedProtocol, ProtocolKind,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedConfig};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
