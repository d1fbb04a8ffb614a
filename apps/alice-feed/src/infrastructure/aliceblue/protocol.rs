//! Feed Protocol
//!
//! The venue exposes the same data over two wire protocols. [`FeedProtocol`]
//! bundles the inbound decoder with the outbound request encoding of one of
//! them, so the connection manager never branches on the protocol itself.
//!
//! | Concern         | JSON                         | Binary                          |
//! |-----------------|------------------------------|---------------------------------|
//! | Inbound frames  | text, tagged objects         | binary records                  |
//! | Handshake       | `t: c` with hashed session   | none (session in the URL)       |
//! | Modes           | tick, depth                  | all [`FeedMode`]s               |
//! | Segment topics  | not supported                | market status, exchange messages|
//! | Heartbeat       | `{"t":"h"}`                  | `{"a":"h","v":[],"m":""}`       |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::binary::BinaryDecoder;
use super::codec::{CodecError, DecodedFrame, FrameDecoder, RawFrame};
use super::json::JsonDecoder;
use super::messages::{
    ActionRequest, ConnectRequest, KeyedRequest, SEGMENT_EXCHANGE_CODES, SegmentRequest,
    TypedHeartbeat,
};
use crate::application::ports::SessionCredentials;
use crate::domain::instrument::{Exchange, Instrument, InstrumentResolver};
use crate::domain::streaming::FeedMode;
use crate::domain::subscription::SegmentTopic;

/// Placeholder in URL templates replaced by the session id.
pub const TOKEN_PLACEHOLDER: &str = "{token}";

/// Default endpoint of the JSON feed.
pub const JSON_FEED_URL: &str = "wss://ws2.aliceblueonline.com/NorenWS/";

/// Default endpoint of the binary feed.
pub const BINARY_FEED_URL: &str =
    "wss://ant.aliceblueonline.com/hydrasocket/v2/websocket?access_token={token}";

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while encoding requests.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Mode is not available on this protocol.
    #[error("{protocol} feed does not support {mode} mode")]
    UnsupportedMode {
        /// Active protocol.
        protocol: ProtocolKind,
        /// Requested mode.
        mode: FeedMode,
    },

    /// Operation is not available on this protocol.
    #[error("{protocol} feed does not support {operation}")]
    NotSupported {
        /// Active protocol.
        protocol: ProtocolKind,
        /// Requested operation.
        operation: &'static str,
    },

    /// Exchange has no binary feed code.
    #[error("exchange {0} is not available on the binary feed")]
    NoBinaryCode(Exchange),

    /// Request names no instruments.
    #[error("request has no instruments")]
    EmptyRequest,

    /// Request could not be serialised.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

// =============================================================================
// Protocol Kind
// =============================================================================

/// Wire protocol of the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolKind {
    /// JSON text frames.
    #[default]
    Json,
    /// Binary records.
    Binary,
}

impl ProtocolKind {
    /// Get the protocol name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "binary",
        }
    }

    /// Default endpoint URL template.
    #[must_use]
    pub const fn default_url(&self) -> &'static str {
        match self {
            Self::Json => JSON_FEED_URL,
            Self::Binary => BINARY_FEED_URL,
        }
    }

    /// Default heartbeat interval.
    #[must_use]
    pub const fn default_heartbeat_interval(&self) -> Duration {
        match self {
            Self::Json => Duration::from_secs(3),
            Self::Binary => Duration::from_secs(10),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "binary" => Ok(Self::Binary),
            other => Err(format!("unknown feed protocol: {other}")),
        }
    }
}

// =============================================================================
// Feed Protocol
// =============================================================================

/// Decoder and request encoder of one wire protocol.
pub struct FeedProtocol {
    kind: ProtocolKind,
    decoder: Box<dyn FrameDecoder>,
}

impl fmt::Debug for FeedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedProtocol")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl FeedProtocol {
    /// Create the protocol of the given kind.
    #[must_use]
    pub fn new(kind: ProtocolKind, resolver: Arc<dyn InstrumentResolver>) -> Self {
        let decoder: Box<dyn FrameDecoder> = match kind {
            ProtocolKind::Json => Box::new(JsonDecoder::new(resolver)),
            ProtocolKind::Binary => Box::new(BinaryDecoder::new(resolver)),
        };
        Self { kind, decoder }
    }

    /// Get the protocol kind.
    #[must_use]
    pub const fn kind(&self) -> ProtocolKind {
        self.kind
    }

    /// Decode an inbound frame.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error for malformed or unresolvable frames.
    pub fn decode(&self, frame: RawFrame<'_>) -> Result<DecodedFrame, CodecError> {
        self.decoder.decode(frame)
    }

    /// Resolve the endpoint URL for a session.
    #[must_use]
    pub fn connect_url(&self, template: &str, credentials: &SessionCredentials) -> String {
        template.replace(TOKEN_PLACEHOLDER, credentials.session_id())
    }

    /// Check that a mode can be subscribed on this protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnsupportedMode`] for binary-only modes on
    /// the JSON feed.
    pub fn check_mode(&self, mode: FeedMode) -> Result<(), ProtocolError> {
        match (self.kind, mode) {
            (ProtocolKind::Json, FeedMode::Tick | FeedMode::Depth) | (ProtocolKind::Binary, _) => {
                Ok(())
            }
            (ProtocolKind::Json, _) => Err(ProtocolError::UnsupportedMode {
                protocol: self.kind,
                mode,
            }),
        }
    }

    /// Handshake to send right after the transport opens, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded.
    pub fn handshake(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Option<String>, ProtocolError> {
        match self.kind {
            ProtocolKind::Json => {
                let request =
                    ConnectRequest::new(credentials.user_id(), credentials.session_id());
                Ok(Some(encode(&request)?))
            }
            ProtocolKind::Binary => Ok(None),
        }
    }

    /// Encode a subscribe request for instruments sharing one mode.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty list, an unsupported mode, or an
    /// exchange the protocol cannot address.
    pub fn subscribe(
        &self,
        instruments: &[Arc<Instrument>],
        mode: FeedMode,
    ) -> Result<String, ProtocolError> {
        self.instrument_request(instruments, mode, true)
    }

    /// Encode an unsubscribe request for instruments subscribed under `mode`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`FeedProtocol::subscribe`].
    pub fn unsubscribe(
        &self,
        instruments: &[Arc<Instrument>],
        mode: FeedMode,
    ) -> Result<String, ProtocolError> {
        self.instrument_request(instruments, mode, false)
    }

    /// Encode a segment topic subscription.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotSupported`] on the JSON feed.
    pub fn subscribe_topic(&self, topic: SegmentTopic) -> Result<String, ProtocolError> {
        match self.kind {
            ProtocolKind::Json => Err(ProtocolError::NotSupported {
                protocol: self.kind,
                operation: topic_operation(topic),
            }),
            ProtocolKind::Binary => encode(&SegmentRequest {
                action: "subscribe",
                values: SEGMENT_EXCHANGE_CODES.to_vec(),
                mode: topic_name(topic),
            }),
        }
    }

    /// Encode the heartbeat message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be encoded.
    pub fn heartbeat(&self) -> Result<String, ProtocolError> {
        match self.kind {
            ProtocolKind::Json => encode(&TypedHeartbeat::default()),
            ProtocolKind::Binary => encode(&SegmentRequest::heartbeat()),
        }
    }

    fn instrument_request(
        &self,
        instruments: &[Arc<Instrument>],
        mode: FeedMode,
        subscribe: bool,
    ) -> Result<String, ProtocolError> {
        if instruments.is_empty() {
            return Err(ProtocolError::EmptyRequest);
        }
        self.check_mode(mode)?;

        match self.kind {
            ProtocolKind::Json => {
                let keys = instruments
                    .iter()
                    .map(|instrument| instrument.key().to_string())
                    .collect::<Vec<_>>()
                    .join("#");
                let msg_type = match (mode, subscribe) {
                    (FeedMode::Depth, true) => "d",
                    (FeedMode::Depth, false) => "ud",
                    (_, true) => "t",
                    (_, false) => "u",
                };
                encode(&KeyedRequest { keys, msg_type })
            }
            ProtocolKind::Binary => {
                let values = instruments
                    .iter()
                    .map(|instrument| {
                        instrument
                            .exchange
                            .binary_code()
                            .map(|code| (code, instrument.token))
                            .ok_or(ProtocolError::NoBinaryCode(instrument.exchange))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                encode(&ActionRequest {
                    action: if subscribe { "subscribe" } else { "unsubscribe" },
                    values,
                    mode: binary_mode_name(mode),
                })
            }
        }
    }
}

const fn binary_mode_name(mode: FeedMode) -> &'static str {
    match mode {
        FeedMode::Tick => "marketdata",
        FeedMode::Compact => "compact_marketdata",
        FeedMode::SnapQuote => "snapquote",
        FeedMode::Depth | FeedMode::FullSnapQuote => "full_snapquote",
    }
}

const fn topic_name(topic: SegmentTopic) -> &'static str {
    match topic {
        SegmentTopic::MarketStatus => "market_status",
        SegmentTopic::ExchangeMessages => "exchange_messages",
    }
}

const fn topic_operation(topic: SegmentTopic) -> &'static str {
    match topic {
        SegmentTopic::MarketStatus => "market status subscriptions",
        SegmentTopic::ExchangeMessages => "exchange message subscriptions",
    }
}

fn encode<T: Serialize>(request: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(request)?)
}
