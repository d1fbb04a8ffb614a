//! Frame Codec
//!
//! Shared decoding types for both feed protocols.
//!
//! - **JSON feed**: flat objects tagged by a `t` field, see [`super::json`]
//! - **Binary feed**: big-endian records led by a mode byte, see [`super::binary`]
//!
//! A decoder never fails the connection. Every error here is reported per
//! frame; the caller logs it, counts it and moves on to the next frame.

use std::sync::Arc;

use crate::domain::instrument::{Exchange, Instrument};
use crate::domain::quote::QuoteUpdate;
use crate::domain::streaming::{ExchangeNotice, FeedCategory, MarketStatus, QuoteCategory};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame kind does not match the protocol.
    #[error("unexpected {0} frame")]
    UnexpectedFrameKind(&'static str),

    /// Frame carried no data.
    #[error("empty frame")]
    EmptyFrame,

    /// Unknown JSON message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Unknown binary mode byte.
    #[error("unknown binary mode: {0}")]
    UnknownMode(u8),

    /// Binary mode the venue no longer supports.
    #[error("deprecated binary mode: {0}")]
    DeprecatedMode(u8),

    /// Binary record shorter than its layout.
    #[error("truncated mode {mode} record: need {needed} bytes, have {available}")]
    Truncated {
        /// Mode byte of the record.
        mode: u8,
        /// Bytes required to read the next field.
        needed: usize,
        /// Bytes available in the frame.
        available: usize,
    },

    /// Required field is missing.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Field value could not be parsed.
    #[error("invalid value for field {field}: {value}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Raw value.
        value: String,
    },

    /// Exchange code is not recognised.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// Binary exchange code is not recognised.
    #[error("unknown exchange code: {0}")]
    UnknownExchangeCode(u8),

    /// Instrument is not in the directory.
    #[error("instrument not found: {exchange}|{token}")]
    UnknownInstrument {
        /// Exchange reported by the frame.
        exchange: Exchange,
        /// Token reported by the frame.
        token: u32,
    },
}

/// A raw inbound WebSocket payload.
#[derive(Debug, Clone, Copy)]
pub enum RawFrame<'a> {
    /// Text frame.
    Text(&'a str),
    /// Binary frame.
    Binary(&'a [u8]),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// Venue acknowledged the connection handshake.
    ConnectionAck,
    /// Heartbeat echo.
    Heartbeat,
    /// Partial quote update for a resolved instrument.
    Quote {
        /// Category of the update.
        category: QuoteCategory,
        /// Resolved instrument.
        instrument: Arc<Instrument>,
        /// Decoded fields.
        update: Box<QuoteUpdate>,
    },
    /// Market status message.
    MarketStatus(MarketStatus),
    /// Exchange message.
    ExchangeMessage(ExchangeNotice),
}

impl DecodedFrame {
    /// Get the category of this frame.
    #[must_use]
    pub const fn category(&self) -> FeedCategory {
        match self {
            Self::ConnectionAck => FeedCategory::ConnectionAck,
            Self::Heartbeat => FeedCategory::Heartbeat,
            Self::Quote { category, .. } => category.feed_category(),
            Self::MarketStatus(_) => FeedCategory::MarketStatus,
            Self::ExchangeMessage(_) => FeedCategory::ExchangeMessage,
        }
    }
}

/// Decodes raw frames of one wire protocol.
pub trait FrameDecoder: Send + Sync {
    /// Decode a single frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is malformed, of an unknown type, or
    /// refers to an instrument the directory does not know.
    fn decode(&self, frame: RawFrame<'_>) -> Result<DecodedFrame, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::QuoteUpdate;

    #[test]
    fn decoded_frame_categories() {
        assert_eq!(DecodedFrame::ConnectionAck.category(), FeedCategory::ConnectionAck);
        assert_eq!(DecodedFrame::Heartbeat.category(), FeedCategory::Heartbeat);

        let quote = DecodedFrame::Quote {
            category: QuoteCategory::Depth,
            instrument: Arc::new(Instrument::new(Exchange::Nse, 1594, "INFY-EQ")),
            update: Box::new(QuoteUpdate::default()),
        };
        assert_eq!(quote.category(), FeedCategory::Depth);
    }

    #[test]
    fn error_messages_name_the_problem() {
        let err = CodecError::UnknownInstrument {
            exchange: Exchange::Nse,
            token: 7,
        };
        assert_eq!(err.to_string(), "instrument not found: NSE|7");

        let err = CodecError::Truncated {
            mode: 1,
            needed: 4,
            available: 2,
        };
        assert!(err.to_string().contains("mode 1"));
    }
}
