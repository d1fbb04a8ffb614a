//! JSON Feed Decoder
//!
//! Decodes the venue's JSON WebSocket frames. Every frame is a flat object
//! with a `t` tag; numeric values arrive as strings.
//!
//! | Tag         | Meaning                   |
//! |-------------|---------------------------|
//! | `ck`        | Connection acknowledgement |
//! | `tk` / `tf` | Tick (full / partial)     |
//! | `dk` / `df` | Depth (full / partial)    |
//! | `h`         | Heartbeat echo            |
//!
//! Example partial tick:
//! ```json
//! {"t":"tf","e":"NSE","tk":"1594","v":"7399482"}
//! ```

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::codec::{CodecError, DecodedFrame, FrameDecoder, RawFrame};
use crate::domain::instrument::{Exchange, InstrumentResolver};
use crate::domain::quote::{BookUpdate, DEPTH_LEVELS, LevelUpdate, QuoteUpdate, TickUpdate};
use crate::domain::streaming::QuoteCategory;

/// Decoder for the JSON feed.
pub struct JsonDecoder {
    resolver: Arc<dyn InstrumentResolver>,
}

impl JsonDecoder {
    /// Create a decoder that resolves instruments through `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn InstrumentResolver>) -> Self {
        Self { resolver }
    }

    /// Decode a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object, the tag is
    /// unknown, a field is malformed, or the instrument cannot be resolved.
    pub fn decode_text(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CodecError::EmptyFrame);
        }

        let object: Map<String, Value> = serde_json::from_str(trimmed)?;
        let fields = Fields(&object);
        let tag = fields.text("t").ok_or(CodecError::MissingField("t"))?;

        match tag.as_str() {
            "ck" => Ok(DecodedFrame::ConnectionAck),
            "h" => Ok(DecodedFrame::Heartbeat),
            "tk" | "tf" => self.decode_quote(&fields, QuoteCategory::Tick),
            "dk" | "df" => self.decode_quote(&fields, QuoteCategory::Depth),
            other => Err(CodecError::UnknownMessageType(other.to_string())),
        }
    }

    fn decode_quote(
        &self,
        fields: &Fields<'_>,
        category: QuoteCategory,
    ) -> Result<DecodedFrame, CodecError> {
        let code = fields.text("e").ok_or(CodecError::MissingField("e"))?;
        let exchange = Exchange::from_str(&code).map_err(|_| CodecError::UnknownExchange(code))?;
        let token: u32 = fields.number("tk")?.ok_or(CodecError::MissingField("tk"))?;
        let instrument = self
            .resolver
            .resolve(exchange, token)
            .ok_or(CodecError::UnknownInstrument { exchange, token })?;

        let mut update = QuoteUpdate {
            tick: tick_fields(fields)?,
            ..QuoteUpdate::default()
        };

        if category == QuoteCategory::Depth {
            for level in 0..DEPTH_LEVELS {
                update.bids[level] = level_fields(fields, "bp", "bq", Some("bo"), level)?;
                update.asks[level] = level_fields(fields, "sp", "sq", Some("so"), level)?;
            }
            update.book = book_fields(fields)?;
        } else {
            update.bids[0] = level_fields(fields, "bp", "bq", None, 0)?;
            update.asks[0] = level_fields(fields, "sp", "sq", None, 0)?;
        }

        tracing::trace!(
            instrument = %instrument,
            category = ?category,
            "Decoded JSON quote frame"
        );

        Ok(DecodedFrame::Quote {
            category,
            instrument,
            update: Box::new(update),
        })
    }
}

impl FrameDecoder for JsonDecoder {
    fn decode(&self, frame: RawFrame<'_>) -> Result<DecodedFrame, CodecError> {
        match frame {
            RawFrame::Text(text) => self.decode_text(text),
            RawFrame::Binary(_) => Err(CodecError::UnexpectedFrameKind("binary")),
        }
    }
}

fn tick_fields(fields: &Fields<'_>) -> Result<TickUpdate, CodecError> {
    Ok(TickUpdate {
        ltp: fields.decimal("lp")?,
        percent_change: fields.decimal("pc")?,
        change_value: fields.decimal("cv")?,
        volume: fields.number("v")?,
        open: fields.decimal("o")?,
        high: fields.decimal("h")?,
        low: fields.decimal("l")?,
        close: fields.decimal("c")?,
        average_price: fields.decimal("ap")?,
        tick_increment: fields.decimal("ti")?,
        lot_size: fields.number("ls")?,
        price_precision: fields.number("pp")?,
        total_open_interest: fields.number("toi")?,
        exchange_timestamp: fields.epoch("ft")?,
    })
}

fn level_fields(
    fields: &Fields<'_>,
    price: &str,
    quantity: &str,
    orders: Option<&str>,
    level: usize,
) -> Result<LevelUpdate, CodecError> {
    let slot = level + 1;
    Ok(LevelUpdate {
        price: fields.decimal(&format!("{price}{slot}"))?,
        quantity: fields.number(&format!("{quantity}{slot}"))?,
        orders: match orders {
            Some(orders) => fields.number(&format!("{orders}{slot}"))?,
            None => None,
        },
    })
}

fn book_fields(fields: &Fields<'_>) -> Result<BookUpdate, CodecError> {
    Ok(BookUpdate {
        open_interest: fields.number("oi")?,
        initial_open_interest: None,
        last_traded_quantity: fields.number("ltq")?,
        last_traded_time: fields.time("ltt")?,
        total_buy_quantity: fields.number("tbq")?,
        total_sell_quantity: fields.number("tsq")?,
        upper_circuit: fields.decimal("uc")?,
        lower_circuit: fields.decimal("lc")?,
    })
}

// =============================================================================
// Field Access
// =============================================================================

/// Typed access to the string-encoded fields of a frame.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    /// Raw text of a field. Empty strings count as absent.
    fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn parse<T: FromStr>(&self, key: &str) -> Result<Option<T>, CodecError> {
        self.text(key)
            .map(|raw| {
                raw.parse().map_err(|_| CodecError::InvalidField {
                    field: key.to_string(),
                    value: raw,
                })
            })
            .transpose()
    }

    fn decimal(&self, key: &str) -> Result<Option<Decimal>, CodecError> {
        self.parse(key)
    }

    fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>, CodecError> {
        self.parse(key)
    }

    fn epoch(&self, key: &str) -> Result<Option<DateTime<Utc>>, CodecError> {
        let Some(seconds) = self.parse::<i64>(key)? else {
            return Ok(None);
        };
        DateTime::from_timestamp(seconds, 0)
            .map(Some)
            .ok_or_else(|| CodecError::InvalidField {
                field: key.to_string(),
                value: seconds.to_string(),
            })
    }

    fn time(&self, key: &str) -> Result<Option<NaiveTime>, CodecError> {
        self.text(key)
            .map(|raw| {
                NaiveTime::parse_from_str(&raw, "%H:%M:%S").map_err(|_| {
                    CodecError::InvalidField {
                        field: key.to_string(),
                        value: raw,
                    }
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{Instrument, MockInstrumentResolver};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn decoder() -> JsonDecoder {
        let mut resolver = MockInstrumentResolver::new();
        resolver
            .expect_resolve()
            .returning(|exchange, token| match (exchange, token) {
                (Exchange::Nse, 1594) => Some(Arc::new(Instrument::new(exchange, token, "INFY-EQ"))),
                _ => None,
            });
        JsonDecoder::new(Arc::new(resolver))
    }

    fn quote(frame: DecodedFrame) -> (QuoteCategory, Arc<Instrument>, QuoteUpdate) {
        match frame {
            DecodedFrame::Quote {
                category,
                instrument,
                update,
            } => (category, instrument, *update),
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn decodes_full_tick() {
        let text = r#"{"t":"tk","e":"NSE","tk":"1594","ts":"INFY-EQ","pp":"2","ls":"1","ti":"0.05",
            "lp":"1464.55","pc":"0.42","cv":"6.10","v":"7397051","o":"1450.00","h":"1470.00",
            "l":"1445.10","c":"1458.45","ap":"1461.32","ft":"1728459120",
            "bp1":"1464.50","sp1":"1464.55","bq1":"120","sq1":"285"}"#;
        let (category, instrument, update) = quote(decoder().decode_text(text).unwrap());

        assert_eq!(category, QuoteCategory::Tick);
        assert_eq!(instrument.token, 1594);
        assert_eq!(update.tick.ltp, Some(dec("1464.55")));
        assert_eq!(update.tick.volume, Some(7_397_051));
        assert_eq!(update.tick.price_precision, Some(2));
        assert_eq!(update.tick.tick_increment, Some(dec("0.05")));
        assert_eq!(
            update.tick.exchange_timestamp,
            DateTime::from_timestamp(1_728_459_120, 0)
        );
        assert_eq!(update.bids[0].price, Some(dec("1464.50")));
        assert_eq!(update.asks[0].quantity, Some(285));
        assert_eq!(update.book, BookUpdate::default());
    }

    #[test]
    fn partial_tick_leaves_other_fields_absent() {
        let text = r#"{"t":"tf","e":"NSE","tk":"1594","v":"7399482"}"#;
        let (_, _, update) = quote(decoder().decode_text(text).unwrap());

        assert_eq!(update.tick.volume, Some(7_399_482));
        assert!(update.tick.ltp.is_none());
        assert!(update.bids[0].price.is_none());
    }

    #[test]
    fn tick_frames_ignore_deeper_levels() {
        let text = r#"{"t":"tf","e":"NSE","tk":"1594","bp2":"1464.45","oi":"10"}"#;
        let (_, _, update) = quote(decoder().decode_text(text).unwrap());
        assert!(update.bids[1].price.is_none());
        assert!(update.book.open_interest.is_none());
    }

    #[test]
    fn decodes_depth_levels_and_order_counts() {
        let text = r#"{"t":"dk","e":"NSE","tk":"1594","lp":"1464.55",
            "bp1":"1464.50","bq1":"120","bo1":"3","bp2":"1464.45","bo2":"5",
            "sp5":"1465.00","so5":"9","ltq":"25","ltt":"10:15:32","tbq":"51000","tsq":"48000",
            "oi":"0","uc":"1610.95","lc":"1318.15"}"#;
        let (category, _, update) = quote(decoder().decode_text(text).unwrap());

        assert_eq!(category, QuoteCategory::Depth);
        assert_eq!(update.tick.ltp, Some(dec("1464.55")));
        assert_eq!(update.bids[0].orders, Some(3));
        assert_eq!(update.bids[1].price, Some(dec("1464.45")));
        assert_eq!(update.bids[1].orders, Some(5));
        assert_eq!(update.asks[4].price, Some(dec("1465.00")));
        assert_eq!(update.asks[4].orders, Some(9));
        assert_eq!(update.book.last_traded_quantity, Some(25));
        assert_eq!(update.book.last_traded_time, NaiveTime::from_hms_opt(10, 15, 32));
        assert_eq!(update.book.total_buy_quantity, Some(51_000));
        assert_eq!(update.book.upper_circuit, Some(dec("1610.95")));
    }

    #[test]
    fn accepts_numeric_json_values() {
        let text = r#"{"t":"tf","e":"NSE","tk":1594,"lp":1464.55,"v":7399482}"#;
        let (_, _, update) = quote(decoder().decode_text(text).unwrap());
        assert_eq!(update.tick.ltp, Some(dec("1464.55")));
        assert_eq!(update.tick.volume, Some(7_399_482));
    }

    #[test]
    fn control_frames() {
        assert_eq!(
            decoder().decode_text(r#"{"t":"ck","s":"OK","uid":"AB123_API"}"#).unwrap(),
            DecodedFrame::ConnectionAck
        );
        assert_eq!(
            decoder().decode_text(r#"{"t":"h"}"#).unwrap(),
            DecodedFrame::Heartbeat
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decoder().decode_text(r#"{"t":"om","e":"NSE"}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownMessageType(tag) if tag == "om"));
    }

    #[test]
    fn unknown_instrument_is_reported() {
        let err = decoder()
            .decode_text(r#"{"t":"tf","e":"NSE","tk":"99","lp":"1"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnknownInstrument {
                exchange: Exchange::Nse,
                token: 99
            }
        ));
    }

    #[test]
    fn malformed_frames_are_errors() {
        let decoder = decoder();
        assert!(matches!(decoder.decode_text("  "), Err(CodecError::EmptyFrame)));
        assert!(matches!(decoder.decode_text("{"), Err(CodecError::Json(_))));
        assert!(matches!(
            decoder.decode_text(r#"{"e":"NSE"}"#),
            Err(CodecError::MissingField("t"))
        ));
        assert!(matches!(
            decoder.decode_text(r#"{"t":"tf","e":"XYZ","tk":"1"}"#),
            Err(CodecError::UnknownExchange(_))
        ));
        assert!(matches!(
            decoder.decode_text(r#"{"t":"tf","e":"NSE","tk":"1594","lp":"abc"}"#),
            Err(CodecError::InvalidField { .. })
        ));
        assert!(matches!(
            decoder.decode_text(r#"{"t":"df","e":"NSE","tk":"1594","ltt":"25:99"}"#),
            Err(CodecError::InvalidField { .. })
        ));
    }

    #[test]
    fn binary_frames_are_rejected() {
        let err = decoder().decode(RawFrame::Binary(&[1, 2, 3])).unwrap_err();
        assert!(matches!(err, CodecError::UnexpectedFrameKind("binary")));
    }
}
