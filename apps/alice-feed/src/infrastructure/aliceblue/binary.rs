//! Binary Feed Decoder
//!
//! Decodes the venue's binary WebSocket frames. Every frame is one record:
//! a mode byte followed by a fixed big-endian layout. Prices are integers
//! scaled by the exchange price multiplier (see
//! [`Exchange::price_multiplier`]).
//!
//! | Mode | Record                  | Category          |
//! |------|-------------------------|-------------------|
//! | 1    | Market data             | tick              |
//! | 2    | Compact market data     | tick              |
//! | 3    | Snap quote              | depth             |
//! | 4    | Full snap quote         | depth             |
//! | 5, 6 | Spread records          | deprecated        |
//! | 7    | Daily price range       | price band        |
//! | 8    | Open interest           | open interest     |
//! | 9    | Market status           | market status     |
//! | 10   | Exchange message        | exchange message  |
//!
//! Bytes after the end of a fixed layout are ignored.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use rust_decimal::Decimal;

use super::codec::{CodecError, DecodedFrame, FrameDecoder, RawFrame};
use crate::domain::instrument::{Exchange, Instrument, InstrumentResolver};
use crate::domain::quote::{DEPTH_LEVELS, QuoteUpdate};
use crate::domain::streaming::{ExchangeNotice, MarketStatus, QuoteCategory};

/// Offset of exchange local time (IST) from UTC, in seconds.
const EXCHANGE_UTC_OFFSET_SECS: i32 = 19_800;

/// Decoder for the binary feed.
pub struct BinaryDecoder {
    resolver: Arc<dyn InstrumentResolver>,
}

impl BinaryDecoder {
    /// Create a decoder that resolves instruments through `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn InstrumentResolver>) -> Self {
        Self { resolver }
    }

    /// Decode a binary record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is empty, truncated, of an unknown or
    /// deprecated mode, or refers to an unknown exchange or instrument.
    pub fn decode_bytes(&self, data: &[u8]) -> Result<DecodedFrame, CodecError> {
        let mode = *data.first().ok_or(CodecError::EmptyFrame)?;
        let mut reader = RecordReader::new(mode, data);

        match mode {
            1 => self.market_data(&mut reader),
            2 => self.compact_market_data(&mut reader),
            3 => self.snap_quote(&mut reader),
            4 => self.full_snap_quote(&mut reader),
            5 | 6 => Err(CodecError::DeprecatedMode(mode)),
            7 => self.price_band(&mut reader),
            8 => self.open_interest(&mut reader),
            9 => Self::market_status(&mut reader),
            10 => Self::exchange_message(&mut reader),
            other => Err(CodecError::UnknownMode(other)),
        }
    }

    fn instrument(&self, reader: &mut RecordReader<'_>) -> Result<Arc<Instrument>, CodecError> {
        let exchange = reader.exchange()?;
        let token = reader.u32()?;
        self.resolver
            .resolve(exchange, token)
            .ok_or(CodecError::UnknownInstrument { exchange, token })
    }

    fn market_data(&self, reader: &mut RecordReader<'_>) -> Result<DecodedFrame, CodecError> {
        let instrument = self.instrument(reader)?;
        let exchange = instrument.exchange;
        let mut update = QuoteUpdate::default();

        update.tick.ltp = Some(price(reader.u32()?, exchange));
        update.book.last_traded_time = exchange_time_of_day(reader.u32()?);
        update.book.last_traded_quantity = Some(u64::from(reader.u32()?));
        update.tick.volume = Some(u64::from(reader.u32()?));
        update.bids[0].price = Some(price(reader.u32()?, exchange));
        update.bids[0].quantity = Some(u64::from(reader.u32()?));
        update.asks[0].price = Some(price(reader.u32()?, exchange));
        update.asks[0].quantity = Some(u64::from(reader.u32()?));
        update.book.total_buy_quantity = Some(reader.u64()?);
        update.book.total_sell_quantity = Some(reader.u64()?);
        update.tick.average_price = Some(price(reader.u32()?, exchange));
        update.tick.exchange_timestamp = timestamp(reader.u32()?);
        update.tick.open = Some(price(reader.u32()?, exchange));
        update.tick.high = Some(price(reader.u32()?, exchange));
        update.tick.low = Some(price(reader.u32()?, exchange));
        update.tick.close = Some(price(reader.u32()?, exchange));
        // yearly high and low
        reader.skip(8)?;

        Ok(quote(QuoteCategory::Tick, instrument, update))
    }

    fn compact_market_data(
        &self,
        reader: &mut RecordReader<'_>,
    ) -> Result<DecodedFrame, CodecError> {
        let instrument = self.instrument(reader)?;
        let exchange = instrument.exchange;
        let mut update = QuoteUpdate::default();

        update.tick.ltp = Some(price(reader.u32()?, exchange));
        update.tick.change_value = Some(signed_price(reader.i32()?, exchange));
        update.tick.exchange_timestamp = timestamp(reader.u32()?);
        update.tick.volume = Some(u64::from(reader.u32()?));

        Ok(quote(QuoteCategory::Tick, instrument, update))
    }

    fn snap_quote(&self, reader: &mut RecordReader<'_>) -> Result<DecodedFrame, CodecError> {
        let instrument = self.instrument(reader)?;
        let mut update = QuoteUpdate::default();

        read_levels(reader, instrument.exchange, &mut update)?;
        update.tick.exchange_timestamp = timestamp(reader.u32()?);

        Ok(quote(QuoteCategory::Depth, instrument, update))
    }

    fn full_snap_quote(&self, reader: &mut RecordReader<'_>) -> Result<DecodedFrame, CodecError> {
        let instrument = self.instrument(reader)?;
        let exchange = instrument.exchange;
        let mut update = QuoteUpdate::default();

        read_levels(reader, exchange, &mut update)?;
        update.tick.average_price = Some(price(reader.u32()?, exchange));
        update.tick.open = Some(price(reader.u32()?, exchange));
        update.tick.high = Some(price(reader.u32()?, exchange));
        update.tick.low = Some(price(reader.u32()?, exchange));
        update.tick.close = Some(price(reader.u32()?, exchange));
        update.book.total_buy_quantity = Some(reader.u64()?);
        update.book.total_sell_quantity = Some(reader.u64()?);
        update.tick.volume = Some(u64::from(reader.u32()?));

        Ok(quote(QuoteCategory::Depth, instrument, update))
    }

    fn price_band(&self, reader: &mut RecordReader<'_>) -> Result<DecodedFrame, CodecError> {
        let instrument = self.instrument(reader)?;
        let exchange = instrument.exchange;
        let mut update = QuoteUpdate::default();

        update.tick.exchange_timestamp = timestamp(reader.u32()?);
        update.book.upper_circuit = Some(price(reader.u32()?, exchange));
        update.book.lower_circuit = Some(price(reader.u32()?, exchange));

        Ok(quote(QuoteCategory::PriceBand, instrument, update))
    }

    fn open_interest(&self, reader: &mut RecordReader<'_>) -> Result<DecodedFrame, CodecError> {
        let instrument = self.instrument(reader)?;
        let mut update = QuoteUpdate::default();

        update.book.open_interest = Some(u64::from(reader.u32()?));
        update.book.initial_open_interest = Some(u64::from(reader.u32()?));
        update.tick.exchange_timestamp = timestamp(reader.u32()?);

        Ok(quote(QuoteCategory::OpenInterest, instrument, update))
    }

    fn market_status(reader: &mut RecordReader<'_>) -> Result<DecodedFrame, CodecError> {
        let exchange = reader.exchange()?;
        let market_type = reader.text()?;
        let status = reader.text()?;

        Ok(DecodedFrame::MarketStatus(MarketStatus {
            exchange,
            market_type,
            status,
        }))
    }

    fn exchange_message(reader: &mut RecordReader<'_>) -> Result<DecodedFrame, CodecError> {
        let exchange = reader.exchange()?;
        let message = reader.text()?;
        let exchange_timestamp = timestamp(reader.u32()?);

        Ok(DecodedFrame::ExchangeMessage(ExchangeNotice {
            exchange,
            message,
            exchange_timestamp,
        }))
    }
}

impl FrameDecoder for BinaryDecoder {
    fn decode(&self, frame: RawFrame<'_>) -> Result<DecodedFrame, CodecError> {
        match frame {
            RawFrame::Binary(data) => self.decode_bytes(data),
            RawFrame::Text(_) => Err(CodecError::UnexpectedFrameKind("text")),
        }
    }
}

fn quote(
    category: QuoteCategory,
    instrument: Arc<Instrument>,
    update: QuoteUpdate,
) -> DecodedFrame {
    tracing::trace!(instrument = %instrument, category = ?category, "Decoded binary quote record");
    DecodedFrame::Quote {
        category,
        instrument,
        update: Box::new(update),
    }
}

/// Read the five-level book shared by both snap quote layouts.
fn read_levels(
    reader: &mut RecordReader<'_>,
    exchange: Exchange,
    update: &mut QuoteUpdate,
) -> Result<(), CodecError> {
    let buyers = reader.u32_levels()?;
    let bid_prices = reader.u32_levels()?;
    let bid_quantities = reader.u32_levels()?;
    let sellers = reader.u32_levels()?;
    let ask_prices = reader.u32_levels()?;
    let ask_quantities = reader.u32_levels()?;

    for level in 0..DEPTH_LEVELS {
        update.bids[level].orders = Some(buyers[level]);
        update.bids[level].price = Some(price(bid_prices[level], exchange));
        update.bids[level].quantity = Some(u64::from(bid_quantities[level]));
        update.asks[level].orders = Some(sellers[level]);
        update.asks[level].price = Some(price(ask_prices[level], exchange));
        update.asks[level].quantity = Some(u64::from(ask_quantities[level]));
    }

    Ok(())
}

/// Scale an integer wire price into rupees.
fn price(raw: u32, exchange: Exchange) -> Decimal {
    Decimal::from(raw) / Decimal::from(exchange.price_multiplier())
}

fn signed_price(raw: i32, exchange: Exchange) -> Decimal {
    Decimal::from(raw) / Decimal::from(exchange.price_multiplier())
}

/// Epoch seconds to UTC. Zero means the venue did not supply a time.
fn timestamp(seconds: u32) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::from(seconds), 0)
}

/// Epoch seconds to exchange local time of day.
fn exchange_time_of_day(seconds: u32) -> Option<NaiveTime> {
    let offset = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)?;
    timestamp(seconds).map(|at| at.with_timezone(&offset).time())
}

// =============================================================================
// Record Reader
// =============================================================================

/// Big-endian cursor over one record.
struct RecordReader<'a> {
    mode: u8,
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    /// Start reading after the mode byte.
    const fn new(mode: u8, data: &'a [u8]) -> Self {
        Self { mode, data, pos: 1 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let data = self.data;
        let end = self.pos + len;
        let bytes = data
            .get(self.pos..end)
            .ok_or(CodecError::Truncated {
                mode: self.mode,
                needed: end,
                available: data.len(),
            })?;
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.bytes(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn u32_levels(&mut self) -> Result<[u32; DEPTH_LEVELS], CodecError> {
        let mut levels = [0u32; DEPTH_LEVELS];
        for level in &mut levels {
            *level = self.u32()?;
        }
        Ok(levels)
    }

    fn exchange(&mut self) -> Result<Exchange, CodecError> {
        let code = self.u8()?;
        Exchange::from_binary_code(code).ok_or(CodecError::UnknownExchangeCode(code))
    }

    /// Length-prefixed text; padding NULs are stripped.
    fn text(&mut self) -> Result<String, CodecError> {
        let len = usize::from(self.u16()?);
        let bytes = self.bytes(len)?;
        Ok(String::from_utf8_lossy(bytes)
            .trim_end_matches('\0')
            .trim()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;
    use crate::domain::instrument::InstrumentDirectory;

    fn decoder() -> BinaryDecoder {
        let mut directory = InstrumentDirectory::new();
        directory.insert(Instrument::new(Exchange::Nse, 1594, "INFY-EQ"));
        directory.insert(Instrument::new(Exchange::Cds, 1234, "USDINR26OCTFUT"));
        directory.insert(Instrument::new(Exchange::Nfo, 35001, "INFY26OCTFUT"));
        BinaryDecoder::new(Arc::new(directory))
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// Builds a record from its fields.
    #[derive(Default)]
    struct Record(Vec<u8>);

    impl Record {
        fn new(mode: u8) -> Self {
            Self(vec![mode])
        }
        fn u8(mut self, v: u8) -> Self {
            self.0.push(v);
            self
        }
        fn u16(mut self, v: u16) -> Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn u32(mut self, v: u32) -> Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn i32(mut self, v: i32) -> Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn u64(mut self, v: u64) -> Self {
            self.0.extend_from_slice(&v.to_be_bytes());
            self
        }
        fn levels(self, values: [u32; 5]) -> Self {
            values.into_iter().fold(self, Self::u32)
        }
        fn text(self, s: &str) -> Self {
            let mut record = self.u16(u16::try_from(s.len()).unwrap());
            record.0.extend_from_slice(s.as_bytes());
            record
        }
    }

    fn market_data_record() -> Vec<u8> {
        Record::new(1)
            .u8(1)
            .u32(1594)
            .u32(146_455) // ltp
            .u32(1_728_459_120) // ltt
            .u32(25) // ltq
            .u32(7_397_051) // volume
            .u32(146_450) // best bid
            .u32(120)
            .u32(146_455) // best ask
            .u32(285)
            .u64(51_000)
            .u64(48_000)
            .u32(146_132) // atp
            .u32(1_728_459_121) // exchange ts
            .u32(145_000)
            .u32(147_000)
            .u32(144_510)
            .u32(145_845)
            .u32(199_999) // yearly high
            .u32(120_000) // yearly low
            .0
    }

    fn quote_of(frame: DecodedFrame) -> (QuoteCategory, Arc<Instrument>, QuoteUpdate) {
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
    fn decodes_market_data() {
        let (category, instrument, update) =
            quote_of(decoder().decode_bytes(&market_data_record()).unwrap());

        assert_eq!(category, QuoteCategory::Tick);
        assert_eq!(instrument.symbol, "INFY-EQ");
        assert_eq!(update.tick.ltp, Some(dec("1464.55")));
        assert_eq!(update.tick.volume, Some(7_397_051));
        assert_eq!(update.tick.average_price, Some(dec("1461.32")));
        assert_eq!(update.tick.close, Some(dec("1458.45")));
        assert_eq!(
            update.tick.exchange_timestamp,
            DateTime::from_timestamp(1_728_459_121, 0)
        );
        assert_eq!(update.bids[0].price, Some(dec("1464.50")));
        assert_eq!(update.asks[0].quantity, Some(285));
        assert_eq!(update.book.last_traded_quantity, Some(25));
        // 07:32:00 UTC is 13:02:00 IST
        assert_eq!(update.book.last_traded_time, NaiveTime::from_hms_opt(13, 2, 0));
        assert_eq!(update.book.total_sell_quantity, Some(48_000));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut record = market_data_record();
        record.extend_from_slice(&[0xde, 0xad]);
        assert!(decoder().decode_bytes(&record).is_ok());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let record = market_data_record();
        let err = decoder().decode_bytes(&record[..20]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                mode: 1,
                available: 20,
                ..
            }
        ));
    }

    #[test]
    fn currency_prices_use_larger_multiplier() {
        let record = Record::new(2)
            .u8(3)
            .u32(1234)
            .u32(838_825_000)
            .i32(-1_250_000)
            .u32(0)
            .u32(1_000)
            .0;
        let (_, _, update) = quote_of(decoder().decode_bytes(&record).unwrap());

        assert_eq!(update.tick.ltp, Some(dec("83.8825")));
        assert_eq!(update.tick.change_value, Some(dec("-0.125")));
        assert!(update.tick.exchange_timestamp.is_none());
        assert_eq!(update.tick.volume, Some(1_000));
    }

    #[test]
    fn decodes_snap_quote_levels_in_order() {
        let record = Record::new(3)
            .u8(1)
            .u32(1594)
            .levels([3, 5, 2, 1, 4])
            .levels([146_450, 146_445, 146_440, 146_435, 146_430])
            .levels([120, 80, 60, 40, 20])
            .levels([2, 2, 2, 2, 9])
            .levels([146_455, 146_460, 146_465, 146_470, 146_500])
            .levels([285, 10, 20, 30, 40])
            .u32(1_728_459_120)
            .0;
        let (category, _, update) = quote_of(decoder().decode_bytes(&record).unwrap());

        assert_eq!(category, QuoteCategory::Depth);
        assert_eq!(update.bids[0].price, Some(dec("1464.50")));
        assert_eq!(update.bids[0].orders, Some(3));
        assert_eq!(update.bids[4].price, Some(dec("1464.30")));
        assert_eq!(update.asks[0].quantity, Some(285));
        assert_eq!(update.asks[4].orders, Some(9));
        assert!(update.tick.ltp.is_none());
    }

    #[test]
    fn decodes_full_snap_quote() {
        let record = Record::new(4)
            .u8(2)
            .u32(35001)
            .levels([1; 5])
            .levels([146_450; 5])
            .levels([400; 5])
            .levels([1; 5])
            .levels([146_455; 5])
            .levels([800; 5])
            .u32(146_132)
            .u32(145_000)
            .u32(147_000)
            .u32(144_510)
            .u32(145_845)
            .u64(51_000)
            .u64(48_000)
            .u32(90_000)
            .0;
        let (category, instrument, update) = quote_of(decoder().decode_bytes(&record).unwrap());

        assert_eq!(category, QuoteCategory::Depth);
        assert_eq!(instrument.exchange, Exchange::Nfo);
        assert_eq!(update.tick.open, Some(dec("1450")));
        assert_eq!(update.tick.volume, Some(90_000));
        assert_eq!(update.asks[2].quantity, Some(800));
        assert_eq!(update.book.total_buy_quantity, Some(51_000));
    }

    #[test]
    fn decodes_price_band_and_open_interest() {
        let band = Record::new(7)
            .u8(1)
            .u32(1594)
            .u32(1_728_459_120)
            .u32(161_095)
            .u32(131_815)
            .0;
        let (category, _, update) = quote_of(decoder().decode_bytes(&band).unwrap());
        assert_eq!(category, QuoteCategory::PriceBand);
        assert_eq!(update.book.upper_circuit, Some(dec("1610.95")));
        assert_eq!(update.book.lower_circuit, Some(dec("1318.15")));

        let oi = Record::new(8)
            .u8(2)
            .u32(35001)
            .u32(1_200)
            .u32(1_000)
            .u32(1_728_459_120)
            .0;
        let (category, _, update) = quote_of(decoder().decode_bytes(&oi).unwrap());
        assert_eq!(category, QuoteCategory::OpenInterest);
        assert_eq!(update.book.open_interest, Some(1_200));
        assert_eq!(update.book.initial_open_interest, Some(1_000));
    }

    #[test]
    fn decodes_segment_messages() {
        let status = Record::new(9).u8(1).text("Normal Market").text("Open\0\0").0;
        assert_eq!(
            decoder().decode_bytes(&status).unwrap(),
            DecodedFrame::MarketStatus(MarketStatus {
                exchange: Exchange::Nse,
                market_type: "Normal Market".to_string(),
                status: "Open".to_string(),
            })
        );

        let message = Record::new(10)
            .u8(6)
            .text("Trading halted in XYZ")
            .u32(1_728_459_120)
            .0;
        let DecodedFrame::ExchangeMessage(notice) = decoder().decode_bytes(&message).unwrap()
        else {
            panic!("expected exchange message");
        };
        assert_eq!(notice.exchange, Exchange::Bse);
        assert_eq!(notice.message, "Trading halted in XYZ");
        assert!(notice.exchange_timestamp.is_some());
    }

    #[test]
    fn rejects_unsupported_records() {
        let decoder = decoder();
        assert!(matches!(decoder.decode_bytes(&[]), Err(CodecError::EmptyFrame)));
        assert!(matches!(decoder.decode_bytes(&[5, 1]), Err(CodecError::DeprecatedMode(5))));
        assert!(matches!(decoder.decode_bytes(&[6]), Err(CodecError::DeprecatedMode(6))));
        assert!(matches!(decoder.decode_bytes(&[11]), Err(CodecError::UnknownMode(11))));
        assert!(matches!(
            decoder.decode_bytes(&Record::new(8).u8(5).u32(1).0),
            Err(CodecError::UnknownExchangeCode(5))
        ));
        assert!(matches!(
            decoder.decode_bytes(&Record::new(8).u8(1).u32(42).0),
            Err(CodecError::UnknownInstrument { token: 42, .. })
        ));
        assert!(matches!(
            decoder.decode(RawFrame::Text("{}")),
            Err(CodecError::UnexpectedFrameKind("text"))
        ));
    }

    proptest! {
        #[test]
        fn scaled_price_round_trips_to_wire_value(raw in any::<u32>(), currency in any::<bool>()) {
            let exchange = if currency { Exchange::Cds } else { Exchange::Nse };
            let scaled = price(raw, exchange);
            prop_assert_eq!(scaled * Decimal::from(exchange.price_multiplier()), Decimal::from(raw));
        }
    }
}
