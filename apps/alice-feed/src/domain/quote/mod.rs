//! Quote Aggregation
//!
//! Per-instrument tick and depth state built from partial feed updates.
//!
//! # Sticky Merge
//!
//! The venue sends a full record on subscribe and then only the fields that
//! changed. Every decoded frame becomes a [`QuoteUpdate`] where absent fields
//! are `None`; merging copies each present field over the stored value and
//! leaves every other field untouched. Merging the same update twice gives
//! the same state as merging it once.
//!
//! # Depth Levels
//!
//! Depth is five levels per side. Slot 0 is the best price and is mirrored
//! into the tick view as best bid/ask. Slots are addressed by index and
//! never reordered.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use super::instrument::{Instrument, InstrumentKey};
use super::streaming::{FeedEvent, QuoteCategory};

/// Number of depth levels per side.
pub const DEPTH_LEVELS: usize = 5;

// =============================================================================
// Updates
// =============================================================================

/// Tick-level fields of a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickUpdate {
    /// Last traded price.
    pub ltp: Option<Decimal>,
    /// Percent change from the previous close.
    pub percent_change: Option<Decimal>,
    /// Absolute change from the previous close.
    pub change_value: Option<Decimal>,
    /// Traded volume for the session.
    pub volume: Option<u64>,
    /// Session open.
    pub open: Option<Decimal>,
    /// Session high.
    pub high: Option<Decimal>,
    /// Session low.
    pub low: Option<Decimal>,
    /// Previous close.
    pub close: Option<Decimal>,
    /// Average traded price.
    pub average_price: Option<Decimal>,
    /// Minimum price increment.
    pub tick_increment: Option<Decimal>,
    /// Contract lot size.
    pub lot_size: Option<u32>,
    /// Number of decimals prices are quoted with.
    pub price_precision: Option<u32>,
    /// Total open interest.
    pub total_open_interest: Option<u64>,
    /// Exchange feed time.
    pub exchange_timestamp: Option<DateTime<Utc>>,
}

/// One depth level of a partial update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelUpdate {
    /// Level price.
    pub price: Option<Decimal>,
    /// Level quantity.
    pub quantity: Option<u64>,
    /// Number of orders at the level.
    pub orders: Option<u32>,
}

/// Depth-only scalar fields of a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookUpdate {
    /// Open interest.
    pub open_interest: Option<u64>,
    /// Open interest at session start.
    pub initial_open_interest: Option<u64>,
    /// Last traded quantity.
    pub last_traded_quantity: Option<u64>,
    /// Last traded time (exchange local time of day).
    pub last_traded_time: Option<NaiveTime>,
    /// Total buy quantity.
    pub total_buy_quantity: Option<u64>,
    /// Total sell quantity.
    pub total_sell_quantity: Option<u64>,
    /// Upper circuit limit.
    pub upper_circuit: Option<Decimal>,
    /// Lower circuit limit.
    pub lower_circuit: Option<Decimal>,
}

/// A decoded partial update for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteUpdate {
    /// Tick-level fields.
    pub tick: TickUpdate,
    /// Bid levels, best first.
    pub bids: [LevelUpdate; DEPTH_LEVELS],
    /// Ask levels, best first.
    pub asks: [LevelUpdate; DEPTH_LEVELS],
    /// Depth-only scalars.
    pub book: BookUpdate,
}

// =============================================================================
// Snapshots
// =============================================================================

/// Merged tick view of an instrument.
///
/// Scalars start at zero and best bid/ask start absent until the venue
/// reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSnapshot {
    /// Instrument this view belongs to.
    pub instrument: Arc<Instrument>,
    /// Last traded price.
    pub ltp: Decimal,
    /// Percent change from the previous close.
    pub percent_change: Decimal,
    /// Absolute change from the previous close.
    pub change_value: Decimal,
    /// Traded volume for the session.
    pub volume: u64,
    /// Session open.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Previous close.
    pub close: Decimal,
    /// Average traded price.
    pub average_price: Decimal,
    /// Minimum price increment.
    pub tick_increment: Decimal,
    /// Contract lot size.
    pub lot_size: u32,
    /// Number of decimals prices are quoted with.
    pub price_precision: u32,
    /// Total open interest.
    pub total_open_interest: u64,
    /// Exchange feed time.
    pub exchange_timestamp: Option<DateTime<Utc>>,
    /// Best bid price (depth slot 0).
    pub best_bid_price: Option<Decimal>,
    /// Best bid quantity (depth slot 0).
    pub best_bid_quantity: Option<u64>,
    /// Best ask price (depth slot 0).
    pub best_ask_price: Option<Decimal>,
    /// Best ask quantity (depth slot 0).
    pub best_ask_quantity: Option<u64>,
}

impl TickSnapshot {
    /// Create an empty view for an instrument.
    #[must_use]
    pub const fn new(instrument: Arc<Instrument>) -> Self {
        Self {
            instrument,
            ltp: Decimal::ZERO,
            percent_change: Decimal::ZERO,
            change_value: Decimal::ZERO,
            volume: 0,
            open: Decimal::ZERO,
            high: Decimal::ZERO,
            low: Decimal::ZERO,
            close: Decimal::ZERO,
            average_price: Decimal::ZERO,
            tick_increment: Decimal::ZERO,
            lot_size: 0,
            price_precision: 0,
            total_open_interest: 0,
            exchange_timestamp: None,
            best_bid_price: None,
            best_bid_quantity: None,
            best_ask_price: None,
            best_ask_quantity: None,
        }
    }

    fn apply(&mut self, update: &TickUpdate) {
        keep(&mut self.ltp, update.ltp);
        keep(&mut self.percent_change, update.percent_change);
        keep(&mut self.change_value, update.change_value);
        keep(&mut self.volume, update.volume);
        keep(&mut self.open, update.open);
        keep(&mut self.high, update.high);
        keep(&mut self.low, update.low);
        keep(&mut self.close, update.close);
        keep(&mut self.average_price, update.average_price);
        keep(&mut self.tick_increment, update.tick_increment);
        keep(&mut self.lot_size, update.lot_size);
        keep(&mut self.price_precision, update.price_precision);
        keep(&mut self.total_open_interest, update.total_open_interest);
        keep_some(&mut self.exchange_timestamp, update.exchange_timestamp);
    }

    fn mirror_best(&mut self, depth: &DepthSnapshot) {
        self.best_bid_price = depth.bids[0].price;
        self.best_bid_quantity = depth.bids[0].quantity;
        self.best_ask_price = depth.asks[0].price;
        self.best_ask_quantity = depth.asks[0].quantity;
    }
}

/// One level of the merged depth view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthLevel {
    /// Level price.
    pub price: Option<Decimal>,
    /// Level quantity.
    pub quantity: Option<u64>,
    /// Number of orders at the level.
    pub orders: Option<u32>,
}

impl DepthLevel {
    fn apply(&mut self, update: &LevelUpdate) {
        keep_some(&mut self.price, update.price);
        keep_some(&mut self.quantity, update.quantity);
        keep_some(&mut self.orders, update.orders);
    }
}

/// Merged depth view of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthSnapshot {
    /// Instrument this view belongs to.
    pub instrument: Arc<Instrument>,
    /// Bid levels, best first.
    pub bids: [DepthLevel; DEPTH_LEVELS],
    /// Ask levels, best first.
    pub asks: [DepthLevel; DEPTH_LEVELS],
    /// Open interest.
    pub open_interest: u64,
    /// Open interest at session start.
    pub initial_open_interest: u64,
    /// Last traded quantity.
    pub last_traded_quantity: u64,
    /// Last traded time (exchange local time of day).
    pub last_traded_time: Option<NaiveTime>,
    /// Total buy quantity.
    pub total_buy_quantity: u64,
    /// Total sell quantity.
    pub total_sell_quantity: u64,
    /// Upper circuit limit.
    pub upper_circuit: Decimal,
    /// Lower circuit limit.
    pub lower_circuit: Decimal,
}

impl DepthSnapshot {
    /// Create an empty view for an instrument.
    #[must_use]
    pub fn new(instrument: Arc<Instrument>) -> Self {
        Self {
            instrument,
            bids: [DepthLevel::default(); DEPTH_LEVELS],
            asks: [DepthLevel::default(); DEPTH_LEVELS],
            open_interest: 0,
            initial_open_interest: 0,
            last_traded_quantity: 0,
            last_traded_time: None,
            total_buy_quantity: 0,
            total_sell_quantity: 0,
            upper_circuit: Decimal::ZERO,
            lower_circuit: Decimal::ZERO,
        }
    }

    fn apply(&mut self, update: &QuoteUpdate) {
        for (level, change) in self.bids.iter_mut().zip(&update.bids) {
            level.apply(change);
        }
        for (level, change) in self.asks.iter_mut().zip(&update.asks) {
            level.apply(change);
        }

        let book = &update.book;
        keep(&mut self.open_interest, book.open_interest);
        keep(&mut self.initial_open_interest, book.initial_open_interest);
        keep(&mut self.last_traded_quantity, book.last_traded_quantity);
        keep_some(&mut self.last_traded_time, book.last_traded_time);
        keep(&mut self.total_buy_quantity, book.total_buy_quantity);
        keep(&mut self.total_sell_quantity, book.total_sell_quantity);
        keep(&mut self.upper_circuit, book.upper_circuit);
        keep(&mut self.lower_circuit, book.lower_circuit);
    }
}

/// Tick and depth views delivered together for depth frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketDepth {
    /// Merged tick view.
    pub tick: TickSnapshot,
    /// Merged depth view.
    pub depth: DepthSnapshot,
}

/// Open interest view of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInterestSnapshot {
    /// Instrument this view belongs to.
    pub instrument: Arc<Instrument>,
    /// Open interest.
    pub open_interest: u64,
    /// Open interest at session start.
    pub initial_open_interest: u64,
    /// Total open interest.
    pub total_open_interest: u64,
    /// Exchange feed time.
    pub exchange_timestamp: Option<DateTime<Utc>>,
}

/// Circuit price band view of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceBandSnapshot {
    /// Instrument this view belongs to.
    pub instrument: Arc<Instrument>,
    /// Upper circuit limit.
    pub upper_circuit: Decimal,
    /// Lower circuit limit.
    pub lower_circuit: Decimal,
    /// Exchange feed time.
    pub exchange_timestamp: Option<DateTime<Utc>>,
}

fn keep<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn keep_some<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

// =============================================================================
// Quote Book
// =============================================================================

#[derive(Debug)]
struct InstrumentQuotes {
    tick: TickSnapshot,
    depth: DepthSnapshot,
}

impl InstrumentQuotes {
    fn new(instrument: &Arc<Instrument>) -> Self {
        Self {
            tick: TickSnapshot::new(Arc::clone(instrument)),
            depth: DepthSnapshot::new(Arc::clone(instrument)),
        }
    }

    fn event(&self, category: QuoteCategory) -> FeedEvent {
        match category {
            QuoteCategory::Tick => FeedEvent::Tick(self.tick.clone()),
            QuoteCategory::Depth => FeedEvent::Depth(MarketDepth {
                tick: self.tick.clone(),
                depth: self.depth.clone(),
            }),
            QuoteCategory::OpenInterest => FeedEvent::OpenInterest(OpenInterestSnapshot {
                instrument: Arc::clone(&self.tick.instrument),
                open_interest: self.depth.open_interest,
                initial_open_interest: self.depth.initial_open_interest,
                total_open_interest: self.tick.total_open_interest,
                exchange_timestamp: self.tick.exchange_timestamp,
            }),
            QuoteCategory::PriceBand => FeedEvent::PriceBand(PriceBandSnapshot {
                instrument: Arc::clone(&self.tick.instrument),
                upper_circuit: self.depth.upper_circuit,
                lower_circuit: self.depth.lower_circuit,
                exchange_timestamp: self.tick.exchange_timestamp,
            }),
        }
    }
}

/// Latest merged quotes for every instrument seen on the feed.
///
/// Merges take the write lock for the whole update, so readers always see a
/// fully applied state.
#[derive(Debug, Default)]
pub struct QuoteBook {
    entries: RwLock<HashMap<InstrumentKey, InstrumentQuotes>>,
}

impl QuoteBook {
    /// Create an empty quote book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update and return the resulting view for `category`.
    ///
    /// Tick fields are applied before depth fields, and the best bid/ask in
    /// the tick view always reflects depth slot 0 after the merge.
    pub fn merge(
        &self,
        instrument: &Arc<Instrument>,
        category: QuoteCategory,
        update: &QuoteUpdate,
    ) -> FeedEvent {
        let mut entries = self.entries.write();
        let quotes = entries
            .entry(instrument.key())
            .or_insert_with(|| InstrumentQuotes::new(instrument));

        quotes.tick.apply(&update.tick);
        quotes.depth.apply(update);
        quotes.tick.mirror_best(&quotes.depth);

        quotes.event(category)
    }

    /// Latest tick view of an instrument.
    #[must_use]
    pub fn tick(&self, key: &InstrumentKey) -> Option<TickSnapshot> {
        self.entries.read().get(key).map(|quotes| quotes.tick.clone())
    }

    /// Latest depth view of an instrument.
    #[must_use]
    pub fn depth(&self, key: &InstrumentKey) -> Option<DepthSnapshot> {
        self.entries.read().get(key).map(|quotes| quotes.depth.clone())
    }

    /// Latest tick and depth views of an instrument, read together.
    #[must_use]
    pub fn market_depth(&self, key: &InstrumentKey) -> Option<MarketDepth> {
        self.entries.read().get(key).map(|quotes| MarketDepth {
            tick: quotes.tick.clone(),
            depth: quotes.depth.clone(),
        })
    }

    /// Instruments that have received at least one update.
    #[must_use]
    pub fn instruments(&self) -> Vec<Arc<Instrument>> {
        self.entries
            .read()
            .values()
            .map(|quotes| Arc::clone(&quotes.tick.instrument))
            .collect()
    }

    /// Number of instruments with state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no instrument has state yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
