//! Event Dispatcher
//!
//! Routes each merged event to the one callback registered for its
//! category. Market status and exchange messages are also retained in
//! bounded logs that can be queried later.

use std::error::Error;

use super::message_log::MessageLog;
use crate::application::ports::FeedCallbacks;
use crate::domain::streaming::{ExchangeNotice, FeedEvent, MarketStatus};

/// Category-to-callback router.
#[derive(Debug)]
pub struct Dispatcher {
    callbacks: FeedCallbacks,
    market_status_log: MessageLog<MarketStatus>,
    exchange_log: MessageLog<ExchangeNotice>,
}

impl Dispatcher {
    /// Create a dispatcher whose message logs retain `log_capacity` entries.
    #[must_use]
    pub fn new(callbacks: FeedCallbacks, log_capacity: usize) -> Self {
        Self {
            callbacks,
            market_status_log: MessageLog::new(log_capacity),
            exchange_log: MessageLog::new(log_capacity),
        }
    }

    /// Deliver an event to its callback.
    pub fn dispatch(&self, event: &FeedEvent) {
        match event {
            FeedEvent::Tick(tick) => {
                if let Some(callback) = &self.callbacks.tick {
                    callback(tick);
                }
            }
            FeedEvent::Depth(depth) => {
                if let Some(callback) = &self.callbacks.depth {
                    callback(depth);
                }
            }
            FeedEvent::OpenInterest(open_interest) => {
                if let Some(callback) = &self.callbacks.open_interest {
                    callback(open_interest);
                }
            }
            FeedEvent::PriceBand(band) => {
                if let Some(callback) = &self.callbacks.price_band {
                    callback(band);
                }
            }
            FeedEvent::MarketStatus(status) => {
                self.market_status_log.push(status.clone());
                if let Some(callback) = &self.callbacks.market_status {
                    callback(status);
                }
            }
            FeedEvent::ExchangeMessage(notice) => {
                self.exchange_log.push(notice.clone());
                if let Some(callback) = &self.callbacks.exchange_message {
                    callback(notice);
                }
            }
        }
    }

    /// Notify that the feed connected.
    pub fn notify_connect(&self) {
        if let Some(callback) = &self.callbacks.connect {
            callback();
        }
    }

    /// Notify that the transport dropped.
    pub fn notify_disconnect(&self) {
        if let Some(callback) = &self.callbacks.disconnect {
            callback();
        }
    }

    /// Report an error the feed absorbed.
    pub fn notify_error(&self, error: &(dyn Error + 'static)) {
        if let Some(callback) = &self.callbacks.error {
            callback(error);
        }
    }

    /// Retained market status messages, oldest first.
    #[must_use]
    pub fn market_status_messages(&self) -> Vec<MarketStatus> {
        self.market_status_log.snapshot()
    }

    /// Retained exchange messages, oldest first.
    #[must_use]
    pub fn exchange_messages(&self) -> Vec<ExchangeNotice> {
        self.exchange_log.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::instrument::{Exchange, Instrument};
    use crate::domain::quote::{PriceBandSnapshot, TickSnapshot};

    fn instrument() -> Arc<Instrument> {
        Arc::new(Instrument::new(Exchange::Nse, 1594, "INFY-EQ"))
    }

    fn status(text: &str) -> MarketStatus {
        MarketStatus {
            exchange: Exchange::Nse,
            market_type: "Normal Market".to_string(),
            status: text.to_string(),
        }
    }

    #[test]
    fn routes_each_category_to_its_callback() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let bands = Arc::new(AtomicUsize::new(0));
        let callbacks = FeedCallbacks::new()
            .on_tick({
                let ticks = Arc::clone(&ticks);
                move |tick| {
                    assert_eq!(tick.instrument.token, 1594);
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_price_band({
                let bands = Arc::clone(&bands);
                move |band| {
                    assert_eq!(band.upper_circuit, Decimal::new(161_000, 2));
                    bands.fetch_add(1, Ordering::SeqCst);
                }
            });
        let dispatcher = Dispatcher::new(callbacks, 10);

        dispatcher.dispatch(&FeedEvent::Tick(TickSnapshot::new(instrument())));
        dispatcher.dispatch(&FeedEvent::PriceBand(PriceBandSnapshot {
            instrument: instrument(),
            upper_circuit: Decimal::new(161_000, 2),
            lower_circuit: Decimal::new(131_800, 2),
            exchange_timestamp: None,
        }));

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert_eq!(bands.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_callbacks_are_noops() {
        let dispatcher = Dispatcher::new(FeedCallbacks::new(), 10);
        dispatcher.dispatch(&FeedEvent::Tick(TickSnapshot::new(instrument())));
        dispatcher.notify_connect();
        dispatcher.notify_disconnect();
        dispatcher.notify_error(&std::io::Error::other("boom"));
    }

    #[test]
    fn segment_messages_are_logged_and_bounded() {
        let seen = Arc::new(AtomicUsize::new(0));
        let callbacks = FeedCallbacks::new().on_market_status({
            let seen = Arc::clone(&seen);
            move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        let dispatcher = Dispatcher::new(callbacks, 2);

        for text in ["Preopen", "Open", "Closed"] {
            dispatcher.dispatch(&FeedEvent::MarketStatus(status(text)));
        }
        dispatcher.dispatch(&FeedEvent::ExchangeMessage(ExchangeNotice {
            exchange: Exchange::Nse,
            message: "Trading halted".to_string(),
            exchange_timestamp: None,
        }));

        assert_eq!(seen.load(Ordering::SeqCst), 3);
        let statuses: Vec<String> = dispatcher
            .market_status_messages()
            .into_iter()
            .map(|s| s.status)
            .collect();
        assert_eq!(statuses, vec!["Open", "Closed"]);
        assert_eq!(dispatcher.exchange_messages().len(), 1);
    }

    #[test]
    fn lifecycle_and_error_callbacks() {
        let connects = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let callbacks = FeedCallbacks::new()
            .on_connect({
                let connects = Arc::clone(&connects);
                move || {
                    connects.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_error({
                let errors = Arc::clone(&errors);
                move |error| errors.lock().push(error.to_string())
            });
        let dispatcher = Dispatcher::new(callbacks, 10);

        dispatcher.notify_connect();
        dispatcher.notify_connect();
        dispatcher.notify_error(&std::io::Error::other("socket reset"));

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(errors.lock().as_slice(), ["socket reset".to_string()]);
    }
}
