//! Subscription Registry
//!
//! Tracks what the feed should be streaming: one mode per instrument plus
//! the segment-wide topics (market status, exchange messages).
//!
//! # Design
//!
//! The registry is the source of truth for resubscription. After every
//! reconnect the connection replays [`SubscriptionRegistry::group_by_mode`]
//! and [`SubscriptionRegistry::topics`], so the venue-side subscription set
//! always converges back to the registry contents.
//!
//! Entries are kept ordered by instrument key so the replay order is
//! deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::instrument::{Instrument, InstrumentKey};
use super::streaming::FeedMode;

// =============================================================================
// Types
// =============================================================================

/// A registered instrument subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Subscribed instrument.
    pub instrument: Arc<Instrument>,
    /// Subscription mode.
    pub mode: FeedMode,
}

/// Segment-wide topics that are not tied to an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentTopic {
    /// Market status messages.
    MarketStatus,
    /// Exchange broadcast messages.
    ExchangeMessages,
}

/// Changes produced by a registry update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionChanges {
    /// Instruments that were not registered before.
    pub added: Vec<Arc<Instrument>>,
    /// Instruments whose mode was replaced.
    pub mode_changed: Vec<Arc<Instrument>>,
}

impl SubscriptionChanges {
    /// Check if there are no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.mode_changed.is_empty()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of registered instruments.
    pub instruments: usize,
    /// Number of instruments per mode.
    pub by_mode: BTreeMap<FeedMode, usize>,
    /// Number of registered segment topics.
    pub topics: usize,
}

// =============================================================================
// Registry
// =============================================================================

/// Thread-safe subscription registry.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<BTreeMap<InstrumentKey, Subscription>>,
    topics: RwLock<BTreeSet<SegmentTopic>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instrument, replacing any previous mode.
    ///
    /// Returns the previous mode, if the instrument was registered.
    pub fn add(&self, instrument: Arc<Instrument>, mode: FeedMode) -> Option<FeedMode> {
        self.entries
            .write()
            .insert(instrument.key(), Subscription { instrument, mode })
            .map(|previous| previous.mode)
    }

    /// Register several instruments under one mode.
    pub fn add_all(&self, instruments: &[Arc<Instrument>], mode: FeedMode) -> SubscriptionChanges {
        let mut entries = self.entries.write();
        let mut changes = SubscriptionChanges::default();

        for instrument in instruments {
            let previous = entries.insert(
                instrument.key(),
                Subscription {
                    instrument: Arc::clone(instrument),
                    mode,
                },
            );
            match previous {
                None => changes.added.push(Arc::clone(instrument)),
                Some(previous) if previous.mode != mode => {
                    changes.mode_changed.push(Arc::clone(instrument));
                }
                Some(_) => {}
            }
        }

        changes
    }

    /// Remove an instrument, returning its subscription if it was registered.
    pub fn remove(&self, key: &InstrumentKey) -> Option<Subscription> {
        self.entries.write().remove(key)
    }

    /// Remove several instruments, returning the ones that were registered.
    pub fn remove_all(&self, instruments: &[Arc<Instrument>]) -> Vec<Subscription> {
        let mut entries = self.entries.write();
        instruments
            .iter()
            .filter_map(|instrument| entries.remove(&instrument.key()))
            .collect()
    }

    /// Mode an instrument is registered under.
    #[must_use]
    pub fn mode_of(&self, key: &InstrumentKey) -> Option<FeedMode> {
        self.entries.read().get(key).map(|entry| entry.mode)
    }

    /// Check if an instrument is registered.
    #[must_use]
    pub fn contains(&self, key: &InstrumentKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// All registered subscriptions, ordered by instrument key.
    #[must_use]
    pub fn list(&self) -> Vec<Subscription> {
        self.entries.read().values().cloned().collect()
    }

    /// Registered instruments grouped by mode, each group ordered by key.
    #[must_use]
    pub fn group_by_mode(&self) -> BTreeMap<FeedMode, Vec<Arc<Instrument>>> {
        let mut groups: BTreeMap<FeedMode, Vec<Arc<Instrument>>> = BTreeMap::new();
        for entry in self.entries.read().values() {
            groups
                .entry(entry.mode)
                .or_default()
                .push(Arc::clone(&entry.instrument));
        }
        groups
    }

    /// Group the given subscriptions by mode.
    #[must_use]
    pub fn group(subscriptions: &[Subscription]) -> BTreeMap<FeedMode, Vec<Arc<Instrument>>> {
        let mut groups: BTreeMap<FeedMode, Vec<Arc<Instrument>>> = BTreeMap::new();
        for entry in subscriptions {
            groups
                .entry(entry.mode)
                .or_default()
                .push(Arc::clone(&entry.instrument));
        }
        groups
    }

    /// Register a segment topic. Returns `true` if it was not registered.
    pub fn add_topic(&self, topic: SegmentTopic) -> bool {
        self.topics.write().insert(topic)
    }

    /// Remove a segment topic. Returns `true` if it was registered.
    pub fn remove_topic(&self, topic: SegmentTopic) -> bool {
        self.topics.write().remove(&topic)
    }

    /// Registered segment topics.
    #[must_use]
    pub fn topics(&self) -> Vec<SegmentTopic> {
        self.topics.read().iter().copied().collect()
    }

    /// Number of registered instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if no instrument is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let entries = self.entries.read();
        let mut by_mode = BTreeMap::new();
        for entry in entries.values() {
            *by_mode.entry(entry.mode).or_insert(0) += 1;
        }
        SubscriptionStats {
            instruments: entries.len(),
            by_mode,
            topics: self.topics.read().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::Exchange;

    fn instrument(exchange: Exchange, token: u32) -> Arc<Instrument> {
        Arc::new(Instrument::new(exchange, token, format!("SYM{token}")))
    }

    #[test]
    fn add_new_instrument() {
        let registry = SubscriptionRegistry::new();
        let infy = instrument(Exchange::Nse, 1594);

        assert_eq!(registry.add(Arc::clone(&infy), FeedMode::Tick), None);
        assert!(registry.contains(&infy.key()));
        assert_eq!(registry.mode_of(&infy.key()), Some(FeedMode::Tick));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn re_adding_replaces_mode() {
        let registry = SubscriptionRegistry::new();
        let infy = instrument(Exchange::Nse, 1594);

        registry.add(Arc::clone(&infy), FeedMode::Tick);
        assert_eq!(
            registry.add(Arc::clone(&infy), FeedMode::Depth),
            Some(FeedMode::Tick)
        );
        assert_eq!(registry.mode_of(&infy.key()), Some(FeedMode::Depth));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_all_reports_changes() {
        let registry = SubscriptionRegistry::new();
        let a = instrument(Exchange::Nse, 1);
        let b = instrument(Exchange::Nse, 2);
        registry.add(Arc::clone(&a), FeedMode::Tick);

        let changes = registry.add_all(&[Arc::clone(&a), Arc::clone(&b)], FeedMode::Depth);
        assert_eq!(changes.added, vec![Arc::clone(&b)]);
        assert_eq!(changes.mode_changed, vec![Arc::clone(&a)]);

        let unchanged = registry.add_all(&[a, b], FeedMode::Depth);
        assert!(unchanged.is_empty());
    }

    #[test]
    fn remove_returns_subscription() {
        let registry = SubscriptionRegistry::new();
        let infy = instrument(Exchange::Nse, 1594);
        registry.add(Arc::clone(&infy), FeedMode::Depth);

        let removed = registry.remove(&infy.key()).unwrap();
        assert_eq!(removed.mode, FeedMode::Depth);
        assert!(registry.is_empty());
        assert!(registry.remove(&infy.key()).is_none());
    }

    #[test]
    fn remove_all_skips_unregistered() {
        let registry = SubscriptionRegistry::new();
        let a = instrument(Exchange::Nse, 1);
        let b = instrument(Exchange::Nse, 2);
        registry.add(Arc::clone(&a), FeedMode::Tick);

        let removed = registry.remove_all(&[a, b]);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].instrument.token, 1);
    }

    #[test]
    fn group_by_mode_is_ordered() {
        let registry = SubscriptionRegistry::new();
        registry.add(instrument(Exchange::Nse, 22), FeedMode::Tick);
        registry.add(instrument(Exchange::Nfo, 35001), FeedMode::Depth);
        registry.add(instrument(Exchange::Nse, 1594), FeedMode::Tick);

        let groups = registry.group_by_mode();
        assert_eq!(groups.len(), 2);
        let ticks: Vec<u32> = groups[&FeedMode::Tick].iter().map(|i| i.token).collect();
        assert_eq!(ticks, vec![22, 1594]);
        assert_eq!(groups[&FeedMode::Depth][0].token, 35001);
    }

    #[test]
    fn group_of_removed_subscriptions() {
        let subscriptions = vec![
            Subscription {
                instrument: instrument(Exchange::Nse, 1),
                mode: FeedMode::Depth,
            },
            Subscription {
                instrument: instrument(Exchange::Nse, 2),
                mode: FeedMode::Tick,
            },
        ];
        let groups = SubscriptionRegistry::group(&subscriptions);
        assert_eq!(groups[&FeedMode::Depth].len(), 1);
        assert_eq!(groups[&FeedMode::Tick].len(), 1);
    }

    #[test]
    fn list_is_ordered_by_key() {
        let registry = SubscriptionRegistry::new();
        registry.add(instrument(Exchange::Nfo, 5), FeedMode::Tick);
        registry.add(instrument(Exchange::Nse, 9), FeedMode::Tick);
        registry.add(instrument(Exchange::Nse, 3), FeedMode::Tick);

        let keys: Vec<_> = registry
            .list()
            .iter()
            .map(|s| s.instrument.key().to_string())
            .collect();
        assert_eq!(keys, vec!["NSE|3", "NSE|9", "NFO|5"]);
    }

    #[test]
    fn topics_are_tracked_once() {
        let registry = SubscriptionRegistry::new();
        assert!(registry.add_topic(SegmentTopic::ExchangeMessages));
        assert!(!registry.add_topic(SegmentTopic::ExchangeMessages));
        assert!(registry.add_topic(SegmentTopic::MarketStatus));
        assert_eq!(
            registry.topics(),
            vec![SegmentTopic::MarketStatus, SegmentTopic::ExchangeMessages]
        );
        assert!(registry.remove_topic(SegmentTopic::MarketStatus));
        assert_eq!(registry.topics(), vec![SegmentTopic::ExchangeMessages]);
    }

    #[test]
    fn stats_are_accurate() {
        let registry = SubscriptionRegistry::new();
        registry.add(instrument(Exchange::Nse, 1), FeedMode::Tick);
        registry.add(instrument(Exchange::Nse, 2), FeedMode::Tick);
        registry.add(instrument(Exchange::Nse, 3), FeedMode::Depth);
        registry.add_topic(SegmentTopic::MarketStatus);

        let stats = registry.stats();
        assert_eq!(stats.instruments, 3);
        assert_eq!(stats.by_mode[&FeedMode::Tick], 2);
        assert_eq!(stats.by_mode[&FeedMode::Depth], 1);
        assert_eq!(stats.topics, 1);
    }

    #[test]
    fn thread_safety() {
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        let handles: Vec<_> = (0..10u32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for j in 0..100u32 {
                        registry.add(instrument(Exchange::Nse, i * 1000 + j), FeedMode::Tick);
                    }
                    for j in 0..50u32 {
                        registry.remove(&InstrumentKey::new(Exchange::Nse, i * 1000 + j));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 500);
    }
}
