//! View-model store.
//!
//! The authoritative table of resolved items. Every merge happens under a
//! single write lock and bumps a monotonically increasing version, so a
//! reader either sees a merge completely or not at all, and projections can
//! memoize on the version.

use chrono::{DateTime, Utc};
use menu_core::{Clock, Item, ItemId, MetadataRecord, Money, Tick};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Result of `apply_price_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Applied,
    /// No item for the id yet; nothing changed.
    Orphan,
}

/// Result of `apply_metadata`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataOutcome {
    Inserted,
    Refreshed,
}

/// Immutable copy of the store at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreSnapshot {
    pub version: u64,
    /// Items in first-insertion order.
    pub items: Vec<Item>,
}

impl StoreSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            items: Vec::new(),
        }
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    items: HashMap<ItemId, Item>,
    order: Vec<ItemId>,
    version: u64,
}

impl StoreInner {
    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    fn merge_metadata(&mut self, record: MetadataRecord, now: DateTime<Utc>) -> MetadataOutcome {
        match self.items.get_mut(&record.id) {
            Some(item) => {
                item.refresh_metadata(record, now);
                MetadataOutcome::Refreshed
            }
            None => {
                let id = record.id.clone();
                self.items.insert(id.clone(), Item::from_metadata(record, now));
                self.order.push(id);
                MetadataOutcome::Inserted
            }
        }
    }
}

/// In-memory item table with a single-writer merge contract.
pub struct ViewModelStore {
    inner: RwLock<StoreInner>,
    /// Mirror of `inner.version` for lock-free reads.
    version: AtomicU64,
    /// Last snapshot handed out, reused while the version is unchanged.
    cached: Mutex<Option<Arc<StoreSnapshot>>>,
    clock: Arc<dyn Clock>,
}

impl ViewModelStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            version: AtomicU64::new(0),
            cached: Mutex::new(None),
            clock,
        }
    }

    /// Insert a new item or refresh an existing one's metadata.
    ///
    /// Price and `created_at` of an existing item are never touched.
    pub fn apply_metadata(&self, record: MetadataRecord) -> MetadataOutcome {
        self.apply_resolution(record, None)
    }

    /// Merge a metadata record and, optionally, the price that was waiting
    /// for it, as one mutation.
    pub fn apply_resolution(&self, record: MetadataRecord, price: Option<Money>) -> MetadataOutcome {
        let now = self.clock.now();
        let id = record.id.clone();

        let mut inner = self.inner.write();
        let outcome = inner.merge_metadata(record, now);
        if let Some(price) = price {
            if let Some(item) = inner.items.get_mut(&id) {
                item.set_price(price, now);
            }
        }
        let version = inner.bump();
        self.version.store(version, Ordering::Release);
        drop(inner);

        debug!(item_id = %id, ?outcome, version, "Metadata applied");
        outcome
    }

    /// Merge a price tick into an existing item.
    ///
    /// Ticks for unknown ids are orphans and leave the store unchanged.
    pub fn apply_price_tick(&self, tick: &Tick) -> TickOutcome {
        let now = self.clock.now();

        let mut inner = self.inner.write();
        let Some(item) = inner.items.get_mut(&tick.id) else {
            return TickOutcome::Orphan;
        };
        item.set_price(tick.price.clone(), now);
        let version = inner.bump();
        self.version.store(version, Ordering::Release);

        TickOutcome::Applied
    }

    /// Current mutation version. Zero until the first merge.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.inner.read().items.contains_key(id)
    }

    pub fn get(&self, id: &ItemId) -> Option<Item> {
        self.inner.read().items.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    /// Consistent copy of every item at the current version.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        let inner = self.inner.read();

        let mut cached = self.cached.lock();
        if let Some(snapshot) = cached.as_ref() {
            if snapshot.version == inner.version {
                return snapshot.clone();
            }
        }

        let items = inner
            .order
            .iter()
            .filter_map(|id| inner.items.get(id).cloned())
            .collect();
        let snapshot = Arc::new(StoreSnapshot {
            version: inner.version,
            items,
        });
        *cached = Some(snapshot.clone());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use menu_core::{ItemType, ManualClock, Price};
    use rust_decimal_macros::dec;

    fn record(id: &str, name: &str) -> MetadataRecord {
        MetadataRecord {
            id: ItemId::new(id),
            name: name.to_string(),
            item_type: ItemType::Drink,
            description: String::new(),
            cuisine_country: "CZE".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            is_vegetarian: true,
            is_vegan: true,
            is_alcoholic: false,
        }
    }

    fn tick(id: &str, value: rust_decimal::Decimal) -> Tick {
        Tick::new(id, Money::new(Price::new(value), "CZK"))
    }

    fn store_at(ms: i64) -> (ViewModelStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(ms));
        (ViewModelStore::new(clock.clone()), clock)
    }

    #[test]
    fn test_orphan_tick_leaves_store_unchanged() {
        let (store, _clock) = store_at(1_000);

        assert_eq!(store.apply_price_tick(&tick("a", dec!(10))), TickOutcome::Orphan);
        assert_eq!(store.version(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_repeated_tick_is_idempotent() {
        let (store, _clock) = store_at(1_000);
        store.apply_metadata(record("a", "Kofola"));
        store.apply_price_tick(&tick("a", dec!(35)));
        let once = store.snapshot().items.clone();

        for _ in 0..5 {
            store.apply_price_tick(&tick("a", dec!(35)));
        }
        assert_eq!(store.snapshot().items, once);
    }

    #[test]
    fn test_metadata_refresh_keeps_price_and_created_at() {
        let (store, clock) = store_at(1_000);
        assert_eq!(store.apply_metadata(record("a", "Kofola")), MetadataOutcome::Inserted);
        store.apply_price_tick(&tick("a", dec!(35)));

        clock.advance_ms(6_000);
        let mut renamed = record("a", "Kofola Original");
        renamed.created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(store.apply_metadata(renamed), MetadataOutcome::Refreshed);

        let item = store.get(&ItemId::new("a")).unwrap();
        assert_eq!(item.name, "Kofola Original");
        assert_eq!(item.created_at, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        assert_eq!(item.price.unwrap().value, Price::new(dec!(35)));
        assert_eq!(item.last_update.timestamp_millis(), 7_000);
    }

    #[test]
    fn test_snapshot_reflects_metadata_immediately() {
        let (store, clock) = store_at(42_000);
        let before = clock.now();
        store.apply_metadata(record("a", "Kofola"));

        let snapshot = store.snapshot();
        let item = snapshot.get(&ItemId::new("a")).unwrap();
        assert_eq!(item.name, "Kofola");
        assert!(item.last_update >= before);
        assert!(item.price.is_none());
    }

    #[test]
    fn test_resolution_applies_price_in_one_version() {
        let (store, _clock) = store_at(0);
        store.apply_resolution(
            record("a", "Kofola"),
            Some(Money::new(Price::new(dec!(39)), "CZK")),
        );

        assert_eq!(store.version(), 1);
        let item = store.get(&ItemId::new("a")).unwrap();
        assert_eq!(item.price.unwrap().value, Price::new(dec!(39)));
    }

    #[test]
    fn test_snapshot_preserves_insertion_order_and_caches() {
        let (store, _clock) = store_at(0);
        store.apply_metadata(record("c", "C"));
        store.apply_metadata(record("a", "A"));
        store.apply_metadata(record("b", "B"));

        let first = store.snapshot();
        let ids: Vec<_> = first.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(first.version, 3);

        let second = store.snapshot();
        assert!(Arc::ptr_eq(&first, &second));

        store.apply_price_tick(&tick("a", dec!(1)));
        let third = store.snapshot();
        assert_eq!(third.version, 4);
        assert!(first.get(&ItemId::new("a")).unwrap().price.is_none());
    }

    #[test]
    fn test_concurrent_readers_see_whole_merges() {
        let (store, _clock) = store_at(0);
        let store = Arc::new(store);
        store.apply_metadata(record("a", "A"));

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    store.apply_resolution(
                        record("a", &format!("name-{i}")),
                        Some(Money::new(Price::new(rust_decimal::Decimal::from(i)), "CZK")),
                    );
                }
            })
        };

        for _ in 0..500 {
            let snapshot = store.snapshot();
            let item = snapshot.get(&ItemId::new("a")).unwrap();
            if let Some(price) = &item.price {
                assert_eq!(item.name, format!("name-{}", price.value));
            }
        }
        writer.join().unwrap();
    }
}
