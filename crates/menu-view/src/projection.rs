//! Projection engine: store snapshot + criteria → ordered rows.

use crate::criteria::{FilterSortCriteria, SortDirection};
use menu_core::Item;
use menu_feed::StoreSnapshot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Filter then sort a snapshot.
///
/// Pure: the same snapshot and criteria always give the same rows. The sort
/// is stable, so items with equal keys keep their store order in both
/// directions. Without a sort key the filtered rows come back in store order.
pub fn project(snapshot: &StoreSnapshot, criteria: &FilterSortCriteria) -> Vec<Item> {
    let mut rows: Vec<Item> = snapshot
        .items
        .iter()
        .filter(|item| criteria.matches(item))
        .cloned()
        .collect();

    if let Some(key) = criteria.sort_key {
        match criteria.sort_direction {
            SortDirection::Asc => rows.sort_by(|a, b| key.compare(a, b)),
            SortDirection::Desc => rows.sort_by(|a, b| key.compare(b, a)),
        }
    }
    rows
}

/// Rows produced for one (version, criteria) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub version: u64,
    pub criteria: FilterSortCriteria,
    pub items: Vec<Item>,
}

impl Projection {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Memoizing wrapper around [`project`].
///
/// Recomputes only when the snapshot version or the criteria differ from the
/// previous call.
#[derive(Debug, Default)]
pub struct ProjectionEngine {
    last: Mutex<Option<Arc<Projection>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProjectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(
        &self,
        snapshot: &StoreSnapshot,
        criteria: &FilterSortCriteria,
    ) -> Arc<Projection> {
        let mut last = self.last.lock();
        if let Some(cached) = last.as_ref() {
            if cached.version == snapshot.version && &cached.criteria == criteria {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return cached.clone();
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let projection = Arc::new(Projection {
            version: snapshot.version,
            criteria: criteria.clone(),
            items: project(snapshot, criteria),
        });
        *last = Some(projection.clone());
        projection
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{FieldFilter, ItemField};
    use chrono::{TimeZone, Utc};
    use menu_core::{ItemId, ItemType, Money, Price};
    use rust_decimal_macros::dec;

    fn item(id: &str, name: &str, price: Option<rust_decimal::Decimal>) -> Item {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        Item {
            id: ItemId::new(id),
            name: name.to_string(),
            item_type: ItemType::Food,
            description: String::new(),
            cuisine_country: "CZE".to_string(),
            price: price.map(|v| Money::new(Price::new(v), "CZK")),
            created_at: at,
            last_update: at,
            is_vegetarian: false,
            is_vegan: false,
            is_alcoholic: false,
        }
    }

    fn snapshot(version: u64, items: Vec<Item>) -> StoreSnapshot {
        StoreSnapshot { version, items }
    }

    fn ids(rows: &[Item]) -> Vec<&str> {
        rows.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_price_ascending_is_stable() {
        let snap = snapshot(
            1,
            vec![
                item("A", "Guláš", Some(dec!(10))),
                item("B", "Svíčková", Some(dec!(10))),
                item("C", "Knedlík", Some(dec!(5))),
            ],
        );
        let rows = project(&snap, &FilterSortCriteria::sorted(ItemField::Price, SortDirection::Asc));
        assert_eq!(ids(&rows), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_price_descending_keeps_ties_in_store_order() {
        let snap = snapshot(
            1,
            vec![
                item("A", "Guláš", Some(dec!(10))),
                item("B", "Svíčková", Some(dec!(10))),
                item("C", "Knedlík", Some(dec!(5))),
                item("D", "Chléb", None),
            ],
        );
        let rows = project(
            &snap,
            &FilterSortCriteria::sorted(ItemField::Price, SortDirection::Desc),
        );
        assert_eq!(ids(&rows), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_unpriced_items_sort_first_ascending() {
        let snap = snapshot(
            1,
            vec![item("A", "a", Some(dec!(1))), item("B", "b", None)],
        );
        let rows = project(&snap, &FilterSortCriteria::sorted(ItemField::Price, SortDirection::Asc));
        assert_eq!(ids(&rows), vec!["B", "A"]);
    }

    #[test]
    fn test_filter_matches_currency_case_insensitively() {
        let snap = snapshot(
            1,
            vec![item("A", "Pivo", Some(dec!(45))), item("B", "Voda", None)],
        );
        let rows = project(&snap, &FilterSortCriteria::filtered("czk"));
        assert_eq!(ids(&rows), vec!["A"]);

        let rows = project(&snap, &FilterSortCriteria::filtered("VODA"));
        assert_eq!(ids(&rows), vec!["B"]);
    }

    #[test]
    fn test_filter_matches_numeric_price() {
        let snap = snapshot(
            1,
            vec![item("A", "Pivo", Some(dec!(45.5))), item("B", "Voda", Some(dec!(20)))],
        );
        let rows = project(&snap, &FilterSortCriteria::filtered("45.5"));
        assert_eq!(ids(&rows), vec!["A"]);
    }

    #[test]
    fn test_filter_matches_flag_text() {
        let mut tofu = item("T", "Tofu", None);
        tofu.is_vegetarian = true;
        tofu.is_vegan = true;
        let snap = snapshot(1, vec![item("G", "Guláš", Some(dec!(159))), tofu]);

        let rows = project(&snap, &FilterSortCriteria::filtered("true"));
        assert_eq!(ids(&rows), vec!["T"]);
    }

    #[test]
    fn test_empty_criteria_is_passthrough() {
        let snap = snapshot(
            3,
            vec![item("c", "c", None), item("a", "a", None), item("b", "b", None)],
        );
        let rows = project(&snap, &FilterSortCriteria::default());
        assert_eq!(ids(&rows), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_field_filter_narrows_to_one_column() {
        let snap = snapshot(
            1,
            vec![item("pivo-1", "Voda", None), item("B", "Pivo", None)],
        );
        let criteria = FilterSortCriteria {
            field_filter: Some(FieldFilter {
                field: ItemField::Name,
                keyword: "pivo".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(ids(&project(&snap, &criteria)), vec!["B"]);

        // free text still spans every field
        assert_eq!(
            ids(&project(&snap, &FilterSortCriteria::filtered("pivo"))),
            vec!["pivo-1", "B"]
        );
    }

    #[test]
    fn test_engine_memoizes_on_version_and_criteria() {
        let engine = ProjectionEngine::new();
        let criteria = FilterSortCriteria::sorted(ItemField::Name, SortDirection::Asc);
        let snap = snapshot(7, vec![item("b", "b", None), item("a", "a", None)]);

        let first = engine.project(&snap, &criteria);
        let second = engine.project(&snap, &criteria);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!((engine.hits(), engine.misses()), (1, 1));

        let newer = snapshot(8, vec![item("b", "b", None)]);
        let third = engine.project(&newer, &criteria);
        assert_eq!(third.len(), 1);
        assert_eq!(engine.misses(), 2);

        let flipped = FilterSortCriteria::sorted(ItemField::Name, SortDirection::Desc);
        engine.project(&newer, &flipped);
        assert_eq!(engine.misses(), 3);
    }
}
