//! Freshness ledger: id → time its metadata fetch was last started.

use chrono::{DateTime, Duration, Utc};
use menu_core::ItemId;
use std::collections::HashMap;

/// Default minimum interval between metadata fetches for one id.
pub const DEFAULT_FRESHNESS_WINDOW_MS: u64 = 5000;

#[derive(Debug)]
pub struct FreshnessLedger {
    window: Duration,
    entries: HashMap<ItemId, DateTime<Utc>>,
}

impl FreshnessLedger {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window: Duration::milliseconds(window_ms.min(i64::MAX as u64) as i64),
            entries: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn last_fetched(&self, id: &ItemId) -> Option<DateTime<Utc>> {
        self.entries.get(id).copied()
    }

    /// An id is fresh when it was marked no more than one window ago.
    pub fn is_fresh(&self, id: &ItemId, now: DateTime<Utc>) -> bool {
        self.entries
            .get(id)
            .is_some_and(|last| now - *last <= self.window)
    }

    /// Record a fetch start. Returns the previous entry for rollback.
    pub fn mark(&mut self, id: &ItemId, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries.insert(id.clone(), now)
    }

    /// Undo `mark` after a failed fetch, unless a later mark superseded it.
    pub fn rollback(
        &mut self,
        id: &ItemId,
        marked_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> bool {
        if self.entries.get(id) != Some(&marked_at) {
            return false;
        }
        match previous {
            Some(prev) => self.entries.insert(id.clone(), prev),
            None => self.entries.remove(id),
        };
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FreshnessLedger {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_WINDOW_MS)
    }
}
