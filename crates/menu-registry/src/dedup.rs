//! Fetch deduplication.
//!
//! `FetchDeduplicator` owns the set of in-flight metadata requests. Within
//! one `resolve` call each distinct id is requested at most once, and ids
//! already pending from an earlier call are skipped rather than re-requested.
//! All requests of a call run concurrently, each under its own timeout, and
//! the caller gets the aggregate once every request has settled.

use crate::error::{RegistryError, RegistryResult};
use crate::source::DynMetadataSource;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use menu_core::{Clock, ItemId, MetadataRecord};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An in-flight metadata request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: ItemId,
    pub requested_at: DateTime<Utc>,
}

/// Aggregate outcome of one `resolve` call.
#[derive(Debug, Default)]
pub struct ResolveResults {
    /// One entry per requested id, in request order.
    pub results: Vec<(ItemId, RegistryResult<MetadataRecord>)>,
    /// Ids left to an earlier in-flight request.
    pub skipped: Vec<ItemId>,
}

impl ResolveResults {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&RegistryResult<MetadataRecord>> {
        self.results
            .iter()
            .find(|(rid, _)| rid == id)
            .map(|(_, result)| result)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &MetadataRecord> {
        self.results.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&ItemId, &RegistryError)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id, e)))
    }
}

/// Deduplicator counters.
#[derive(Debug, Default)]
pub struct DedupStats {
    pub issued_count: AtomicU64,
    pub succeeded_count: AtomicU64,
    pub failed_count: AtomicU64,
    pub timed_out_count: AtomicU64,
    pub skipped_count: AtomicU64,
}

impl DedupStats {
    pub fn issued(&self) -> u64 {
        self.issued_count.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded_count.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out_count.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_count.load(Ordering::Relaxed)
    }
}

/// Removes the pending entry when the request settles or is cancelled.
struct PendingGuard {
    pending: Arc<DashMap<ItemId, PendingRequest>>,
    id: ItemId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

/// Deduplicating front for a `MetadataSource`.
pub struct FetchDeduplicator {
    source: DynMetadataSource,
    pending: Arc<DashMap<ItemId, PendingRequest>>,
    request_timeout: Duration,
    clock: Arc<dyn Clock>,
    stats: DedupStats,
}

impl FetchDeduplicator {
    pub fn new(source: DynMetadataSource, request_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            pending: Arc::new(DashMap::new()),
            request_timeout,
            clock,
            stats: DedupStats::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn stats(&self) -> &DedupStats {
        &self.stats
    }

    pub fn is_pending(&self, id: &ItemId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Snapshot of in-flight requests.
    pub fn pending(&self) -> Vec<PendingRequest> {
        self.pending.iter().map(|e| e.value().clone()).collect()
    }

    /// Resolve metadata for `ids`.
    ///
    /// Cancelling the returned future releases every pending entry it took.
    pub async fn resolve(&self, ids: impl IntoIterator<Item = ItemId>) -> ResolveResults {
        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut claimed = Vec::new();
        let mut skipped = Vec::new();

        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.pending.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!(item_id = %id, "Fetch already pending, skipping");
                    skipped.push(id);
                }
                Entry::Vacant(slot) => {
                    slot.insert(PendingRequest {
                        id: id.clone(),
                        requested_at: now,
                    });
                    claimed.push(PendingGuard {
                        pending: self.pending.clone(),
                        id,
                    });
                }
            }
        }

        self.stats
            .issued_count
            .fetch_add(claimed.len() as u64, Ordering::Relaxed);
        self.stats
            .skipped_count
            .fetch_add(skipped.len() as u64, Ordering::Relaxed);

        if !claimed.is_empty() {
            info!(
                count = claimed.len(),
                skipped = skipped.len(),
                "Issuing metadata fetches"
            );
        }

        let requests = claimed.into_iter().map(|guard| self.fetch_one(guard));
        let results = join_all(requests).await;

        ResolveResults { results, skipped }
    }

    async fn fetch_one(&self, guard: PendingGuard) -> (ItemId, RegistryResult<MetadataRecord>) {
        let id = guard.id.clone();
        let result =
            match tokio::time::timeout(self.request_timeout, self.source.fetch(id.clone())).await {
                Ok(result) => result,
                Err(_) => {
                    self.stats.timed_out_count.fetch_add(1, Ordering::Relaxed);
                    Err(RegistryError::Timeout {
                        id: id.clone(),
                        timeout_ms: self.request_timeout.as_millis() as u64,
                    })
                }
            };

        match &result {
            Ok(_) => {
                self.stats.succeeded_count.fetch_add(1, Ordering::Relaxed);
                debug!(item_id = %id, "Metadata resolved");
            }
            Err(e) => {
                self.stats.failed_count.fetch_add(1, Ordering::Relaxed);
                warn!(item_id = %id, error = %e, "Metadata fetch failed");
            }
        }

        drop(guard);
        (id, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MockFailure, MockMetadataSource};
    use chrono::TimeZone;
    use menu_core::{ItemType, SystemClock};

    fn record(id: &str) -> MetadataRecord {
        MetadataRecord {
            id: ItemId::new(id),
            name: format!("Item {id}"),
            item_type: ItemType::Food,
            description: String::new(),
            cuisine_country: "CZE".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            is_vegetarian: false,
            is_vegan: false,
            is_alcoholic: false,
        }
    }

    fn dedup(source: Arc<MockMetadataSource>, timeout_ms: u64) -> FetchDeduplicator {
        FetchDeduplicator::new(
            source,
            Duration::from_millis(timeout_ms),
            Arc::new(SystemClock),
        )
    }

    fn ids(raw: &[&str]) -> Vec<ItemId> {
        raw.iter().map(|s| ItemId::new(*s)).collect()
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_one_call_fetch_once() {
        let source = Arc::new(MockMetadataSource::with_records([record("a")]));
        let dedup = dedup(source.clone(), 5000);

        let results = dedup.resolve(ids(&["a"; 10])).await;

        assert_eq!(source.call_count(), 1);
        assert_eq!(results.len(), 1);
        assert!(results.get(&ItemId::new("a")).unwrap().is_ok());
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_requests_run_concurrently() {
        let source = Arc::new(MockMetadataSource::with_records([
            record("a"),
            record("b"),
            record("c"),
        ]));
        source.set_delay(Duration::from_millis(50));
        let dedup = dedup(source.clone(), 5000);

        let results = dedup.resolve(ids(&["a", "b", "c"])).await;

        assert_eq!(results.succeeded().count(), 3);
        assert_eq!(source.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_pending_id_is_skipped_by_second_call() {
        let source = Arc::new(MockMetadataSource::with_records([record("a"), record("b")]));
        source.set_delay(Duration::from_millis(100));
        let dedup = Arc::new(dedup(source.clone(), 5000));

        let first = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.resolve(ids(&["a"])).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dedup.is_pending(&ItemId::new("a")));

        let second = dedup.resolve(ids(&["a", "b"])).await;
        assert_eq!(second.skipped, ids(&["a"]));
        assert_eq!(second.len(), 1);
        assert!(second.get(&ItemId::new("b")).unwrap().is_ok());

        let first = first.await.unwrap();
        assert!(first.get(&ItemId::new("a")).unwrap().is_ok());
        assert_eq!(source.calls_for(&ItemId::new("a")), 1);
        assert_eq!(dedup.stats().skipped(), 1);
    }

    #[tokio::test]
    async fn test_hanging_request_times_out_alone() {
        let source = Arc::new(MockMetadataSource::with_records([record("a"), record("b")]));
        source.fail("b", MockFailure::Hang);
        let dedup = dedup(source.clone(), 100);

        let results = dedup.resolve(ids(&["a", "b"])).await;

        assert!(results.get(&ItemId::new("a")).unwrap().is_ok());
        assert!(matches!(
            results.get(&ItemId::new("b")),
            Some(Err(RegistryError::Timeout { .. }))
        ));
        assert_eq!(dedup.stats().timed_out(), 1);
        assert!(!dedup.is_pending(&ItemId::new("b")));
    }

    #[tokio::test]
    async fn test_failures_are_reported_per_id() {
        let source = Arc::new(MockMetadataSource::with_records([record("a")]));
        source.fail("b", MockFailure::Status(503));
        let dedup = dedup(source.clone(), 5000);

        let results = dedup.resolve(ids(&["a", "b", "missing"])).await;

        let failed: Vec<_> = results.failed().map(|(id, e)| (id.clone(), e.reason())).collect();
        assert_eq!(
            failed,
            vec![
                (ItemId::new("b"), "http"),
                (ItemId::new("missing"), "not_found")
            ]
        );
        assert_eq!(dedup.stats().failed(), 2);
        assert_eq!(dedup.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_resolve_releases_pending() {
        let source = Arc::new(MockMetadataSource::with_records([record("a")]));
        source.fail("a", MockFailure::Hang);
        let dedup = Arc::new(dedup(source.clone(), 60_000));

        let task = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.resolve(ids(&["a"])).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dedup.is_pending(&ItemId::new("a")));

        task.abort();
        let _ = task.await;
        assert!(!dedup.is_pending(&ItemId::new("a")));
    }
}
