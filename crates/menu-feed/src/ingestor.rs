//! Stream ingestion.
//!
//! `StreamIngestor` is the single writer. For every tick it either merges
//! the price directly (metadata is fresh) or stamps the ledger and schedules
//! a metadata fetch (metadata is missing or stale). The ledger is stamped
//! before the fetch is issued, so duplicate ticks in the same burst do not
//! trigger duplicate fetches. Fetches run elsewhere; their settled results
//! come back through `complete_fetches`.

use crate::error::FeedResult;
use crate::ledger::{FreshnessLedger, DEFAULT_FRESHNESS_WINDOW_MS};
use crate::parser::TickParser;
use crate::store::{MetadataOutcome, TickOutcome, ViewModelStore};
use chrono::{DateTime, Utc};
use menu_core::{Clock, ItemId, Tick};
use menu_registry::ResolveResults;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ingestion policy.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Minimum interval between metadata fetches for one id.
    pub freshness_window_ms: u64,
    /// Keep the newest tick of an id whose first fetch is in flight and
    /// merge it once metadata arrives. When off, such ticks are dropped.
    pub replay_orphan_ticks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            freshness_window_ms: DEFAULT_FRESHNESS_WINDOW_MS,
            replay_orphan_ticks: true,
        }
    }
}

/// Ingestion counters. Shared with readers through `Arc`.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub messages: AtomicU64,
    pub malformed_messages: AtomicU64,
    pub invalid_ticks: AtomicU64,
    pub ticks_received: AtomicU64,
    pub ticks_applied: AtomicU64,
    pub fetches_requested: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub orphan_ticks_dropped: AtomicU64,
    pub orphan_ticks_buffered: AtomicU64,
    pub items_inserted: AtomicU64,
    pub items_refreshed: AtomicU64,
}

/// Plain copy of `IngestStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    pub messages: u64,
    pub malformed_messages: u64,
    pub invalid_ticks: u64,
    pub ticks_received: u64,
    pub ticks_applied: u64,
    pub fetches_requested: u64,
    pub fetch_failures: u64,
    pub orphan_ticks_dropped: u64,
    pub orphan_ticks_buffered: u64,
    pub items_inserted: u64,
    pub items_refreshed: u64,
}

impl IngestStats {
    fn inc(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        IngestStatsSnapshot {
            messages: load(&self.messages),
            malformed_messages: load(&self.malformed_messages),
            invalid_ticks: load(&self.invalid_ticks),
            ticks_received: load(&self.ticks_received),
            ticks_applied: load(&self.ticks_applied),
            fetches_requested: load(&self.fetches_requested),
            fetch_failures: load(&self.fetch_failures),
            orphan_ticks_dropped: load(&self.orphan_ticks_dropped),
            orphan_ticks_buffered: load(&self.orphan_ticks_buffered),
            items_inserted: load(&self.items_inserted),
            items_refreshed: load(&self.items_refreshed),
        }
    }
}

/// Outcome of ingesting one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Ids to hand to the fetch deduplicator, in first-seen order.
    pub fetch: Vec<ItemId>,
    /// Ticks decoded from the batch.
    pub received: usize,
    pub applied: usize,
    pub buffered: usize,
    pub dropped: usize,
    /// Tuples rejected by the parser.
    pub invalid: usize,
}

impl IngestReport {
    pub fn needs_fetch(&self) -> bool {
        !self.fetch.is_empty()
    }
}

/// Outcome of applying one set of fetch results.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub inserted: usize,
    pub refreshed: usize,
    /// Resolutions that also merged a waiting tick.
    pub priced: usize,
    /// Failed ids with their failure label.
    pub failed: Vec<(ItemId, &'static str)>,
}

/// Ledger state captured when a fetch is scheduled.
#[derive(Debug, Clone, Copy)]
struct FetchTicket {
    marked_at: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
}

/// Single-writer driver of the ledger and the store.
pub struct StreamIngestor {
    store: Arc<ViewModelStore>,
    ledger: FreshnessLedger,
    parser: TickParser,
    clock: Arc<dyn Clock>,
    config: IngestConfig,
    /// Scheduled fetches not yet settled.
    in_flight: HashMap<ItemId, FetchTicket>,
    /// Newest unmerged tick per in-flight id.
    pending_ticks: HashMap<ItemId, Tick>,
    stats: Arc<IngestStats>,
}

impl StreamIngestor {
    pub fn new(
        store: Arc<ViewModelStore>,
        parser: TickParser,
        clock: Arc<dyn Clock>,
        config: IngestConfig,
    ) -> Self {
        info!(
            freshness_window_ms = config.freshness_window_ms,
            replay_orphan_ticks = config.replay_orphan_ticks,
            "Stream ingestor created"
        );
        Self {
            store,
            ledger: FreshnessLedger::new(config.freshness_window_ms),
            parser,
            clock,
            config,
            in_flight: HashMap::new(),
            pending_ticks: HashMap::new(),
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn store(&self) -> &Arc<ViewModelStore> {
        &self.store
    }

    pub fn ledger(&self) -> &FreshnessLedger {
        &self.ledger
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_tick(&self, id: &ItemId) -> Option<&Tick> {
        self.pending_ticks.get(id)
    }

    /// Parse and ingest one raw push-channel message.
    ///
    /// A malformed message is counted and returned as an error; nothing is
    /// applied from it.
    pub fn ingest_message(&mut self, text: &str) -> FeedResult<IngestReport> {
        IngestStats::inc(&self.stats.messages, 1);
        let batch = match self.parser.parse(text) {
            Ok(batch) => batch,
            Err(e) => {
                IngestStats::inc(&self.stats.malformed_messages, 1);
                warn!(error = %e, "Dropping malformed message");
                return Err(e);
            }
        };

        let invalid = batch.rejected.len();
        IngestStats::inc(&self.stats.invalid_ticks, invalid as u64);

        let mut report = self.ingest_batch(batch.ticks);
        report.invalid = invalid;
        Ok(report)
    }

    /// Ingest decoded ticks in arrival order.
    pub fn ingest_batch(&mut self, ticks: impl IntoIterator<Item = Tick>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut scheduled = HashSet::new();

        for tick in ticks {
            IngestStats::inc(&self.stats.ticks_received, 1);
            report.received += 1;
            let now = self.clock.now();

            // At most one unsettled fetch per id, so each failure owns its rollback.
            if !self.ledger.is_fresh(&tick.id, now) && !self.in_flight.contains_key(&tick.id) {
                let id = tick.id.clone();
                self.schedule_fetch(&id, now);
                self.pending_ticks.insert(id.clone(), tick);
                if scheduled.insert(id.clone()) {
                    report.fetch.push(id);
                }
                continue;
            }

            match self.store.apply_price_tick(&tick) {
                TickOutcome::Applied => {
                    // A newer price supersedes anything waiting for replay.
                    self.pending_ticks.remove(&tick.id);
                    IngestStats::inc(&self.stats.ticks_applied, 1);
                    report.applied += 1;
                }
                TickOutcome::Orphan => {
                    if self.config.replay_orphan_ticks && self.in_flight.contains_key(&tick.id) {
                        debug!(item_id = %tick.id, "Buffering tick until metadata resolves");
                        IngestStats::inc(&self.stats.orphan_ticks_buffered, 1);
                        self.pending_ticks.insert(tick.id.clone(), tick);
                        report.buffered += 1;
                    } else {
                        debug!(item_id = %tick.id, "Dropping orphan tick");
                        IngestStats::inc(&self.stats.orphan_ticks_dropped, 1);
                        report.dropped += 1;
                    }
                }
            }
        }

        if report.needs_fetch() {
            IngestStats::inc(&self.stats.fetches_requested, report.fetch.len() as u64);
            debug!(count = report.fetch.len(), "Metadata fetch scheduled");
        }
        report
    }

    fn schedule_fetch(&mut self, id: &ItemId, now: DateTime<Utc>) {
        let previous = self.ledger.mark(id, now);
        self.in_flight.insert(
            id.clone(),
            FetchTicket {
                marked_at: now,
                previous,
            },
        );
    }

    /// Apply settled fetch results.
    ///
    /// Success merges the record together with the waiting tick. Failure
    /// rolls the ledger back so the next tick retries, and drops the tick.
    pub fn complete_fetches(&mut self, results: ResolveResults) -> CompletionReport {
        let mut report = CompletionReport::default();

        for (id, result) in results.results {
            let ticket = self.in_flight.remove(&id);
            match result {
                Ok(record) => {
                    let price = self.pending_ticks.remove(&id).map(|t| t.price);
                    if price.is_some() {
                        report.priced += 1;
                    }
                    match self.store.apply_resolution(record, price) {
                        MetadataOutcome::Inserted => {
                            IngestStats::inc(&self.stats.items_inserted, 1);
                            report.inserted += 1;
                        }
                        MetadataOutcome::Refreshed => {
                            IngestStats::inc(&self.stats.items_refreshed, 1);
                            report.refreshed += 1;
                        }
                    }
                }
                Err(e) => {
                    IngestStats::inc(&self.stats.fetch_failures, 1);
                    if let Some(ticket) = ticket {
                        self.ledger.rollback(&id, ticket.marked_at, ticket.previous);
                    }
                    self.pending_ticks.remove(&id);
                    warn!(item_id = %id, error = %e, "Metadata fetch failed, will retry on next tick");
                    report.failed.push((id, e.reason()));
                }
            }
        }

        if !results.skipped.is_empty() {
            debug!(
                count = results.skipped.len(),
                "Ids left to earlier in-flight fetches"
            );
        }
        report
    }
}
