//! Dashboard state management.
//!
//! DashboardState reads the store and ingest counters for the HTTP and
//! WebSocket handlers. It never writes to the store.

use std::sync::Arc;

use menu_core::Clock;
use menu_feed::{IngestStats, ViewModelStore};
use menu_view::{FilterSortCriteria, ProjectionEngine, COLUMNS};

use crate::types::{ColumnDef, ItemRow, ItemsResponse, StatsSnapshot};

#[derive(Clone)]
pub struct DashboardState {
    store: Arc<ViewModelStore>,
    /// Shared memo for REST queries; WebSocket clients keep their own.
    engine: Arc<ProjectionEngine>,
    ingest_stats: Option<Arc<IngestStats>>,
    clock: Arc<dyn Clock>,
}

impl DashboardState {
    pub fn new(store: Arc<ViewModelStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            engine: Arc::new(ProjectionEngine::new()),
            ingest_stats: None,
            clock,
        }
    }

    pub fn with_ingest_stats(mut self, stats: Arc<IngestStats>) -> Self {
        self.ingest_stats = Some(stats);
        self
    }

    pub fn store_version(&self) -> u64 {
        self.store.version()
    }

    /// Project the current snapshot through the shared engine.
    pub fn items(&self, criteria: &FilterSortCriteria) -> ItemsResponse {
        self.items_with(&self.engine, criteria)
    }

    /// Project the current snapshot through a caller-owned engine.
    pub fn items_with(
        &self,
        engine: &ProjectionEngine,
        criteria: &FilterSortCriteria,
    ) -> ItemsResponse {
        let snapshot = self.store.snapshot();
        let projection = engine.project(&snapshot, criteria);
        let now = self.clock.now();

        ItemsResponse {
            version: projection.version,
            rows: projection
                .items
                .iter()
                .cloned()
                .map(|item| ItemRow::new(item, &now))
                .collect(),
        }
    }

    pub fn columns(&self) -> Vec<ColumnDef> {
        COLUMNS
            .iter()
            .map(|c| ColumnDef {
                header: c.header,
                accessor: c.accessor.as_str(),
            })
            .collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            timestamp_ms: self.clock.now_ms(),
            store_version: self.store.version(),
            store_items: self.store.len(),
            ingest: self.ingest_stats.as_ref().map(|s| s.snapshot()),
            projection_hits: self.engine.hits(),
            projection_misses: self.engine.misses(),
        }
    }
}

impl std::fmt::Debug for DashboardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardState")
            .field("store_version", &self.store.version())
            .field("store_items", &self.store.len())
            .finish()
    }
}
