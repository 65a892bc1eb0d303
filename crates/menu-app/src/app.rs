//! Main application orchestration.
//!
//! Coordinates all components:
//! - WebSocket push channel
//! - Stream ingestion and the freshness ledger
//! - Deduplicated metadata fetches
//! - Dashboard render surface

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use menu_core::{Clock, SystemClock};
use menu_dashboard::{run_server, DashboardState};
use menu_feed::{IngestStats, IngestStatsSnapshot, StreamIngestor, TickParser, ViewModelStore};
use menu_registry::{DynMetadataSource, FetchDeduplicator, MetadataClient, ResolveResults};
use menu_telemetry::Metrics;
use menu_ws::{ConnectionManager, WsResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time allowed for background tasks to stop after shutdown.
const WS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Main application.
pub struct Application {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    store: Arc<ViewModelStore>,
    ingestor: StreamIngestor,
    dedup: Arc<FetchDeduplicator>,
    shutdown: CancellationToken,
}

impl Application {
    /// Create the application with the HTTP metadata client.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let client = MetadataClient::with_timeout(&config.metadata_url, config.fetch.http_timeout())?;
        Ok(Self::with_source(config, Arc::new(client), Arc::new(SystemClock)))
    }

    /// Create the application with an explicit metadata source and clock.
    pub fn with_source(config: AppConfig, source: DynMetadataSource, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(ViewModelStore::new(clock.clone()));
        let parser = TickParser::new(config.ingest.default_currency.clone());
        let ingestor = StreamIngestor::new(
            store.clone(),
            parser,
            clock.clone(),
            (&config.ingest).into(),
        );
        let dedup = Arc::new(FetchDeduplicator::new(
            source,
            config.fetch.request_timeout(),
            clock.clone(),
        ));

        Self {
            config,
            clock,
            store,
            ingestor,
            dedup,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> Arc<ViewModelStore> {
        self.store.clone()
    }

    pub fn ingest_stats(&self) -> Arc<IngestStats> {
        self.ingestor.stats()
    }

    /// Token that stops `run` when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until Ctrl-C, the shutdown token, or the connection giving up.
    ///
    /// Returns the final ingest counters.
    pub async fn run(mut self) -> AppResult<IngestStatsSnapshot> {
        info!(
            ws_url = %self.config.ws_url,
            metadata_url = %self.config.metadata_url,
            "Starting application"
        );

        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(1000);
        let ws_config = self.config.websocket.connection_config(&self.config.ws_url);
        let connection = Arc::new(ConnectionManager::new(ws_config, frame_tx));

        let connection_clone = connection.clone();
        let mut ws_task: JoinHandle<WsResult<()>> =
            tokio::spawn(async move { connection_clone.connect().await });
        let mut ws_finished = false;

        let dashboard_task = self.spawn_dashboard();

        let (done_tx, mut done_rx) = mpsc::channel::<ResolveResults>(256);
        let mut fetches = JoinSet::new();

        let mut metrics_interval = tokio::time::interval(Duration::from_millis(
            self.config.telemetry.metrics_interval_ms.max(1),
        ));
        let mut last_sessions_lost = 0u64;
        let mut exit_error = None;
        let shutdown = self.shutdown.clone();

        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(frame) = frame_rx.recv() => {
                    self.handle_frame(&frame, &mut fetches, &done_tx);
                }

                Some(results) = done_rx.recv() => {
                    self.handle_completion(results);
                }

                Some(joined) = fetches.join_next(), if !fetches.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Metadata fetch task panicked");
                        }
                    }
                }

                result = &mut ws_task, if !ws_finished => {
                    ws_finished = true;
                    match result {
                        Ok(Ok(())) => info!("Push channel closed"),
                        Ok(Err(e)) => {
                            error!(error = %e, "Push channel gave up");
                            exit_error = Some(e);
                        }
                        Err(e) => error!(error = %e, "Push channel task failed"),
                    }
                    break;
                }

                _ = metrics_interval.tick() => {
                    let lost = connection.stats().sessions_lost;
                    for _ in last_sessions_lost..lost {
                        Metrics::ws_reconnect("session_lost");
                    }
                    last_sessions_lost = lost;
                    if connection.is_connected() {
                        Metrics::ws_connected();
                    } else {
                        Metrics::ws_disconnected();
                    }
                    Metrics::store_state(self.store.len(), self.store.version());
                    Metrics::fetches_in_flight(self.dedup.pending_count());
                }

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Cleanup
        connection.shutdown();
        self.shutdown.cancel();
        fetches.abort_all();
        while fetches.join_next().await.is_some() {}

        if !ws_finished {
            match tokio::time::timeout(WS_SHUTDOWN_GRACE, &mut ws_task).await {
                Ok(_) => debug!("Push channel stopped"),
                Err(_) => {
                    warn!("Push channel did not stop in time, aborting");
                    ws_task.abort();
                }
            }
        }
        if let Some(task) = dashboard_task {
            if tokio::time::timeout(WS_SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Dashboard did not stop in time");
            }
        }
        Metrics::ws_disconnected();

        let stats = self.ingestor.stats().snapshot();
        info!(
            messages = stats.messages,
            malformed = stats.malformed_messages,
            ticks = stats.ticks_received,
            applied = stats.ticks_applied,
            fetches = stats.fetches_requested,
            fetch_failures = stats.fetch_failures,
            orphans_dropped = stats.orphan_ticks_dropped,
            items = self.store.len(),
            "Shutting down"
        );

        match exit_error {
            Some(e) => Err(AppError::from(Box::new(e))),
            None => Ok(stats),
        }
    }

    fn spawn_dashboard(&self) -> Option<JoinHandle<()>> {
        if !self.config.dashboard.enabled {
            return None;
        }
        let state = DashboardState::new(self.store.clone(), self.clock.clone())
            .with_ingest_stats(self.ingestor.stats());
        let config = self.config.dashboard.clone();
        let shutdown = self.shutdown.child_token();

        Some(tokio::spawn(async move {
            if let Err(e) = run_server(state, config, shutdown).await {
                error!(error = %e, "Dashboard server failed");
            }
        }))
    }

    /// Ingest one raw frame and start fetches for the ids it needs.
    fn handle_frame(
        &mut self,
        frame: &str,
        fetches: &mut JoinSet<()>,
        done_tx: &mpsc::Sender<ResolveResults>,
    ) {
        Metrics::message_received();
        let report = match self.ingestor.ingest_message(frame) {
            Ok(report) => report,
            Err(_) => {
                Metrics::malformed_message();
                return;
            }
        };

        Metrics::ticks_received(report.received);
        Metrics::ticks_applied(report.applied);
        if report.buffered > 0 {
            Metrics::orphan_ticks("buffered", report.buffered);
        }
        if report.dropped > 0 {
            Metrics::orphan_ticks("dropped", report.dropped);
        }

        if report.needs_fetch() {
            Metrics::metadata_fetch("requested", report.fetch.len());
            let dedup = self.dedup.clone();
            let done_tx = done_tx.clone();
            let ids = report.fetch;
            fetches.spawn(async move {
                let results = dedup.resolve(ids).await;
                let _ = done_tx.send(results).await;
            });
        }
    }

    fn handle_completion(&mut self, results: ResolveResults) {
        if !results.skipped.is_empty() {
            Metrics::metadata_fetch("skipped", results.skipped.len());
        }
        let report = self.ingestor.complete_fetches(results);

        Metrics::metadata_fetch("succeeded", report.inserted + report.refreshed);
        Metrics::ticks_applied(report.priced);
        for (_, reason) in &report.failed {
            Metrics::metadata_fetch_failed(reason);
        }
        Metrics::store_state(self.store.len(), self.store.version());

        debug!(
            inserted = report.inserted,
            refreshed = report.refreshed,
            priced = report.priced,
            failed = report.failed.len(),
            "Fetch results applied"
        );
    }
}
