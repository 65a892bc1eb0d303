//! Prometheus metrics for the menu ticker.
//!
//! Every error class the ingest pipeline absorbs (malformed messages,
//! metadata fetch failures, orphan ticks) has a counter here, alongside
//! throughput and store gauges.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a startup bug; it can only happen during
//! static initialization.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

/// Push-channel connection state (1 = connected, 0 = disconnected).
pub static WS_CONNECTED: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "menu_ws_connected",
        "Push-channel connection state (1=connected)"
    )
    .unwrap()
});

/// Total push-channel reconnection attempts.
pub static WS_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "menu_ws_reconnect_total",
        "Total push-channel reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Push-channel messages received (one message may carry many ticks).
pub static MESSAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("menu_messages_total", "Push-channel messages received").unwrap()
});

/// Messages dropped because they did not parse as a tick batch.
pub static MALFORMED_MESSAGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "menu_malformed_messages_total",
        "Push-channel messages dropped as malformed"
    )
    .unwrap()
});

/// Ticks received, decoded.
pub static TICKS_TOTAL: Lazy<IntCounter> =
    Lazy::new(|| register_int_counter!("menu_ticks_total", "Price ticks received").unwrap());

/// Ticks merged into an existing item.
pub static TICKS_APPLIED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "menu_ticks_applied_total",
        "Price ticks merged into the store"
    )
    .unwrap()
});

/// Orphan ticks by outcome.
/// Labels: outcome (dropped/buffered)
pub static ORPHAN_TICKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "menu_orphan_ticks_total",
        "Ticks that arrived before their item's metadata",
        &["outcome"]
    )
    .unwrap()
});

/// Metadata fetches by result.
/// Labels: result (issued/ok/failed/skipped)
pub static METADATA_FETCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "menu_metadata_fetch_total",
        "Metadata fetch lifecycle events",
        &["result"]
    )
    .unwrap()
});

/// Metadata fetch failures by reason.
/// Labels: reason (not_found/http/timeout/decode)
pub static METADATA_FETCH_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "menu_metadata_fetch_failures_total",
        "Metadata fetch failures by reason",
        &["reason"]
    )
    .unwrap()
});

/// Items currently held in the store.
pub static STORE_ITEMS: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("menu_store_items", "Items held in the store").unwrap());

/// Store mutation counter.
pub static STORE_VERSION: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("menu_store_version", "Store mutation version").unwrap());

/// Metadata fetches currently in flight.
pub static FETCHES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "menu_fetches_in_flight",
        "Metadata fetches currently pending"
    )
    .unwrap()
});

/// Metrics helper for recording events.
pub struct Metrics;

impl Metrics {
    pub fn ws_connected() {
        WS_CONNECTED.set(1);
    }

    pub fn ws_disconnected() {
        WS_CONNECTED.set(0);
    }

    pub fn ws_reconnect(reason: &str) {
        WS_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn message_received() {
        MESSAGES_TOTAL.inc();
    }

    pub fn malformed_message() {
        MALFORMED_MESSAGES_TOTAL.inc();
    }

    pub fn ticks_received(count: usize) {
        TICKS_TOTAL.inc_by(count as u64);
    }

    pub fn ticks_applied(count: usize) {
        TICKS_APPLIED_TOTAL.inc_by(count as u64);
    }

    /// `outcome` is "buffered" or "dropped".
    pub fn orphan_ticks(outcome: &str, count: usize) {
        ORPHAN_TICKS_TOTAL
            .with_label_values(&[outcome])
            .inc_by(count as f64);
    }

    pub fn metadata_fetch(result: &str, count: usize) {
        METADATA_FETCH_TOTAL
            .with_label_values(&[result])
            .inc_by(count as f64);
    }

    pub fn metadata_fetch_failed(reason: &str) {
        METADATA_FETCH_TOTAL.with_label_values(&["failed"]).inc();
        METADATA_FETCH_FAILURES.with_label_values(&[reason]).inc();
    }

    pub fn fetches_in_flight(count: usize) {
        FETCHES_IN_FLIGHT.set(count as i64);
    }

    /// Record store size and version after a mutation batch.
    pub fn store_state(items: usize, version: u64) {
        STORE_ITEMS.set(items as i64);
        STORE_VERSION.set(version as i64);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buf = Vec::new();
        encoder
            .encode(&families, &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
