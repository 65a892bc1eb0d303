//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use menu_telemetry::Metrics;
use menu_view::{FilterSortCriteria, ProjectionEngine};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::state::DashboardState;
use crate::types::{DashboardMessage, ItemsQuery};

/// Connection limiter to prevent too many concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: self.clone(),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

/// Slot held for the lifetime of one WebSocket connection.
pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    dashboard_state: DashboardState,
    version_tx: broadcast::Sender<u64>,
    connection_limiter: Arc<ConnectionLimiter>,
}

impl AppState {
    pub fn new(
        dashboard_state: DashboardState,
        version_tx: broadcast::Sender<u64>,
        config: &DashboardConfig,
    ) -> Self {
        Self {
            dashboard_state,
            version_tx,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/items", get(get_items))
        .route("/api/columns", get(get_columns))
        .route("/api/stats", get(get_stats))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics() -> Response {
    match Metrics::render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Filtered and sorted table.
async fn get_items(State(state): State<AppState>, Query(query): Query<ItemsQuery>) -> Response {
    match query.into_criteria() {
        Ok(criteria) => Json(state.dashboard_state.items(&criteria)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn get_columns(State(state): State<AppState>) -> Response {
    Json(state.dashboard_state.columns()).into_response()
}

async fn get_stats(State(state): State<AppState>) -> Response {
    Json(state.dashboard_state.stats()).into_response()
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.connection_limiter.try_acquire() else {
        warn!(
            current = state.connection_limiter.current_count(),
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    info!(
        connections = state.connection_limiter.current_count(),
        "New WebSocket connection"
    );

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, guard))
}

async fn send_json(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    msg: &DashboardMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            debug!(error = %e, "Failed to serialize dashboard message");
            true
        }
    }
}

/// Handle a WebSocket connection.
///
/// The client starts with the unfiltered table and may send an
/// `ItemsQuery` as JSON text at any time to change its view.
async fn handle_ws_connection(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let (mut sender, mut receiver) = socket.split();
    let mut version_rx = state.version_tx.subscribe();

    let engine = ProjectionEngine::new();
    let mut criteria = FilterSortCriteria::default();

    let initial = state.dashboard_state.items_with(&engine, &criteria);
    if !send_json(&mut sender, &DashboardMessage::Snapshot(initial)).await {
        debug!("Failed to send initial snapshot, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = version_rx.recv() => {
                match result {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let table = state.dashboard_state.items_with(&engine, &criteria);
                        if !send_json(&mut sender, &DashboardMessage::Update(table)).await {
                            debug!("Failed to send message, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ItemsQuery>(text.as_str())
                            .map_err(|e| e.to_string())
                            .and_then(|q| q.into_criteria().map_err(|e| e.to_string()))
                        {
                            Ok(next) => {
                                criteria = next;
                                DashboardMessage::Snapshot(
                                    state.dashboard_state.items_with(&engine, &criteria),
                                )
                            }
                            Err(message) => DashboardMessage::Error { message },
                        };
                        if !send_json(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                    // Pong is handled automatically by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!(
        connections = state.connection_limiter.current_count().saturating_sub(1),
        "WebSocket connection closed"
    );
}

/// Serve the dashboard on an already bound listener until `shutdown`.
pub async fn serve(
    listener: TcpListener,
    dashboard_state: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let (version_tx, _) = broadcast::channel::<u64>(32);
    let state = AppState::new(dashboard_state.clone(), version_tx.clone(), &config);
    let app = create_router(state);

    tokio::spawn(crate::broadcast::run_broadcaster(
        dashboard_state,
        version_tx,
        config.push_interval(),
        shutdown.clone(),
    ));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Run the dashboard HTTP server.
pub async fn run_server(
    dashboard_state: DashboardState,
    config: DashboardConfig,
    shutdown: CancellationToken,
) -> DashboardResult<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DashboardError::Bind { addr, source })?;
    info!(%addr, "Starting dashboard server");

    serve(listener, dashboard_state, config, shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use menu_core::{ItemId, ItemType, ManualClock, MetadataRecord, Money, Price, Tick};
    use menu_feed::ViewModelStore;
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn record(id: &str, name: &str) -> MetadataRecord {
        MetadataRecord {
            id: ItemId::new(id),
            name: name.to_string(),
            item_type: ItemType::Drink,
            description: String::new(),
            cuisine_country: "CZE".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            is_vegetarian: true,
            is_vegan: true,
            is_alcoholic: true,
        }
    }

    fn router() -> Router {
        let clock = Arc::new(ManualClock::new(1_704_103_200_000));
        let store = Arc::new(ViewModelStore::new(clock.clone()));
        store.apply_metadata(record("1", "Plzeň"));
        store.apply_metadata(record("2", "Budvar"));
        store.apply_price_tick(&Tick::new("1", Money::new(Price::new(dec!(55)), "CZK")));
        store.apply_price_tick(&Tick::new("2", Money::new(Price::new(dec!(49)), "CZK")));

        let (tx, _) = broadcast::channel(4);
        let state = AppState::new(
            DashboardState::new(store, clock),
            tx,
            &DashboardConfig::default(),
        );
        create_router(state)
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_items_sorted_by_price() {
        let (status, body) = get_json("/api/items?sort=price&dir=asc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], 4);
        assert_eq!(body["rows"][0]["name"], "Budvar");
        assert_eq!(body["rows"][1]["price_display"], "55 Kč");
    }

    #[tokio::test]
    async fn test_items_filtered() {
        let (_, body) = get_json("/api/items?filter=plz").await;
        assert_eq!(body["rows"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_sort_key_is_rejected() {
        let (status, _) = get_json("/api/items?sort=weight").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_columns() {
        let (_, body) = get_json("/api/columns").await;
        assert_eq!(body[5]["header"], "Price");
        assert_eq!(body[5]["accessor"], "price");
    }

    #[tokio::test]
    async fn test_stats_count_items() {
        let (_, body) = get_json("/api/stats").await;
        assert_eq!(body["store_items"], 2);
        assert_eq!(body["store_version"], 4);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        Metrics::message_received();
        let response = router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("menu_messages_total"));
    }

    #[test]
    fn test_connection_limiter() {
        let limiter = Arc::new(ConnectionLimiter::new(1));
        let guard = limiter.try_acquire();
        assert!(guard.is_some());
        assert!(limiter.try_acquire().is_none());
        drop(guard);
        assert_eq!(limiter.current_count(), 0);
        assert!(limiter.try_acquire().is_some());
    }
}
