//! Application configuration.

use crate::error::{AppError, AppResult};
use menu_dashboard::DashboardConfig;
use menu_feed::IngestConfig;
use menu_ws::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration. Every field has a default, so an empty file is
/// a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Push-channel URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Base URL of the metadata endpoint; items are fetched from
    /// `{metadata_url}/items?id=`.
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_ws_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_metadata_url() -> String {
    "http://localhost:8000/api".to_string()
}

/// WebSocket reconnect policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Backoff cap (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Silence before a ping is sent (ms).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl WsConfig {
    pub fn connection_config(&self, url: &str) -> ConnectionConfig {
        ConnectionConfig {
            url: url.to_string(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms,
            idle_timeout_ms: self.idle_timeout_ms,
        }
    }
}

/// Ingestion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSection {
    /// Minimum interval between metadata fetches for one id (ms).
    #[serde(default = "default_freshness_window_ms")]
    pub freshness_window_ms: u64,
    /// Merge the newest tick that arrived while an id's first fetch was in
    /// flight, instead of dropping it.
    #[serde(default = "default_replay_orphan_ticks")]
    pub replay_orphan_ticks: bool,
    /// Currency for `[id, price]` pairs.
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_freshness_window_ms() -> u64 {
    5000
}

fn default_replay_orphan_ticks() -> bool {
    true
}

fn default_currency() -> String {
    "CZK".to_string()
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            freshness_window_ms: default_freshness_window_ms(),
            replay_orphan_ticks: default_replay_orphan_ticks(),
            default_currency: default_currency(),
        }
    }
}

impl From<&IngestSection> for IngestConfig {
    fn from(cfg: &IngestSection) -> Self {
        Self {
            freshness_window_ms: cfg.freshness_window_ms,
            replay_orphan_ticks: cfg.replay_orphan_ticks,
        }
    }
}

/// Metadata fetch timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request deadline enforced by the deduplicator (ms).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// HTTP client timeout (ms).
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default log filter, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Interval for refreshing store and connection gauges (ms).
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,
}

fn default_log_level() -> String {
    menu_telemetry::logging::DEFAULT_FILTER.to_string()
}

fn default_metrics_interval_ms() -> u64 {
    5000
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_interval_ms: default_metrics_interval_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            metadata_url: default_metadata_url(),
            websocket: WsConfig::default(),
            ingest: IngestSection::default(),
            fetch: FetchConfig::default(),
            dashboard: DashboardConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline misbehave silently.
    pub fn validate(&self) -> AppResult<()> {
        if self.ws_url.is_empty() {
            return Err(AppError::Config("ws_url must not be empty".to_string()));
        }
        if self.metadata_url.is_empty() {
            return Err(AppError::Config("metadata_url must not be empty".to_string()));
        }
        if self.fetch.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "fetch.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.ingest.default_currency.trim().is_empty() {
            return Err(AppError::Config(
                "ingest.default_currency must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Config path: CLI arg > `MENU_CONFIG` env var > `config/default.toml`.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var("MENU_CONFIG").ok())
            .unwrap_or_else(|| "config/default.toml".to_string())
    }
}
