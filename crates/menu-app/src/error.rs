//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<menu_ws::WsError>),

    #[error("Feed error: {0}")]
    Feed(#[from] menu_feed::FeedError),

    #[error("Registry error: {0}")]
    Registry(#[from] menu_registry::RegistryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] menu_telemetry::TelemetryError),

    #[error("Dashboard error: {0}")]
    Dashboard(#[from] menu_dashboard::DashboardError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
