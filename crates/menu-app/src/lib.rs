//! Live menu ticker.
//!
//! Main application that wires the components together:
//! - WebSocket push channel of price ticks
//! - Stream ingestion with the freshness ledger
//! - Deduplicated metadata fetches
//! - View-model store and the dashboard render surface

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
