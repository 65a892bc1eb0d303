//! menu-dashboard - Render surface for the live menu.
//!
//! Serves the projected table over HTTP and pushes it to WebSocket clients
//! whenever the store version changes.
//!
//! ```text
//!   ViewModelStore (Arc<>) ──► DashboardState ──► axum router
//!                                   │              GET /api/items   → projected rows
//!                                   │              GET /api/columns → column definitions
//!                                   │              GET /api/stats   → counters
//!                                   │              GET /metrics     → Prometheus text
//!                                   ▼              GET /ws          → WebSocket
//!                            broadcaster (version poll) ──► per-client projection
//! ```

mod broadcast;
mod config;
mod error;
mod server;
mod state;
mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server, serve, AppState};
pub use state::DashboardState;
pub use types::{ColumnDef, DashboardMessage, ItemRow, ItemsQuery, ItemsResponse, StatsSnapshot};
