//! Store change broadcast.
//!
//! The broadcaster polls the store version at a fixed interval and announces
//! every new version to all connected WebSocket clients. Each client then
//! renders the table with its own criteria.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::state::DashboardState;

/// Run the broadcaster task until `shutdown` is cancelled.
pub async fn run_broadcaster(
    state: DashboardState,
    tx: broadcast::Sender<u64>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    let mut last_version = state.store_version();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Broadcaster stopped");
                return;
            }
            _ = interval.tick() => {}
        }

        let version = state.store_version();
        if version == last_version {
            continue;
        }
        last_version = version;

        match tx.send(version) {
            Ok(n) => trace!(receivers = n, version, "Store version broadcast"),
            // No receivers - this is normal when no clients connected
            Err(_) => trace!(version, "No WebSocket receivers connected"),
        }
    }
}
