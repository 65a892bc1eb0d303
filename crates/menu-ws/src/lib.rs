//! Push-channel WebSocket client.
//!
//! The connection manager owns transport concerns only:
//! - Automatic reconnection with exponential backoff and jitter
//! - Idle detection with protocol-level pings
//! - Forwarding raw text frames to a channel
//!
//! Decoding the frames is the feed crate's job.

pub mod connection;
pub mod error;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState, ConnectionStats};
pub use error::{WsError, WsResult};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
