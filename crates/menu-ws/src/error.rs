//! Push-channel error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("push channel gave up after {failures} failed sessions")]
    GaveUp { failures: u32 },

    #[error("server closed the push channel: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("no traffic for {0}ms after ping")]
    IdleTimeout(u64),

    #[error("transport error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type WsResult<T> = Result<T, WsError>;
