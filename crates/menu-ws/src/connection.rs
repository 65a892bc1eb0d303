//! Push-channel connection manager.
//!
//! Owns one WebSocket session at a time and replaces it when it drops,
//! backing off exponentially between attempts. Frames are forwarded as raw
//! text; payloads are never interpreted here, so a reconnect cannot touch
//! downstream state.

use crate::error::{WsError, WsResult};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    /// Consecutive failed sessions tolerated before giving up (0 = never).
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Silence after which a ping is sent; a second silent period drops the
    /// session.
    pub idle_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            idle_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Lifetime counters. Totals only grow, so callers can diff them.
#[derive(Debug, Default)]
struct SessionCounters {
    sessions_opened: AtomicU64,
    sessions_lost: AtomicU64,
    frames_forwarded: AtomicU64,
    consecutive_failures: AtomicU32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub sessions_opened: u64,
    pub sessions_lost: u64,
    pub frames_forwarded: u64,
    pub consecutive_failures: u32,
}

/// What the session loop does after one inbound frame.
enum FrameAction {
    Continue,
    Reply(Message),
    End(WsResult<()>),
}

pub struct ConnectionManager {
    config: ConnectionConfig,
    state: RwLock<ConnectionState>,
    frame_tx: mpsc::Sender<String>,
    counters: SessionCounters,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, frame_tx: mpsc::Sender<String>) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            frame_tx,
            counters: SessionCounters::default(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            sessions_opened: self.counters.sessions_opened.load(Ordering::Relaxed),
            sessions_lost: self.counters.sessions_lost.load(Ordering::Relaxed),
            frames_forwarded: self.counters.frames_forwarded.load(Ordering::Relaxed),
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop the session and the reconnect loop.
    pub fn shutdown(&self) {
        info!("Push channel shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Keep a session open until shutdown, or until
    /// `max_reconnect_attempts` sessions in a row fail.
    pub async fn connect(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            let outcome = self.run_session().await;

            if self.is_shutdown() {
                debug!("Session ended during shutdown");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }
            match &outcome {
                Ok(()) => info!("Push channel session ended"),
                Err(e) => error!(error = %e, "Push channel session failed"),
            }

            let failures = self.counters.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            let limit = self.config.max_reconnect_attempts;
            if limit > 0 && failures >= limit {
                error!(failures, "Giving up on push channel");
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::GaveUp { failures });
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.backoff(failures);
            warn!(failures, delay_ms = delay.as_millis() as u64, "Reconnecting push channel");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    /// One connect-and-read session.
    async fn run_session(&self) -> WsResult<()> {
        info!(url = %self.config.url, "Opening push channel");

        let (stream, _) = tokio::select! {
            res = connect_async_tls_with_config(&self.config.url, None, true, None) => res?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = stream.split();

        self.set_state(ConnectionState::Connected);
        self.counters.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
        info!("Push channel connected");

        let idle = Duration::from_millis(self.config.idle_timeout_ms.max(1));
        let mut deadline = Instant::now() + idle;
        let mut ping_outstanding = false;

        let result = loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    break Ok(());
                }

                frame = read.next() => {
                    deadline = Instant::now() + idle;
                    ping_outstanding = false;

                    match self.on_frame(frame).await {
                        FrameAction::Continue => {}
                        FrameAction::Reply(msg) => write.send(msg).await?,
                        FrameAction::End(result) => break result,
                    }
                }

                () = tokio::time::sleep_until(deadline) => {
                    if ping_outstanding {
                        break Err(WsError::IdleTimeout(self.config.idle_timeout_ms));
                    }
                    debug!("Push channel idle, pinging");
                    write.send(Message::Ping(Vec::new())).await?;
                    ping_outstanding = true;
                    deadline = Instant::now() + idle;
                }
            }
        };

        if !self.is_shutdown() {
            self.counters.sessions_lost.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn on_frame(
        &self,
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> FrameAction {
        match frame {
            Some(Ok(Message::Text(text))) => self.forward(text).await,
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => self.forward(text).await,
                Err(_) => {
                    warn!("Dropping non-UTF-8 binary frame");
                    FrameAction::Continue
                }
            },
            Some(Ok(Message::Ping(data))) => FrameAction::Reply(Message::Pong(data)),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                    .unwrap_or((1000, String::new()));
                warn!(code, %reason, "Push channel closed by server");
                FrameAction::End(Err(WsError::ConnectionClosed { code, reason }))
            }
            Some(Ok(_)) => FrameAction::Continue,
            Some(Err(e)) => FrameAction::End(Err(e.into())),
            None => FrameAction::End(Ok(())),
        }
    }

    async fn forward(&self, text: String) -> FrameAction {
        if self.frame_tx.send(text).await.is_err() {
            warn!("Frame receiver dropped, closing push channel");
            self.shutdown_token.cancel();
            return FrameAction::End(Ok(()));
        }
        self.counters.frames_forwarded.fetch_add(1, Ordering::Relaxed);
        FrameAction::Continue
    }

    fn backoff(&self, failures: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let delay = backoff_delay_ms(failures, base, self.config.reconnect_max_delay_ms);
        Duration::from_millis(delay + jitter_ms(base / 4))
    }
}

/// `base * 2^(failures-1)`, capped at `max`.
fn backoff_delay_ms(failures: u32, base: u64, max: u64) -> u64 {
    let exponent = failures.saturating_sub(1).min(16);
    base.saturating_mul(1u64 << exponent).min(max)
}

/// Pseudo-random jitter in `0..bound` ms.
fn jitter_ms(bound: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    if bound == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn manager(url: String, max_attempts: u32) -> (ConnectionManager, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let config = ConnectionConfig {
            url,
            max_reconnect_attempts: max_attempts,
            reconnect_base_delay_ms: 5,
            reconnect_max_delay_ms: 20,
            ..Default::default()
        };
        (ConnectionManager::new(config, tx), rx)
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        assert_eq!(backoff_delay_ms(1, 1000, 30_000), 1000);
        assert_eq!(backoff_delay_ms(2, 1000, 30_000), 2000);
        assert_eq!(backoff_delay_ms(3, 1000, 30_000), 4000);
        assert_eq!(backoff_delay_ms(6, 1000, 30_000), 30_000);
        assert_eq!(backoff_delay_ms(u32::MAX, 1000, 30_000), 30_000);
    }

    #[test]
    fn test_jitter_is_bounded() {
        assert_eq!(jitter_ms(0), 0);
        for _ in 0..100 {
            assert!(jitter_ms(250) < 250);
        }
    }

    #[tokio::test]
    async fn test_shutdown_before_connect_returns_immediately() {
        let (manager, _rx) = manager("ws://127.0.0.1:1".to_string(), 0);
        manager.shutdown();
        assert!(manager.connect().await.is_ok());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        // Bound then dropped: nothing listens on the port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (manager, _rx) = manager(format!("ws://{addr}"), 3);
        let result = tokio::time::timeout(Duration::from_secs(5), manager.connect())
            .await
            .unwrap();

        assert!(matches!(result, Err(WsError::GaveUp { failures: 3 })));
        let stats = manager.stats();
        assert_eq!(stats.consecutive_failures, 3);
        assert_eq!(stats.sessions_opened, 0);
    }

    #[tokio::test]
    async fn test_forwards_text_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"[["1", 10]]"#.to_string())).await.unwrap();
            // Hold the session open until the client closes.
            while ws.next().await.is_some() {}
        });

        let (manager, mut rx) = manager(format!("ws://{addr}"), 0);
        let manager = std::sync::Arc::new(manager);
        let task = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connect().await }
        });

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame, r#"[["1", 10]]"#);
        assert!(manager.is_connected());

        manager.shutdown();
        assert!(task.await.unwrap().is_ok());
        assert_eq!(manager.stats().frames_forwarded, 1);
        assert_eq!(manager.stats().sessions_lost, 0);
        server.abort();
    }
}
