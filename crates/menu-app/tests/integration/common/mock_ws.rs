//! Mock push-channel server for integration tests.
//!
//! Provides a WebSocket server that can:
//! - Accept connections and count them
//! - Push text frames to every connected client
//! - Drop all clients to force a reconnect

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Outbound {
    Text(String),
    Close,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    outbound: broadcast::Sender<Outbound>,
    connections: Arc<AtomicU32>,
    active: Arc<AtomicU32>,
}

impl MockWsServer {
    /// Start a new mock WebSocket server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicU32::new(0));
        let active = Arc::new(AtomicU32::new(0));
        let (outbound, _) = broadcast::channel::<Outbound>(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let connections_clone = connections.clone();
        let active_clone = active.clone();
        let outbound_clone = outbound.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let rx = outbound_clone.subscribe();
                        tokio::spawn(handle_connection(
                            stream,
                            rx,
                            connections_clone.clone(),
                            active_clone.clone(),
                        ));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            outbound,
            connections,
            active,
        }
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of completed handshakes so far.
    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` handshakes have completed and a client is
    /// currently connected.
    pub async fn wait_for_connections(&self, n: u32) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.connection_count() < n || self.active.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("client did not connect in time");
    }

    /// Push a text frame to every connected client.
    pub fn push(&self, frame: &str) {
        let _ = self.outbound.send(Outbound::Text(frame.to_string()));
    }

    /// Close every client connection.
    pub fn drop_clients(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut outbound: broadcast::Receiver<Outbound>,
    connections: Arc<AtomicU32>,
    active: Arc<AtomicU32>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    connections.fetch_add(1, Ordering::SeqCst);
    active.fetch_add(1, Ordering::SeqCst);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = outbound.recv() => match msg {
                Ok(Outbound::Text(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Outbound::Close) | Err(_) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    active.fetch_sub(1, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockWsServer::start().await;
        assert!(server.url().starts_with("ws://127.0.0.1:"));
        server.shutdown().await;
    }
}
