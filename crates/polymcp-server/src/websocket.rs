//! WebSocket serving: one JSON message per frame, no length prefix.

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use polymcp_core::{PolyMcpError, PolyResult};

use crate::server::Server;

impl Server {
    /// Serve WebSocket connections accepted from `listener` until it fails.
    pub async fn serve_websocket_listener(&self, listener: TcpListener) -> PolyResult<()> {
        let local = listener.local_addr()?;
        info!(server = %self.info().name, %local, "serving WebSocket");
        loop {
            let (stream, remote) = listener.accept().await?;
            debug!(%remote, "accepted WebSocket connection");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run_websocket_connection(stream).await {
                    warn!(%remote, error = %e, "WebSocket connection ended with error");
                }
            });
        }
    }

    /// Bind `addr` and serve WebSocket connections until the listener fails.
    pub async fn serve_websocket(&self, addr: &str) -> PolyResult<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_websocket_listener(listener).await
    }

    async fn run_websocket_connection(&self, stream: TcpStream) -> PolyResult<()> {
        stream.set_nodelay(true).ok();
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| PolyMcpError::transport_error(format!("WebSocket handshake failed: {e}")))?;
        let (mut sink, mut incoming) = ws.split();

        while let Some(frame) = incoming.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    return Err(PolyMcpError::transport_error(format!(
                        "WebSocket receive failed: {e}"
                    )));
                }
            };
            let raw: Vec<u8> = match frame {
                Message::Text(text) => text.as_bytes().to_vec(),
                Message::Binary(bytes) => bytes.to_vec(),
                Message::Ping(payload) => {
                    sink.send(Message::Pong(payload)).await.ok();
                    continue;
                }
                Message::Pong(_) | Message::Frame(_) => continue,
                Message::Close(_) => break,
            };

            if let Some(response) = self.handle_frame(&raw).await {
                let body = serde_json::to_string(&response)?;
                sink.send(Message::Text(body.into()))
                    .await
                    .map_err(|e| {
                        PolyMcpError::transport_error(format!("WebSocket send failed: {e}"))
                    })?;
            }
        }
        debug!("WebSocket connection closed");
        Ok(())
    }
}
