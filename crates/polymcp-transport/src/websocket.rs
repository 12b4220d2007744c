//! WebSocket transport: one JSON message per frame, no length prefix.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use polymcp_core::protocol::JsonRpcMessage;

use crate::{ProtocolKind, Result, Transport, TransportError, TransportReceiver, TransportSender};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client transport.
pub struct WebSocketTransport {
    stream: WsStream,
    url: String,
}

impl WebSocketTransport {
    /// Connect to a `ws://` URL. `wss://` is refused: certificate
    /// validation is not supported here.
    pub async fn connect(url: &str) -> Result<Self> {
        if url.starts_with("wss://") {
            return Err(TransportError::Unsupported {
                message: "wss:// is not supported; use ws:// or terminate TLS upstream"
                    .to_string(),
            });
        }
        let (stream, response) =
            connect_async(url)
                .await
                .map_err(|e| TransportError::Connection {
                    message: format!("WebSocket connect to {url} failed: {e}"),
                })?;
        debug!(url = %url, status = %response.status(), "WebSocket transport connected");
        Ok(Self {
            stream,
            url: url.to_string(),
        })
    }
}

impl Transport for WebSocketTransport {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::WebSocket
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportSender>, Box<dyn TransportReceiver>) {
        let url = self.url;
        let (sink, stream) = self.stream.split();
        (
            Box::new(WebSocketSender {
                sink,
                url: url.clone(),
            }),
            Box::new(WebSocketReceiver { stream, url }),
        )
    }
}

struct WebSocketSender {
    sink: SplitSink<WsStream, Message>,
    url: String,
}

#[async_trait]
impl TransportSender for WebSocketSender {
    async fn send(&mut self, message: &JsonRpcMessage) -> Result<()> {
        let body = serde_json::to_string(message).map_err(|e| TransportError::Serialization {
            message: format!("failed to serialize message: {e}"),
        })?;
        trace!(url = %self.url, bytes = body.len(), "sending WebSocket frame");
        self.sink
            .send(Message::Text(body.into()))
            .await
            .map_err(|e| TransportError::Network {
                message: format!("WebSocket send to {} failed: {e}", self.url),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.send(Message::Close(None)).await.ok();
        self.sink.close().await.ok();
        debug!(url = %self.url, "WebSocket transport closed");
        Ok(())
    }
}

struct WebSocketReceiver {
    stream: SplitStream<WsStream>,
    url: String,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).map_err(|e| {
                        TransportError::Serialization {
                            message: format!("failed to parse frame JSON: {e}"),
                        }
                    });
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return serde_json::from_slice(&bytes).map_err(|e| {
                        TransportError::Serialization {
                            message: format!("failed to parse frame JSON: {e}"),
                        }
                    });
                }
                // Control frames carry no protocol payload.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Err(e)) => {
                    return Err(TransportError::Network {
                        message: format!("WebSocket receive from {} failed: {e}", self.url),
                    });
                }
            }
        }
    }
}
