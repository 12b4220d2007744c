//! TCP transport with 4-byte big-endian length framing.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, trace};

use polymcp_core::protocol::JsonRpcMessage;

use crate::framing::{decode_message, encode_message, length_codec};
use crate::{ProtocolKind, Result, Transport, TransportError, TransportReceiver, TransportSender};

/// TCP client transport.
pub struct TcpTransport {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    peer: String,
}

impl TcpTransport {
    /// Connect to `addr` (`host:port`, with an optional `tcp://` prefix).
    pub async fn connect(addr: &str) -> Result<Self> {
        let addr = addr.strip_prefix("tcp://").unwrap_or(addr);
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::Connection {
                message: format!("failed to connect to {addr}: {e}"),
            })?;
        stream.set_nodelay(true).ok();
        debug!(peer = %addr, "TCP transport connected");
        Ok(Self {
            framed: Framed::new(stream, length_codec()),
            peer: addr.to_string(),
        })
    }

    /// Wrap an accepted server-side connection.
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            framed: Framed::new(stream, length_codec()),
            peer,
        }
    }
}

impl Transport for TcpTransport {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Tcp
    }

    fn split(self: Box<Self>) -> (Box<dyn TransportSender>, Box<dyn TransportReceiver>) {
        let peer = self.peer;
        let (sink, stream) = self.framed.split();
        (
            Box::new(TcpSender {
                sink,
                peer: peer.clone(),
            }),
            Box::new(TcpReceiver { stream, peer }),
        )
    }
}

struct TcpSender {
    sink: SplitSink<Framed<TcpStream, LengthDelimitedCodec>, Bytes>,
    peer: String,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&mut self, message: &JsonRpcMessage) -> Result<()> {
        let body = encode_message(message)?;
        trace!(peer = %self.peer, bytes = body.len(), "sending TCP frame");
        self.sink
            .send(body)
            .await
            .map_err(|e| TransportError::Network {
                message: format!("TCP send to {} failed: {e}", self.peer),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await.ok();
        debug!(peer = %self.peer, "TCP transport closed");
        Ok(())
    }
}

struct TcpReceiver {
    stream: SplitStream<Framed<TcpStream, LengthDelimitedCodec>>,
    peer: String,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        match self.stream.next().await {
            Some(Ok(frame)) => {
                trace!(peer = %self.peer, bytes = frame.len(), "received TCP frame");
                decode_message(&frame)
            }
            Some(Err(e)) => Err(TransportError::Network {
                message: format!("TCP receive from {} failed: {e}", self.peer),
            }),
            None => Err(TransportError::ConnectionClosed),
        }
    }
}
