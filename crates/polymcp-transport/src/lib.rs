//! # PolyMCP Transport
//!
//! Transport layer for PolyMCP: an abstract bidirectional message channel
//! over TCP, stdio (own process or spawned child), WebSocket and HTTP.
//!
//! Stream transports (TCP, stdio) frame every message with a 4-byte
//! big-endian length prefix. WebSocket carries one JSON message per frame.
//! HTTP is a synchronous request-response transport: the send performs the
//! whole round-trip and hands the response back to the caller.
//!
//! Asynchronous transports are consumed by splitting them into a sender and
//! a receiver half, each driven by its own task, so a parked receive never
//! blocks an outgoing send.

use async_trait::async_trait;
use thiserror::Error;

use polymcp_core::protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};

// Define our own Result type for this crate
pub type Result<T> = std::result::Result<T, TransportError>;

pub mod framing;
pub mod stdio;
pub mod tcp;

pub use stdio::{ChildProcessTransport, StdioTransport};
pub use tcp::TcpTransport;

#[cfg(feature = "websocket")]
pub mod websocket;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::HttpTransport;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Unsupported transport: {message}")]
    Unsupported { message: String },
}

impl From<TransportError> for polymcp_core::PolyMcpError {
    fn from(err: TransportError) -> Self {
        use polymcp_core::error::TransportError as CoreError;
        let mapped = match err {
            TransportError::Connection { message } => CoreError::ConnectionFailed(message),
            TransportError::ConnectionClosed => CoreError::ConnectionClosed,
            TransportError::Serialization { message } => {
                return polymcp_core::PolyMcpError::parse_error(message)
            }
            TransportError::Network { message } => CoreError::SendFailed(message),
            TransportError::Timeout => CoreError::Timeout,
            TransportError::Unsupported { message } => CoreError::ConnectionFailed(message),
        };
        polymcp_core::PolyMcpError::Transport(mapped)
    }
}

/// Which wire protocol a transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Tcp,
    Stdio,
    WebSocket,
    Http,
}

impl ProtocolKind {
    /// Synchronous transports perform the round-trip inside `send` and
    /// bypass the client's pending-request table.
    pub fn is_request_response(&self) -> bool {
        matches!(self, ProtocolKind::Http)
    }
}

/// Outgoing half of a split transport.
#[async_trait]
pub trait TransportSender: Send {
    /// Send one message through the transport.
    async fn send(&mut self, message: &JsonRpcMessage) -> Result<()>;

    /// Close the transport connection.
    async fn close(&mut self) -> Result<()>;
}

/// Incoming half of a split transport.
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next message. `Err(ConnectionClosed)` is terminal: after
    /// it, no further messages will be delivered.
    async fn receive(&mut self) -> Result<JsonRpcMessage>;
}

/// An asynchronous bidirectional message transport.
pub trait Transport: Send {
    fn protocol(&self) -> ProtocolKind;

    /// Split into independently-driven halves.
    fn split(self: Box<Self>) -> (Box<dyn TransportSender>, Box<dyn TransportReceiver>);
}

/// A synchronous request-response transport (HTTP).
#[async_trait]
pub trait RequestTransport: Send + Sync {
    /// Perform one request round-trip and return the decoded response.
    async fn request(&self, request: &JsonRpcRequest) -> Result<JsonRpcResponse>;

    fn is_connected(&self) -> bool;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub enum TransportConfig {
    /// TCP stream with length-prefix framing, `host:port`
    Tcp { addr: String },

    /// This process's stdin/stdout with length-prefix framing
    Stdio,

    /// Spawned subprocess, framed over its stdin/stdout
    Child {
        command: String,
        args: Vec<String>,
        env: Vec<(String, String)>,
    },

    /// WebSocket, one JSON message per frame
    #[cfg(feature = "websocket")]
    WebSocket { url: String },
}

/// Create an asynchronous transport from configuration.
pub async fn create_transport(config: TransportConfig) -> Result<Box<dyn Transport>> {
    match config {
        TransportConfig::Tcp { addr } => {
            let transport = tcp::TcpTransport::connect(&addr).await?;
            Ok(Box::new(transport))
        }
        TransportConfig::Stdio => {
            let transport = stdio::StdioTransport::new();
            Ok(Box::new(transport))
        }
        TransportConfig::Child { command, args, env } => {
            let transport = stdio::ChildProcessTransport::spawn(&command, &args, &env)?;
            Ok(Box::new(transport))
        }
        #[cfg(feature = "websocket")]
        TransportConfig::WebSocket { url } => {
            let transport = websocket::WebSocketTransport::connect(&url).await?;
            Ok(Box::new(transport))
        }
    }
}
