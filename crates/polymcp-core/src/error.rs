//! # Error Handling Module
//!
//! Hierarchical error system covering protocol, transport, tool and resource
//! failures, with lossless conversion into wire-level `JsonRpcError` values.
//!
//! The numeric error codes in [`error_codes`] are part of the wire contract
//! and must never change: peers compare them bit-exactly.

use thiserror::Error;

/// PolyResult is the canonical result type for all PolyMCP operations.
pub type PolyResult<T> = Result<T, PolyMcpError>;

/// Wire-level error codes.
///
/// Standard JSON-RPC 2.0 codes plus the implementation-defined range used by
/// this protocol. These values are fixed at the wire level.
pub mod error_codes {
    /// JSON could not be parsed
    pub const PARSE_ERROR: i32 = -32700;
    /// Envelope missing required fields, bad apiKey
    pub const INVALID_REQUEST: i32 = -32600;
    /// No handler for method
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Params schema mismatch
    pub const INVALID_PARAMS: i32 = -32602;
    /// Unexpected server failure
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Send/receive failed or timeout
    pub const TRANSPORT_ERROR: i32 = -32000;
    /// URI did not match any handler
    pub const RESOURCE_NOT_FOUND: i32 = -32001;
    /// Unknown tool name
    pub const TOOL_NOT_FOUND: i32 = -32002;
}

#[derive(Debug, Error)]
pub enum PolyMcpError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PolyMcpError {
    // Convenience constructors used throughout the workspace
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidParams(msg.into()))
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidRequest(msg.into()))
    }

    pub fn method_not_found(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::MethodNotFound(msg.into()))
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InternalError(msg.into()))
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::ParseError(msg.into()))
    }

    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self::Transport(TransportError::SendFailed(msg.into()))
    }

    pub fn request_timed_out() -> Self {
        Self::Transport(TransportError::Timeout)
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::Tool(ToolError::NotFound(name.into()))
    }

    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::Resource(ResourceError::NotFound(uri.into()))
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::Configuration(msg.into()))
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::Transport(TransportError::ConnectionFailed(msg.into()))
    }

    /// The wire code a peer would observe for this error.
    pub fn wire_code(&self) -> i32 {
        use error_codes::*;
        match self {
            PolyMcpError::Protocol(p) => match p {
                ProtocolError::ParseError(_) => PARSE_ERROR,
                ProtocolError::InvalidRequest(_) => INVALID_REQUEST,
                ProtocolError::MethodNotFound(_) => METHOD_NOT_FOUND,
                ProtocolError::InvalidParams(_) => INVALID_PARAMS,
                ProtocolError::InvalidResponse(_)
                | ProtocolError::InternalError(_)
                | ProtocolError::Configuration(_) => INTERNAL_ERROR,
                ProtocolError::ServerError { code, .. } => *code,
            },
            PolyMcpError::Transport(_) => TRANSPORT_ERROR,
            PolyMcpError::Tool(t) => match t {
                ToolError::NotFound(_) => TOOL_NOT_FOUND,
                ToolError::InvalidInput(_) => INVALID_PARAMS,
                ToolError::ExecutionFailed(_) => INTERNAL_ERROR,
            },
            PolyMcpError::Resource(r) => match r {
                ResourceError::NotFound(_) => RESOURCE_NOT_FOUND,
                ResourceError::InvalidUri(_) | ResourceError::TemplateError(_) => INVALID_PARAMS,
                ResourceError::ReadFailed(_) => INTERNAL_ERROR,
            },
            PolyMcpError::Serialization(_) => PARSE_ERROR,
            PolyMcpError::Io(_) | PolyMcpError::Other(_) => INTERNAL_ERROR,
        }
    }

    /// Rebuild an error from a wire code + message pair received from a peer.
    pub fn from_wire(code: i32, message: String) -> Self {
        use error_codes::*;
        match code {
            PARSE_ERROR => Self::Protocol(ProtocolError::ParseError(message)),
            INVALID_REQUEST => Self::Protocol(ProtocolError::InvalidRequest(message)),
            METHOD_NOT_FOUND => Self::Protocol(ProtocolError::MethodNotFound(message)),
            INVALID_PARAMS => Self::Protocol(ProtocolError::InvalidParams(message)),
            TRANSPORT_ERROR => Self::Transport(TransportError::Remote(message)),
            RESOURCE_NOT_FOUND => Self::Resource(ResourceError::NotFound(message)),
            TOOL_NOT_FOUND => Self::Tool(ToolError::NotFound(message)),
            INTERNAL_ERROR => Self::Protocol(ProtocolError::InternalError(message)),
            other => Self::Protocol(ProtocolError::ServerError {
                code: other,
                message,
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Server error {code}: {message}")]
    ServerError { code: i32, message: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("{0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Resource read failed: {0}")]
    ReadFailed(String),
}

impl From<PolyMcpError> for crate::protocol::JsonRpcError {
    fn from(err: PolyMcpError) -> Self {
        let code = err.wire_code();
        // Wire messages carry the payload without the enum-level prefix;
        // the bare method-not-found string is pinned by the wire contract.
        let message = match &err {
            PolyMcpError::Protocol(p) => match p {
                ProtocolError::MethodNotFound(_) => "Method not found".to_string(),
                ProtocolError::ParseError(m)
                | ProtocolError::InvalidRequest(m)
                | ProtocolError::InvalidParams(m)
                | ProtocolError::InvalidResponse(m)
                | ProtocolError::InternalError(m)
                | ProtocolError::Configuration(m) => m.clone(),
                ProtocolError::ServerError { message, .. } => message.clone(),
            },
            PolyMcpError::Transport(t) => t.to_string(),
            PolyMcpError::Tool(t) => t.to_string(),
            PolyMcpError::Resource(r) => r.to_string(),
            other => other.to_string(),
        };
        crate::protocol::JsonRpcError::new(code, message)
    }
}

impl From<crate::protocol::JsonRpcError> for PolyMcpError {
    fn from(err: crate::protocol::JsonRpcError) -> Self {
        PolyMcpError::from_wire(err.code, err.message)
    }
}
