//! JSON-RPC protocol implementation.

pub mod constants;
pub mod jsonrpc;

pub use constants::{
    methods, DEFAULT_REQUEST_TIMEOUT_MS, FRAME_HEADER_LEN, KEEPALIVE_ID, MAX_FRAME_LEN,
};
pub use jsonrpc::{
    validate_message, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
};
