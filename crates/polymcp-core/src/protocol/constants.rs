//! Protocol constants shared by client, server and gateway.

/// Standard method names exposed by every server dispatcher.
pub mod methods {
    pub const LIST_RESOURCES: &str = "list_resources";
    pub const LIST_RESOURCE_TEMPLATES: &str = "list_resource_templates";
    pub const READ_RESOURCE: &str = "read_resource";
    pub const LIST_TOOLS: &str = "list_tools";
    pub const CALL_TOOL: &str = "call_tool";
    pub const PING: &str = "ping";
}

/// Request id reserved as the "not assigned" sentinel. Responses carrying it
/// are keepalives and are discarded by the client correlation core.
pub const KEEPALIVE_ID: u64 = 0;

/// Default per-request timeout applied when configuration passes 0.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Upper bound on a framed message body. Frames longer than this are
/// rejected by stream transports before allocation.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Bytes of big-endian length prefix in front of every stream-framed message.
pub const FRAME_HEADER_LEN: usize = 4;
