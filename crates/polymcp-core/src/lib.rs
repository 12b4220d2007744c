//! # PolyMCP Core
//!
//! Core protocol implementation shared by the PolyMCP client, server and
//! gateway crates: the JSON-RPC envelope subset, the wire error-code
//! registry, content items, tool/resource metadata, the URI template engine
//! and the configuration model.
//!
//! ## Modules
//!
//! - [`protocol`]: envelope types, method names, framing constants
//! - [`types`]: content items, tools, resources
//! - [`template`]: URI template compilation, matching and caching
//! - [`config`]: gateway/client configuration model
//! - [`error`]: error taxonomy and wire-code mapping

pub mod config;
pub mod error;
pub mod protocol;
pub mod template;
pub mod types;

pub use error::{error_codes, PolyMcpError, PolyResult};

pub use protocol::{
    methods, JsonRpcError, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    DEFAULT_REQUEST_TIMEOUT_MS, KEEPALIVE_ID, MAX_FRAME_LEN,
};

pub use types::{
    get_bool_param, get_float_param, get_int_param, get_object_param, get_string_param,
    ContentItem, ListResourceTemplatesResponse, ListResourcesResponse, ListToolsResponse,
    ParamKind, ParamSpec, ReadResourceRequest, ReadResourceResponse, ResourceDescriptor,
    ResourceTemplateDescriptor, ToolCallRequest, ToolOutput, ToolSpec,
};

pub use template::{
    CompiledTemplate, TemplateEngine, TemplateError, TemplateParams, TemplateValue,
};

pub use config::{ClientSettings, GatewayConfig, Profile, ServerEntry, ToolAccessControl};
