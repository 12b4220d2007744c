//! # PolyMCP
//!
//! A multi-server Model Context Protocol stack: JSON-RPC client and server
//! over pluggable transports (TCP, stdio, WebSocket, HTTP), plus a gateway
//! that aggregates several MCP servers behind a single façade.
//!
//! This crate re-exports the public API of the workspace crates; depend on
//! it for the full stack, or on the individual crates for a slimmer build.
//!
//! ## Quick start
//!
//! ```no_run
//! use polymcp::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> PolyResult<()> {
//!     let server = Server::new(ServerInfo::new("demo", "0.1.0"));
//!     server
//!         .register_tool(
//!             ToolSpec::new("echo")
//!                 .with_param(ParamSpec::new("text", ParamKind::String).required()),
//!             tool_fn(|arguments| async move {
//!                 let text = arguments["text"].as_str().unwrap_or_default().to_string();
//!                 Ok(vec![ContentItem::text(text)])
//!             }),
//!         )
//!         .await?;
//!     tokio::spawn({
//!         let server = server.clone();
//!         async move { server.serve_tcp("127.0.0.1:9100").await }
//!     });
//!
//!     let transport = TcpTransport::connect("127.0.0.1:9100").await?;
//!     let client = Client::connect(Box::new(transport), ClientConfig::default())?;
//!     let content = client.call_tool("echo", json!({"text": "hello"})).await?;
//!     println!("{content:?}");
//!     Ok(())
//! }
//! ```

pub use polymcp_core as core;
pub use polymcp_transport as transport;

pub use polymcp_client::{Client, ClientConfig};
pub use polymcp_core::{
    error_codes, ClientSettings, ContentItem, GatewayConfig, JsonRpcError, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, ParamKind, ParamSpec, PolyMcpError, PolyResult,
    ResourceDescriptor, ResourceTemplateDescriptor, ServerEntry, TemplateEngine, TemplateParams,
    TemplateValue, ToolAccessControl, ToolSpec,
};
pub use polymcp_gateway::{ConnectionState, Gateway};
pub use polymcp_server::{
    resource_fn, tool_fn, ResourceCache, ResourceCacheConfig, ResourceHandler, Server, ServerInfo,
    ToolHandler, Ttl,
};
pub use polymcp_transport::{
    ChildProcessTransport, StdioTransport, TcpTransport, Transport, TransportConfig,
};

pub mod prelude;
