//! # PolyMCP Server
//!
//! Server side of the protocol: the request dispatcher with its fixed
//! method table, tool and resource registries, the optional pre-shared-key
//! gate, and the TTL resource cache sitting in front of resource handlers.
//!
//! ```no_run
//! use std::sync::Arc;
//! use polymcp_core::types::{ContentItem, ParamKind, ParamSpec, ToolSpec};
//! use polymcp_server::{tool_fn, Server, ServerInfo};
//!
//! #[tokio::main]
//! async fn main() -> polymcp_core::PolyResult<()> {
//!     let server = Server::new(ServerInfo::new("example", "1.0.0"));
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
//!     server.serve_tcp("127.0.0.1:9100").await
//! }
//! ```

pub mod cache;
mod dispatch;
pub mod handlers;
mod server;
#[cfg(feature = "websocket")]
mod websocket;

pub use cache::{ResourceCache, ResourceCacheConfig, Ttl};
pub use handlers::{resource_fn, tool_fn, ResourceHandler, ToolHandler};
pub use server::{Server, ServerInfo};
