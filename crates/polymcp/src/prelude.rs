//! Convenience prelude: `use polymcp::prelude::*;`

pub use polymcp_client::{Client, ClientConfig};
pub use polymcp_core::{
    ClientSettings, ContentItem, GatewayConfig, ParamKind, ParamSpec, PolyMcpError, PolyResult,
    ResourceDescriptor, ResourceTemplateDescriptor, ServerEntry, TemplateParams, TemplateValue,
    ToolAccessControl, ToolSpec,
};
pub use polymcp_gateway::{ConnectionState, Gateway};
pub use polymcp_server::{
    resource_fn, tool_fn, ResourceHandler, Server, ServerInfo, ToolHandler, Ttl,
};
pub use polymcp_transport::{TcpTransport, Transport, TransportConfig};
