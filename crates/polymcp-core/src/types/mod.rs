//! Core MCP types: content items, tools, resources.

pub mod content;
pub mod resources;
pub mod tools;

pub use content::ContentItem;
pub use resources::{
    ListResourceTemplatesResponse, ListResourcesResponse, ReadResourceRequest,
    ReadResourceResponse, ResourceDescriptor, ResourceTemplateDescriptor,
};
pub use tools::{
    get_bool_param, get_float_param, get_int_param, get_object_param, get_string_param,
    ListToolsResponse, ParamKind, ParamSpec, ToolCallRequest, ToolOutput, ToolSpec,
};
