//! Handler traits for the PolyMCP server.
//!
//! Implementations return either a content-item sequence (success) or a
//! `PolyMcpError` (failure); the dispatcher wraps either outcome into the
//! response envelope. Handler failures never take the server down.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use polymcp_core::template::TemplateParams;
use polymcp_core::types::ContentItem;
use polymcp_core::PolyResult;

/// Tool handler: invoked by `call_tool` after argument validation.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle_tool_call(&self, arguments: Value) -> PolyResult<Vec<ContentItem>>;
}

/// Resource handler: invoked by `read_resource` with the parameters
/// extracted from the matching template (empty for static resources and the
/// default handler).
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, uri: &str, params: TemplateParams) -> PolyResult<Vec<ContentItem>>;
}

struct FnToolHandler<F> {
    callback: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = PolyResult<Vec<ContentItem>>> + Send,
{
    async fn handle_tool_call(&self, arguments: Value) -> PolyResult<Vec<ContentItem>> {
        (self.callback)(arguments).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn tool_fn<F, Fut>(callback: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PolyResult<Vec<ContentItem>>> + Send + 'static,
{
    Arc::new(FnToolHandler { callback })
}

struct FnResourceHandler<F> {
    callback: F,
}

#[async_trait]
impl<F, Fut> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(String, TemplateParams) -> Fut + Send + Sync,
    Fut: Future<Output = PolyResult<Vec<ContentItem>>> + Send,
{
    async fn read(&self, uri: &str, params: TemplateParams) -> PolyResult<Vec<ContentItem>> {
        (self.callback)(uri.to_string(), params).await
    }
}

/// Wrap an async closure as a [`ResourceHandler`].
pub fn resource_fn<F, Fut>(callback: F) -> Arc<dyn ResourceHandler>
where
    F: Fn(String, TemplateParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PolyResult<Vec<ContentItem>>> + Send + 'static,
{
    Arc::new(FnResourceHandler { callback })
}
