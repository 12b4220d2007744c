//! Request dispatch: envelope parsing, API-key gate, the fixed method
//! table, and error-envelope wrapping.

use serde_json::{json, Value};
use tracing::{debug, warn};

use polymcp_core::protocol::{methods, JsonRpcRequest, JsonRpcResponse, KEEPALIVE_ID};
use polymcp_core::template::TemplateParams;
use polymcp_core::types::{
    ContentItem, ListResourceTemplatesResponse, ListResourcesResponse, ListToolsResponse,
    ReadResourceResponse,
};
use polymcp_core::{PolyMcpError, PolyResult};

use crate::cache::Ttl;
use crate::server::Server;

impl Server {
    /// Handle one raw frame. `None` means no response is sent (the frame
    /// was a notification).
    pub async fn handle_frame(&self, raw: &[u8]) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_slice(raw) {
            Ok(request) => request,
            Err(e) => {
                // The id is unavailable in an unparseable frame.
                debug!(error = %e, "failed to parse request frame");
                return Some(JsonRpcResponse::error(
                    KEEPALIVE_ID,
                    PolyMcpError::parse_error(format!("invalid request JSON: {e}")).into(),
                ));
            }
        };
        self.handle_request(request).await
    }

    /// Handle a decoded request envelope.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id;

        if let Some(expected) = self.state.api_key.as_deref() {
            if !expected.is_empty() && request.api_key.as_deref() != Some(expected) {
                warn!(method = %request.method, "request rejected: bad api key");
                // Best-effort id: 0 when the envelope carried none.
                return Some(JsonRpcResponse::error(
                    id.unwrap_or(KEEPALIVE_ID),
                    PolyMcpError::invalid_request("Invalid API Key").into(),
                ));
            }
        }

        let outcome = self.dispatch(&request).await;

        match id {
            Some(id) => Some(match outcome {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => JsonRpcResponse::error(id, e.into()),
            }),
            None => {
                // Notification: handled, but no response goes back.
                if let Err(e) = outcome {
                    debug!(method = %request.method, error = %e, "notification handler failed");
                }
                None
            }
        }
    }

    async fn dispatch(&self, request: &JsonRpcRequest) -> PolyResult<Value> {
        let params = request.params.clone().unwrap_or(Value::Null);
        match request.method.as_str() {
            methods::LIST_RESOURCES => self.handle_list_resources().await,
            methods::LIST_RESOURCE_TEMPLATES => self.handle_list_resource_templates().await,
            methods::READ_RESOURCE => self.handle_read_resource(&params).await,
            methods::LIST_TOOLS => self.handle_list_tools().await,
            methods::CALL_TOOL => self.handle_call_tool(&params).await,
            methods::PING => Ok(json!({})),
            other => {
                debug!(method = %other, "method not found");
                Err(PolyMcpError::method_not_found(other))
            }
        }
    }

    async fn handle_list_resources(&self) -> PolyResult<Value> {
        let resources = self.state.static_resources.read().await;
        let response = ListResourcesResponse {
            resources: resources.iter().map(|r| r.descriptor.clone()).collect(),
        };
        Ok(serde_json::to_value(response)?)
    }

    async fn handle_list_resource_templates(&self) -> PolyResult<Value> {
        let templates = self.state.templates.read().await;
        let response = ListResourceTemplatesResponse {
            resource_templates: templates.iter().map(|t| t.descriptor.clone()).collect(),
        };
        Ok(serde_json::to_value(response)?)
    }

    async fn handle_list_tools(&self) -> PolyResult<Value> {
        let tools = self.state.tools.read().await;
        let mut specs: Vec<_> = tools.values().map(|t| t.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(serde_json::to_value(ListToolsResponse { tools: specs })?)
    }

    async fn handle_call_tool(&self, params: &Value) -> PolyResult<Value> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| PolyMcpError::invalid_params("call_tool requires a tool name"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let (spec, handler) = {
            let tools = self.state.tools.read().await;
            match tools.get(name) {
                Some(registration) => {
                    (registration.spec.clone(), registration.handler.clone())
                }
                None => {
                    return Err(PolyMcpError::tool_not_found(name));
                }
            }
        };

        spec.validate_arguments(&arguments)
            .map_err(PolyMcpError::invalid_params)?;

        let content = handler.handle_tool_call(arguments).await?;
        Ok(serde_json::to_value(content)?)
    }

    async fn handle_read_resource(&self, params: &Value) -> PolyResult<Value> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| PolyMcpError::invalid_params("read_resource requires a uri"))?;

        if let Some(contents) = self.state.cache.get(uri) {
            return wrap_contents(contents);
        }

        let contents = self.read_uncached(uri).await?;
        self.state.cache.put(uri, &contents, Ttl::Default);
        wrap_contents(contents)
    }

    /// Resolve a URI: static resources first, then templates in
    /// declaration order, then the default handler.
    async fn read_uncached(&self, uri: &str) -> PolyResult<Vec<ContentItem>> {
        {
            let statics = self.state.static_resources.read().await;
            if let Some(resource) = statics.iter().find(|r| r.descriptor.uri == uri) {
                let handler = resource.handler.clone();
                drop(statics);
                return handler.read(uri, TemplateParams::new()).await;
            }
        }

        let matched = {
            let templates = self.state.templates.read().await;
            templates.iter().find_map(|registration| {
                registration
                    .compiled
                    .extract(uri)
                    .map(|params| (registration.handler.clone(), params))
            })
        };
        if let Some((handler, params)) = matched {
            return handler.read(uri, params).await;
        }

        let default = self.state.default_resource_handler.read().await.clone();
        match default {
            Some(handler) => handler.read(uri, TemplateParams::new()).await,
            None => Err(PolyMcpError::resource_not_found(uri)),
        }
    }
}

fn wrap_contents(contents: Vec<ContentItem>) -> PolyResult<Value> {
    Ok(serde_json::to_value(ReadResourceResponse { contents })?)
}
