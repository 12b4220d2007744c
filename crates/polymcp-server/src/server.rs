//! Server state, registration and serving loops.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use polymcp_core::template::{CompiledTemplate, TemplateEngine};
use polymcp_core::types::{ResourceDescriptor, ResourceTemplateDescriptor, ToolSpec};
use polymcp_core::{PolyMcpError, PolyResult};
use polymcp_transport::framing::length_codec;

use crate::cache::{ResourceCache, ResourceCacheConfig};
use crate::handlers::{ResourceHandler, ToolHandler};

/// Server identity included in diagnostics.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl ServerInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

pub(crate) struct ToolRegistration {
    pub spec: ToolSpec,
    pub handler: Arc<dyn ToolHandler>,
}

pub(crate) struct TemplateRegistration {
    pub descriptor: ResourceTemplateDescriptor,
    pub compiled: Arc<CompiledTemplate>,
    pub handler: Arc<dyn ResourceHandler>,
}

pub(crate) struct StaticResource {
    pub descriptor: ResourceDescriptor,
    pub handler: Arc<dyn ResourceHandler>,
}

pub(crate) struct ServerState {
    pub info: ServerInfo,
    pub tools: RwLock<HashMap<String, ToolRegistration>>,
    /// Matched in declaration order.
    pub templates: RwLock<Vec<TemplateRegistration>>,
    pub static_resources: RwLock<Vec<StaticResource>>,
    pub default_resource_handler: RwLock<Option<Arc<dyn ResourceHandler>>>,
    pub api_key: Option<String>,
    /// When set, connections emit an id-0 keepalive frame at this interval.
    pub keepalive: Option<std::time::Duration>,
    pub cache: ResourceCache,
    pub engine: TemplateEngine,
}

/// MCP server. Cheap to clone; all clones share one registry set.
#[derive(Clone)]
pub struct Server {
    pub(crate) state: Arc<ServerState>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.state.info.name)
            .field("version", &self.state.info.version)
            .finish()
    }
}

impl Server {
    pub fn new(info: ServerInfo) -> Self {
        Self::with_cache_config(info, ResourceCacheConfig::default())
    }

    pub fn with_cache_config(info: ServerInfo, cache_config: ResourceCacheConfig) -> Self {
        Self {
            state: Arc::new(ServerState {
                info,
                tools: RwLock::new(HashMap::new()),
                templates: RwLock::new(Vec::new()),
                static_resources: RwLock::new(Vec::new()),
                default_resource_handler: RwLock::new(None),
                api_key: None,
                keepalive: None,
                cache: ResourceCache::new(cache_config),
                engine: TemplateEngine::default(),
            }),
        }
    }

    /// Require this pre-shared key on every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let state = Arc::get_mut(&mut self.state)
            .expect("with_api_key must be called before the server is shared");
        state.api_key = Some(api_key.into());
        self
    }

    /// Emit an id-0 keepalive frame on every stream connection at
    /// `interval`. Clients discard them; they only keep idle links warm.
    pub fn with_keepalive(mut self, interval: std::time::Duration) -> Self {
        let state = Arc::get_mut(&mut self.state)
            .expect("with_keepalive must be called before the server is shared");
        state.keepalive = Some(interval);
        self
    }

    pub fn info(&self) -> &ServerInfo {
        &self.state.info
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.state.cache
    }

    /// Register a tool. Duplicate names are rejected.
    pub async fn register_tool(
        &self,
        spec: ToolSpec,
        handler: Arc<dyn ToolHandler>,
    ) -> PolyResult<()> {
        let mut tools = self.state.tools.write().await;
        if tools.contains_key(&spec.name) {
            return Err(PolyMcpError::invalid_params(format!(
                "tool '{}' is already registered",
                spec.name
            )));
        }
        debug!(tool = %spec.name, "registered tool");
        tools.insert(spec.name.clone(), ToolRegistration { spec, handler });
        Ok(())
    }

    /// Register a template-parameterized resource. The template is compiled
    /// eagerly so registration surfaces syntax errors.
    pub async fn register_resource_template(
        &self,
        descriptor: ResourceTemplateDescriptor,
        handler: Arc<dyn ResourceHandler>,
    ) -> PolyResult<()> {
        let compiled = self.state.engine.compile(&descriptor.uri_template)?;
        debug!(template = %descriptor.uri_template, "registered resource template");
        self.state.templates.write().await.push(TemplateRegistration {
            descriptor,
            compiled,
            handler,
        });
        Ok(())
    }

    /// Register a static (exact-URI) resource.
    pub async fn register_resource(
        &self,
        descriptor: ResourceDescriptor,
        handler: Arc<dyn ResourceHandler>,
    ) {
        debug!(uri = %descriptor.uri, "registered resource");
        self.state
            .static_resources
            .write()
            .await
            .push(StaticResource { descriptor, handler });
    }

    /// Fallback handler for URIs no template or static resource matches.
    pub async fn set_default_resource_handler(&self, handler: Arc<dyn ResourceHandler>) {
        *self.state.default_resource_handler.write().await = Some(handler);
    }

    /// Serve framed connections accepted from `listener` until it fails.
    pub async fn serve_listener(&self, listener: TcpListener) -> PolyResult<()> {
        let local = listener.local_addr()?;
        info!(server = %self.state.info.name, %local, "serving TCP");
        loop {
            let (stream, remote) = listener.accept().await?;
            debug!(%remote, "accepted connection");
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run_connection(stream).await {
                    warn!(%remote, error = %e, "connection ended with error");
                }
            });
        }
    }

    /// Bind `addr` and serve until the listener fails.
    pub async fn serve_tcp(&self, addr: &str) -> PolyResult<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    async fn run_connection(&self, stream: TcpStream) -> PolyResult<()> {
        stream.set_nodelay(true).ok();
        let mut framed = Framed::new(stream, length_codec());
        let mut keepalive = self.state.keepalive.map(tokio::time::interval);

        loop {
            tokio::select! {
                frame = framed.next() => {
                    let Some(frame) = frame else { break };
                    let frame = frame.map_err(|e| {
                        PolyMcpError::transport_error(format!("frame read failed: {e}"))
                    })?;
                    if let Some(response) = self.handle_frame(&frame).await {
                        let body = serde_json::to_vec(&response)?;
                        framed.send(body.into()).await.map_err(|e| {
                            PolyMcpError::transport_error(format!("frame write failed: {e}"))
                        })?;
                    }
                }
                _ = tick(&mut keepalive) => {
                    // Bare id-0 response; the peer's correlation core drops it.
                    let body = serde_json::to_vec(&serde_json::json!({"id": 0}))?;
                    framed.send(body.into()).await.map_err(|e| {
                        PolyMcpError::transport_error(format!("keepalive write failed: {e}"))
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Serve this process's stdin/stdout until EOF.
    pub async fn serve_stdio(&self) -> PolyResult<()> {
        use tokio_util::codec::{FramedRead, FramedWrite};
        info!(server = %self.state.info.name, "serving stdio");
        let mut reader = FramedRead::new(tokio::io::stdin(), length_codec());
        let mut writer = FramedWrite::new(tokio::io::stdout(), length_codec());
        while let Some(frame) = reader.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "stdin frame read failed");
                    break;
                }
            };
            if let Some(response) = self.handle_frame(&frame).await {
                let body = serde_json::to_vec(&response)?;
                writer
                    .send(body.into())
                    .await
                    .map_err(|e| PolyMcpError::transport_error(format!("stdout write failed: {e}")))?;
            }
        }
        info!("stdin closed, stdio server stopping");
        Ok(())
    }
}

/// Tick the keepalive interval, or pend forever when keepalives are off.
async fn tick(keepalive: &mut Option<tokio::time::Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
