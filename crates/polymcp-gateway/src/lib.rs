//! # PolyMCP Gateway
//!
//! Aggregates multiple MCP servers behind one façade. Each backend gets its
//! own client correlation core; routing maps from tool name and resource
//! URI prefix to backend index are populated lazily on first lookup and
//! invalidated when a backend disconnects.
//!
//! Lock discipline: the gateway mutex is held for routing lookups and
//! record bookkeeping only, and always released before an RPC is issued —
//! each backend's client does its own locking underneath.

pub mod connection;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use polymcp_client::Client;
use polymcp_core::config::{ClientSettings, GatewayConfig, ServerEntry, ToolAccessControl};
use polymcp_core::types::{ContentItem, ResourceDescriptor, ToolSpec};
use polymcp_core::{PolyMcpError, PolyResult};

pub use connection::{ConnectionState, ServerConnection, SETTLE_PERIOD};

use connection::{connect_backend, ConnectedBackend};

struct GatewayInner {
    connections: Vec<ServerConnection>,
    tool_routes: HashMap<String, usize>,
    resource_routes: HashMap<String, usize>,
}

impl GatewayInner {
    fn invalidate_routes(&mut self) {
        self.tool_routes.clear();
        self.resource_routes.clear();
    }
}

/// Multi-server aggregator.
pub struct Gateway {
    inner: Arc<Mutex<GatewayInner>>,
    settings: ClientSettings,
    access: ToolAccessControl,
}

impl Gateway {
    pub fn new(settings: ClientSettings, access: ToolAccessControl) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GatewayInner {
                connections: Vec::new(),
                tool_routes: HashMap::new(),
                resource_routes: HashMap::new(),
            })),
            settings,
            access,
        }
    }

    /// Build a gateway from a configuration document, adding every selected
    /// server. No network activity happens here.
    pub fn from_config(config: &GatewayConfig) -> PolyResult<Self> {
        config.validate()?;
        let gateway = Self::new(
            config.client_config.clone(),
            config.tool_access_control.clone(),
        );
        for (name, entry) in config.selected_servers() {
            gateway.add(name, entry);
        }
        Ok(gateway)
    }

    /// Append a backend record. Configuration is deep-copied; nothing is
    /// contacted until [`Gateway::connect_all`].
    pub fn add(&self, name: impl Into<String>, entry: ServerEntry) {
        let mut inner = self.inner.lock().expect("gateway poisoned");
        let name = name.into();
        debug!(backend = %name, "added backend record");
        inner.connections.push(ServerConnection::new(name, entry));
    }

    pub fn backend_count(&self) -> usize {
        self.inner.lock().expect("gateway poisoned").connections.len()
    }

    /// Per-record states, in declaration order. Callers should inspect this
    /// after `connect_all`: partial success is not surfaced as an error.
    pub fn connection_states(&self) -> Vec<(String, ConnectionState)> {
        let inner = self.inner.lock().expect("gateway poisoned");
        inner
            .connections
            .iter()
            .map(|c| (c.name.clone(), c.state))
            .collect()
    }

    /// Connect every backend that is not yet connected. Succeeds when at
    /// least one backend comes up; fails with connection-failed when every
    /// attempt fails.
    pub async fn connect_all(&self) -> PolyResult<()> {
        let targets: Vec<(usize, String, ServerEntry)> = {
            let mut inner = self.inner.lock().expect("gateway poisoned");
            inner
                .connections
                .iter_mut()
                .enumerate()
                .filter(|(_, c)| !c.is_connected())
                .map(|(index, c)| {
                    c.state = ConnectionState::Connecting;
                    (index, c.name.clone(), c.entry.clone())
                })
                .collect()
        };

        if targets.is_empty() {
            return Ok(());
        }

        let mut connected = 0usize;
        let total = targets.len();
        for (index, name, entry) in targets {
            match connect_backend(&name, &entry, &self.settings).await {
                Ok(backend) => {
                    self.commit_connect(index, backend);
                    connected += 1;
                }
                Err(e) => {
                    warn!(backend = %name, error = %e, "backend failed to connect");
                    let mut inner = self.inner.lock().expect("gateway poisoned");
                    let record = &mut inner.connections[index];
                    record.state = ConnectionState::Disconnected;
                    record.failures += 1;
                }
            }
        }

        info!(connected, total, "connect_all finished");
        if connected == 0 {
            return Err(PolyMcpError::connection_failed(format!(
                "all {total} backends failed to connect"
            )));
        }
        Ok(())
    }

    fn commit_connect(&self, index: usize, backend: ConnectedBackend) {
        let mut inner = self.inner.lock().expect("gateway poisoned");
        let record = &mut inner.connections[index];
        record.client = Some(backend.client);
        record.tools = backend.tools;
        record.resource_prefixes = backend.resource_prefixes;
        record.state = ConnectionState::Connected;
        inner.invalidate_routes();
    }

    /// Administratively disconnect one backend. Its advertisement sets are
    /// freed and the routing maps invalidated.
    pub fn disconnect_backend(&self, index: usize) {
        let mut inner = self.inner.lock().expect("gateway poisoned");
        if let Some(record) = inner.connections.get_mut(index) {
            if let Some(client) = record.client.take() {
                client.disconnect();
            }
            record.tools.clear();
            record.resource_prefixes.clear();
            record.state = ConnectionState::Disconnected;
            info!(backend = %record.name, "backend disconnected");
            inner.invalidate_routes();
        }
    }

    /// Tear everything down, in reverse order of creation. Best-effort:
    /// failures are logged, never propagated.
    pub fn disconnect_all(&self) {
        let mut inner = self.inner.lock().expect("gateway poisoned");
        for record in inner.connections.iter_mut().rev() {
            if let Some(client) = record.client.take() {
                client.disconnect();
            }
            record.tools.clear();
            record.resource_prefixes.clear();
            if record.state != ConnectionState::Failed {
                record.state = ConnectionState::Disconnected;
            }
        }
        inner.invalidate_routes();
        info!("all backends disconnected");
    }

    /// Index of the backend advertising `tool`, if any. Lazily populates
    /// the routing map; a cached route to a dead backend is dropped and the
    /// advertisement sets are rescanned.
    pub fn select_for_tool(&self, tool: &str) -> Option<usize> {
        let mut inner = self.inner.lock().expect("gateway poisoned");
        if let Some(&index) = inner.tool_routes.get(tool) {
            if inner.connections[index].is_connected() {
                return Some(index);
            }
            inner.invalidate_routes();
        }
        let found = inner
            .connections
            .iter()
            .position(|c| c.is_connected() && c.tools.contains(tool));
        if let Some(index) = found {
            inner.tool_routes.insert(tool.to_string(), index);
        }
        found
    }

    /// Index of the backend whose advertised resource prefixes cover
    /// `uri`. First-declared wins.
    pub fn select_for_resource(&self, uri: &str) -> Option<usize> {
        let mut inner = self.inner.lock().expect("gateway poisoned");
        if let Some(&index) = inner.resource_routes.get(uri) {
            if inner.connections[index].is_connected() {
                return Some(index);
            }
            inner.invalidate_routes();
        }
        let found = inner.connections.iter().position(|c| {
            c.is_connected()
                && c.resource_prefixes
                    .iter()
                    .any(|prefix| uri.starts_with(prefix.as_str()))
        });
        if let Some(index) = found {
            inner.resource_routes.insert(uri.to_string(), index);
        }
        found
    }

    fn client_at(&self, index: usize) -> Option<Client> {
        let inner = self.inner.lock().expect("gateway poisoned");
        inner.connections.get(index).and_then(|c| c.client.clone())
    }

    /// Call a tool on whichever backend advertises it.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> PolyResult<Vec<ContentItem>> {
        if !self.access.permits(name) {
            debug!(tool = %name, "tool blocked by access control");
            return Err(PolyMcpError::tool_not_found(name));
        }
        let index = self
            .select_for_tool(name)
            .ok_or_else(|| PolyMcpError::tool_not_found(name))?;
        let client = self
            .client_at(index)
            .ok_or_else(|| PolyMcpError::tool_not_found(name))?;
        // Gateway lock released; the call runs on the backend's own client.
        client.call_tool(name, arguments).await
    }

    /// Read a resource from whichever backend advertises its prefix.
    pub async fn read_resource(&self, uri: &str) -> PolyResult<Vec<ContentItem>> {
        let index = self
            .select_for_resource(uri)
            .ok_or_else(|| PolyMcpError::resource_not_found(uri))?;
        let client = self
            .client_at(index)
            .ok_or_else(|| PolyMcpError::resource_not_found(uri))?;
        client.read_resource(uri).await
    }

    /// Aggregate tool listing across every connected backend, filtered by
    /// access control. Backend name tags each spec's origin.
    pub async fn list_all_tools(&self) -> Vec<(String, ToolSpec)> {
        let clients: Vec<(String, Client)> = {
            let inner = self.inner.lock().expect("gateway poisoned");
            inner
                .connections
                .iter()
                .filter(|c| c.is_connected())
                .filter_map(|c| c.client.clone().map(|client| (c.name.clone(), client)))
                .collect()
        };

        let mut all = Vec::new();
        for (name, client) in clients {
            match client.list_tools().await {
                Ok(tools) => {
                    all.extend(
                        tools
                            .into_iter()
                            .filter(|t| self.access.permits(&t.name))
                            .map(|t| (name.clone(), t)),
                    );
                }
                Err(e) => warn!(backend = %name, error = %e, "list_tools failed"),
            }
        }
        all
    }

    /// Aggregate static-resource listing across every connected backend.
    pub async fn list_all_resources(&self) -> Vec<(String, ResourceDescriptor)> {
        let clients: Vec<(String, Client)> = {
            let inner = self.inner.lock().expect("gateway poisoned");
            inner
                .connections
                .iter()
                .filter(|c| c.is_connected())
                .filter_map(|c| c.client.clone().map(|client| (c.name.clone(), client)))
                .collect()
        };

        let mut all = Vec::new();
        for (name, client) in clients {
            match client.list_resources().await {
                Ok(resources) => {
                    all.extend(resources.into_iter().map(|r| (name.clone(), r)));
                }
                Err(e) => warn!(backend = %name, error = %e, "list_resources failed"),
            }
        }
        all
    }

    /// Ping every connected backend; reconnect unhealthy ones with up to
    /// `max_attempts` tries spaced by `retry_interval`. Succeeds iff every
    /// record is healthy at the end.
    pub async fn check_health(
        &self,
        max_attempts: u32,
        retry_interval: Duration,
    ) -> PolyResult<()> {
        let targets: Vec<(usize, String, Option<Client>)> = {
            let inner = self.inner.lock().expect("gateway poisoned");
            inner
                .connections
                .iter()
                .enumerate()
                .filter(|(_, c)| c.state != ConnectionState::Failed)
                .map(|(index, c)| (index, c.name.clone(), c.client.clone()))
                .collect()
        };

        let total = targets.len();
        let mut unhealthy = 0usize;
        for (index, name, client) in targets {
            let alive = match &client {
                Some(client) if client.is_connected() => client.ping().await.is_ok(),
                _ => false,
            };

            if alive {
                let mut inner = self.inner.lock().expect("gateway poisoned");
                let record = &mut inner.connections[index];
                record.state = ConnectionState::Healthy;
                record.failures = 0;
                record.last_health_check = Some(tokio::time::Instant::now());
            } else {
                warn!(backend = %name, "health check failed");
                {
                    let mut inner = self.inner.lock().expect("gateway poisoned");
                    let record = &mut inner.connections[index];
                    record.state = ConnectionState::Unhealthy;
                    record.failures += 1;
                    record.last_health_check = Some(tokio::time::Instant::now());
                    inner.invalidate_routes();
                }
                if self.reconnect(index, max_attempts, retry_interval).await.is_err() {
                    unhealthy += 1;
                }
            }
        }

        if unhealthy > 0 {
            warn!(unhealthy, total, "health check finished with unhealthy backends");
            return Err(PolyMcpError::connection_failed(format!(
                "{unhealthy} of {total} backends unhealthy"
            )));
        }
        Ok(())
    }

    /// Tear down one record and re-run its connect sequence, up to
    /// `max_attempts` times spaced by `interval`.
    pub async fn reconnect(
        &self,
        index: usize,
        max_attempts: u32,
        interval: Duration,
    ) -> PolyResult<()> {
        let (name, entry) = {
            let mut inner = self.inner.lock().expect("gateway poisoned");
            let record = inner
                .connections
                .get_mut(index)
                .ok_or_else(|| PolyMcpError::invalid_params("no such backend index"))?;
            if let Some(client) = record.client.take() {
                client.disconnect();
            }
            record.tools.clear();
            record.resource_prefixes.clear();
            record.state = ConnectionState::Connecting;
            inner.invalidate_routes();
            let record = &inner.connections[index];
            (record.name.clone(), record.entry.clone())
        };

        for attempt in 1..=max_attempts.max(1) {
            debug!(backend = %name, attempt, "reconnect attempt");
            match connect_backend(&name, &entry, &self.settings).await {
                Ok(backend) => {
                    self.commit_connect(index, backend);
                    info!(backend = %name, attempt, "backend reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(backend = %name, attempt, error = %e, "reconnect failed");
                    if attempt < max_attempts {
                        tokio::time::sleep(interval).await;
                    }
                }
            }
        }

        let mut inner = self.inner.lock().expect("gateway poisoned");
        let record = &mut inner.connections[index];
        record.state = ConnectionState::Failed;
        record.failures += 1;
        Err(PolyMcpError::connection_failed(format!(
            "backend '{name}' did not come back after {max_attempts} attempts"
        )))
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let states = self.connection_states();
        f.debug_struct("Gateway").field("backends", &states).finish()
    }
}
