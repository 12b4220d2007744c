//! Per-backend connection records and the connect sequence.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use polymcp_client::{Client, ClientConfig};
use polymcp_core::config::{ClientSettings, ServerEntry};
use polymcp_core::{PolyMcpError, PolyResult};
use polymcp_transport::{ChildProcessTransport, TcpTransport};

/// Bounded wait after spawning a subprocess backend before checking that it
/// is still alive.
pub const SETTLE_PERIOD: Duration = Duration::from_millis(500);

/// Lifecycle of one backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Healthy,
    Unhealthy,
    Disconnected,
    /// Reconnect attempts exhausted; the gateway keeps running without it.
    Failed,
}

/// One backend behind the gateway.
pub struct ServerConnection {
    pub name: String,
    /// Deep copy of the configuration this record was added with.
    pub entry: ServerEntry,
    pub state: ConnectionState,
    pub client: Option<Client>,
    /// Tool names advertised at connect time.
    pub tools: HashSet<String>,
    /// Resource URI prefixes advertised at connect time.
    pub resource_prefixes: Vec<String>,
    pub failures: u32,
    pub last_health_check: Option<Instant>,
}

impl ServerConnection {
    pub fn new(name: String, entry: ServerEntry) -> Self {
        Self {
            name,
            entry,
            state: ConnectionState::New,
            client: None,
            tools: HashSet::new(),
            resource_prefixes: Vec::new(),
            failures: 0,
            last_health_check: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Healthy | ConnectionState::Unhealthy
        ) && self.client.as_ref().is_some_and(Client::is_connected)
    }
}

/// Everything learned from a successful backend connect.
pub struct ConnectedBackend {
    pub client: Client,
    pub tools: HashSet<String>,
    pub resource_prefixes: Vec<String>,
}

/// Run the per-record connect sequence: start the backend, build its
/// client, and discover its advertisement sets. Runs without any gateway
/// lock held.
pub async fn connect_backend(
    name: &str,
    entry: &ServerEntry,
    settings: &ClientSettings,
) -> PolyResult<ConnectedBackend> {
    let config = ClientConfig {
        name: format!("{}:{name}", settings.client_name),
        version: settings.client_version.clone(),
        timeout_ms: settings.request_timeout_ms,
        api_key: entry.api_key.clone(),
    };

    let client = match (&entry.command, &entry.url) {
        (Some(command), _) => {
            let env: Vec<(String, String)> = entry
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let mut transport = ChildProcessTransport::spawn(command, &entry.args, &env)?;

            // Settle: give the child a beat, then confirm it is still up.
            tokio::time::sleep(SETTLE_PERIOD).await;
            if !transport.is_alive() {
                return Err(PolyMcpError::connection_failed(format!(
                    "backend '{name}' exited during the settle period"
                )));
            }
            Client::connect(Box::new(transport), config)?
        }
        (None, Some(url)) => connect_url(name, url, config).await?,
        (None, None) => {
            return Err(PolyMcpError::configuration(format!(
                "backend '{name}' has neither url nor command"
            )));
        }
    };

    // Advertisement discovery. Tools are required; a backend without
    // resource listings still routes tool calls.
    let tools: HashSet<String> = client
        .list_tools()
        .await?
        .into_iter()
        .map(|tool| tool.name)
        .collect();

    let mut resource_prefixes = Vec::new();
    match client.list_resources().await {
        Ok(resources) => {
            resource_prefixes.extend(resources.into_iter().map(|r| r.uri));
        }
        Err(e) => debug!(backend = %name, error = %e, "list_resources unavailable"),
    }
    match client.list_resource_templates().await {
        Ok(templates) => {
            resource_prefixes.extend(
                templates
                    .into_iter()
                    .map(|t| template_prefix(&t.uri_template)),
            );
        }
        Err(e) => debug!(backend = %name, error = %e, "list_resource_templates unavailable"),
    }

    info!(
        backend = %name,
        tools = tools.len(),
        prefixes = resource_prefixes.len(),
        "backend connected"
    );
    Ok(ConnectedBackend {
        client,
        tools,
        resource_prefixes,
    })
}

async fn connect_url(name: &str, url: &str, config: ClientConfig) -> PolyResult<Client> {
    if let Some(rest) = url.strip_prefix("tcp://") {
        let transport = TcpTransport::connect(rest).await?;
        return Client::connect(Box::new(transport), config);
    }

    #[cfg(feature = "websocket")]
    if url.starts_with("ws://") || url.starts_with("wss://") {
        let transport = polymcp_transport::WebSocketTransport::connect(url).await?;
        return Client::connect(Box::new(transport), config);
    }

    #[cfg(feature = "http")]
    if url.starts_with("http://") || url.starts_with("https://") {
        let timeout_ms = match config.timeout_ms {
            0 => polymcp_core::DEFAULT_REQUEST_TIMEOUT_MS,
            ms if ms < 0 => {
                return Err(PolyMcpError::invalid_params(format!(
                    "request timeout must not be negative, got {ms}"
                )))
            }
            ms => ms as u64,
        };
        let transport =
            polymcp_transport::HttpTransport::new(url, Duration::from_millis(timeout_ms))?;
        return Client::connect_request_response(Box::new(transport), config);
    }

    warn!(backend = %name, url = %url, "unsupported backend URL scheme");
    Err(PolyMcpError::configuration(format!(
        "backend '{name}' has an unsupported URL scheme: {url}"
    )))
}

/// Literal prefix of a URI template, up to its first placeholder.
pub fn template_prefix(template: &str) -> String {
    match template.find('{') {
        Some(index) => template[..index].to_string(),
        None => template.to_string(),
    }
}
