//! Configuration model for the gateway and its clients.
//!
//! Mirrors the external JSON configuration file: a map of MCP servers, a
//! client section, tool access control and named profiles. Field names on
//! disk are camelCase; unknown fields are ignored so configs can carry
//! collaborator-specific extras.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PolyMcpError, PolyResult};
use crate::protocol::constants::DEFAULT_REQUEST_TIMEOUT_MS;

/// One configured MCP server: either a URL-reachable endpoint or a local
/// command to spawn. Exactly one of `url` / `command` must be present.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ServerEntry {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn command(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Default::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn validate(&self, name: &str) -> PolyResult<()> {
        match (&self.url, &self.command) {
            (Some(_), Some(_)) => Err(PolyMcpError::configuration(format!(
                "server '{name}' sets both url and command"
            ))),
            (None, None) => Err(PolyMcpError::configuration(format!(
                "server '{name}' sets neither url nor command"
            ))),
            _ => Ok(()),
        }
    }
}

/// Client-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    #[serde(default = "default_client_name")]
    pub client_name: String,

    #[serde(default = "default_client_version")]
    pub client_version: String,

    #[serde(default)]
    pub use_server_manager: bool,

    /// Per-request timeout in milliseconds. 0 selects the built-in default;
    /// negative values are rejected.
    #[serde(default)]
    pub request_timeout_ms: i64,
}

fn default_client_name() -> String {
    "polymcp-client".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_version: default_client_version(),
            use_server_manager: false,
            request_timeout_ms: 0,
        }
    }
}

impl ClientSettings {
    /// Resolve the effective timeout, applying the 0 ⇒ default rule.
    pub fn effective_timeout_ms(&self) -> PolyResult<u64> {
        match self.request_timeout_ms {
            0 => Ok(DEFAULT_REQUEST_TIMEOUT_MS),
            ms if ms < 0 => Err(PolyMcpError::invalid_params(format!(
                "requestTimeoutMs must not be negative, got {ms}"
            ))),
            ms => Ok(ms as u64),
        }
    }
}

/// Which tools callers may reach through the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolAccessControl {
    #[serde(default = "default_true")]
    pub default_allow: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_tools: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for ToolAccessControl {
    fn default() -> Self {
        Self {
            default_allow: true,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
        }
    }
}

impl ToolAccessControl {
    /// Disallow wins over allow; otherwise the allow list, when non-empty,
    /// is exhaustive; otherwise `default_allow` decides.
    pub fn permits(&self, tool: &str) -> bool {
        if self.disallowed_tools.iter().any(|t| t == tool) {
            return false;
        }
        if !self.allowed_tools.is_empty() {
            return self.allowed_tools.iter().any(|t| t == tool);
        }
        self.default_allow
    }
}

/// A named selection of configured servers.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub servers: Vec<String>,

    #[serde(default)]
    pub active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: HashMap<String, ServerEntry>,

    #[serde(default)]
    pub client_config: ClientSettings,

    #[serde(default)]
    pub tool_access_control: ToolAccessControl,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub profiles: HashMap<String, Profile>,
}

impl GatewayConfig {
    pub fn load_from_str(raw: &str) -> PolyResult<Self> {
        let config: GatewayConfig = serde_json::from_str(raw)
            .map_err(|e| PolyMcpError::configuration(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> PolyResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::load_from_str(&raw)
    }

    pub fn validate(&self) -> PolyResult<()> {
        for (name, entry) in &self.mcp_servers {
            entry.validate(name)?;
        }
        for (profile_name, profile) in &self.profiles {
            for server in &profile.servers {
                if !self.mcp_servers.contains_key(server) {
                    return Err(PolyMcpError::configuration(format!(
                        "profile '{profile_name}' references unknown server '{server}'"
                    )));
                }
            }
        }
        // Surface a bad timeout at load time rather than first use.
        self.client_config.effective_timeout_ms()?;
        Ok(())
    }

    /// Servers selected by the active profile, or all servers when no
    /// profile is active. Order is deterministic (sorted by name).
    pub fn selected_servers(&self) -> Vec<(String, ServerEntry)> {
        let mut names: Vec<&String> = match self
            .profiles
            .values()
            .find(|profile| profile.active)
        {
            Some(profile) => profile.servers.iter().collect(),
            None => self.mcp_servers.keys().collect(),
        };
        names.sort();
        names
            .into_iter()
            .filter_map(|name| {
                self.mcp_servers
                    .get(name)
                    .map(|entry| (name.clone(), entry.clone()))
            })
            .collect()
    }
}
