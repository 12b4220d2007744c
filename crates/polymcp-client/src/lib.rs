//! # PolyMCP Client
//!
//! The client correlation core: issues request ids, parks callers on the
//! pending-request table, routes out-of-order responses from the transport
//! receive task back to the right caller, and surfaces timeouts, transport
//! failures and server errors uniformly.
//!
//! Asynchronous transports (TCP, stdio, WebSocket) are split into a writer
//! task fed by a channel and a receive task owning the incoming half, so a
//! parked receive never delays an outgoing send. The synchronous HTTP
//! transport bypasses the table entirely: each send performs the whole
//! round-trip and the response id is checked against the request id.

pub mod pending;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use polymcp_core::error::error_codes;
use polymcp_core::protocol::{
    methods, JsonRpcMessage, JsonRpcRequest, DEFAULT_REQUEST_TIMEOUT_MS, KEEPALIVE_ID,
};
use polymcp_core::types::{
    ContentItem, ListResourceTemplatesResponse, ListResourcesResponse, ListToolsResponse,
    ReadResourceResponse, ResourceDescriptor, ResourceTemplateDescriptor, ToolSpec,
};
use polymcp_core::{PolyMcpError, PolyResult};
use polymcp_transport::{RequestTransport, Transport, TransportError, TransportSender};

use pending::{Outcome, PendingError, PendingTable};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub name: String,
    pub version: String,
    /// Per-request timeout in milliseconds. 0 selects the built-in default;
    /// negative values are rejected at connect time.
    pub timeout_ms: i64,
    /// Opaque pre-shared key attached as `apiKey` to every request.
    pub api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: "polymcp-client".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timeout_ms: 0,
            api_key: None,
        }
    }
}

impl ClientConfig {
    fn effective_timeout(&self) -> PolyResult<Duration> {
        match self.timeout_ms {
            0 => Ok(Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
            ms if ms < 0 => Err(PolyMcpError::invalid_params(format!(
                "request timeout must not be negative, got {ms}"
            ))),
            ms => Ok(Duration::from_millis(ms as u64)),
        }
    }
}

enum Mode {
    /// Asynchronous transport: correlation through the pending table.
    Correlated {
        table: Arc<Mutex<PendingTable>>,
        outgoing: mpsc::UnboundedSender<JsonRpcMessage>,
    },
    /// Synchronous transport: one round-trip per request.
    RequestResponse {
        transport: Box<dyn RequestTransport>,
        next_rid: AtomicU64,
    },
}

struct ClientInner {
    config: ClientConfig,
    timeout: Duration,
    mode: Mode,
    connected: Arc<AtomicBool>,
}

/// MCP client handle. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.config.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Client {
    /// Connect over an asynchronous transport. Spawns the writer and
    /// receive tasks; they stop when the transport fails or the last client
    /// handle disconnects.
    pub fn connect(transport: Box<dyn Transport>, config: ClientConfig) -> PolyResult<Self> {
        let timeout = config.effective_timeout()?;
        let protocol = transport.protocol();
        let (sender, receiver) = transport.split();
        let table = Arc::new(Mutex::new(PendingTable::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(writer_task(
            sender,
            outgoing_rx,
            Arc::clone(&table),
            Arc::clone(&connected),
        ));
        tokio::spawn(receive_task(
            receiver,
            Arc::clone(&table),
            Arc::clone(&connected),
        ));

        info!(client = %config.name, ?protocol, "client connected");
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                timeout,
                mode: Mode::Correlated { table, outgoing },
                connected,
            }),
        })
    }

    /// Connect over a synchronous request-response transport (HTTP).
    pub fn connect_request_response(
        transport: Box<dyn RequestTransport>,
        config: ClientConfig,
    ) -> PolyResult<Self> {
        let timeout = config.effective_timeout()?;
        let connected = Arc::new(AtomicBool::new(true));
        info!(client = %config.name, "client connected (request-response)");
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                timeout,
                mode: Mode::RequestResponse {
                    transport,
                    next_rid: AtomicU64::new(1),
                },
                connected,
            }),
        })
    }

    /// Underlying transport connectivity.
    pub fn is_connected(&self) -> bool {
        match &self.inner.mode {
            Mode::Correlated { .. } => self.inner.connected.load(Ordering::Acquire),
            Mode::RequestResponse { transport, .. } => transport.is_connected(),
        }
    }

    /// Issue a request and wait for its response with the client's
    /// configured timeout.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> PolyResult<Value> {
        self.send_request_with_timeout(method, params, self.inner.timeout)
            .await
    }

    /// Issue a request with a caller-supplied timeout. A zero duration
    /// selects the client's configured timeout.
    pub async fn send_request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> PolyResult<Value> {
        if method.is_empty() {
            return Err(PolyMcpError::invalid_params("method name cannot be empty"));
        }
        let timeout = if timeout.is_zero() {
            self.inner.timeout
        } else {
            timeout
        };
        match &self.inner.mode {
            Mode::Correlated { table, outgoing } => {
                self.send_correlated(table, outgoing, method, params, timeout)
                    .await
            }
            Mode::RequestResponse {
                transport,
                next_rid,
            } => {
                // The transport enforces its own timeout; this bound covers
                // a transport configured with a longer one.
                match tokio::time::timeout(
                    timeout,
                    self.send_round_trip(transport.as_ref(), next_rid, method, params),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_elapsed) => Err(PolyMcpError::request_timed_out()),
                }
            }
        }
    }

    async fn send_correlated(
        &self,
        table: &Arc<Mutex<PendingTable>>,
        outgoing: &mpsc::UnboundedSender<JsonRpcMessage>,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> PolyResult<Value> {
        // Allocate the rid and park the waiter under one lock acquisition.
        let (rid, receiver) = {
            let mut guard = table.lock().expect("pending table poisoned");
            let rid = guard.allocate_rid();
            let (waiter, receiver) = tokio::sync::oneshot::channel();
            guard.insert(rid, waiter).map_err(pending_error)?;
            (rid, receiver)
        };

        let mut request = JsonRpcRequest::new(rid, method, params);
        if let Some(api_key) = &self.inner.config.api_key {
            request.api_key = Some(api_key.clone());
        }

        if outgoing.send(JsonRpcMessage::Request(request)).is_err() {
            table.lock().expect("pending table poisoned").remove(rid);
            return Err(PolyMcpError::transport_error(
                "failed to send request: transport is down",
            ));
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => {
                table.lock().expect("pending table poisoned").remove(rid);
                match outcome {
                    Outcome::Success(value) => Ok(value),
                    Outcome::Error { code, message } => {
                        Err(PolyMcpError::from_wire(code, message))
                    }
                }
            }
            Ok(Err(_closed)) => {
                table.lock().expect("pending table poisoned").remove(rid);
                Err(PolyMcpError::internal_error(
                    "pending request dropped without an outcome",
                ))
            }
            Err(_elapsed) => {
                table.lock().expect("pending table poisoned").timeout(rid);
                debug!(rid, method, "request timed out");
                Err(PolyMcpError::request_timed_out())
            }
        }
    }

    async fn send_round_trip(
        &self,
        transport: &dyn RequestTransport,
        next_rid: &AtomicU64,
        method: &str,
        params: Option<Value>,
    ) -> PolyResult<Value> {
        let rid = next_rid.fetch_add(1, Ordering::Relaxed);
        let mut request = JsonRpcRequest::new(rid, method, params);
        if let Some(api_key) = &self.inner.config.api_key {
            request.api_key = Some(api_key.clone());
        }

        let response = transport.request(&request).await.map_err(PolyMcpError::from)?;

        if response.id != rid {
            return Err(PolyMcpError::internal_error(
                "Response ID doesn't match request ID",
            ));
        }
        if let Some(error) = response.error {
            return Err(PolyMcpError::from_wire(error.code, error.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Fire-and-forget notification (no id, no response).
    pub fn send_notification(&self, method: &str, params: Option<Value>) -> PolyResult<()> {
        match &self.inner.mode {
            Mode::Correlated { outgoing, .. } => {
                let mut request = JsonRpcRequest::notification(method, params);
                if let Some(api_key) = &self.inner.config.api_key {
                    request.api_key = Some(api_key.clone());
                }
                outgoing
                    .send(JsonRpcMessage::Request(request))
                    .map_err(|_| {
                        PolyMcpError::transport_error(
                            "failed to send notification: transport is down",
                        )
                    })
            }
            Mode::RequestResponse { .. } => Err(PolyMcpError::transport_error(
                "notifications are not supported on request-response transports",
            )),
        }
    }

    /// List the tools the server advertises.
    pub async fn list_tools(&self) -> PolyResult<Vec<ToolSpec>> {
        let result = self.send_request(methods::LIST_TOOLS, None).await?;
        let response: ListToolsResponse = serde_json::from_value(result)?;
        Ok(response.tools)
    }

    /// Invoke a tool and return its content items.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> PolyResult<Vec<ContentItem>> {
        let params = json!({"name": name, "arguments": arguments});
        let result = self.send_request(methods::CALL_TOOL, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// List the static resources the server advertises.
    pub async fn list_resources(&self) -> PolyResult<Vec<ResourceDescriptor>> {
        let result = self.send_request(methods::LIST_RESOURCES, None).await?;
        let response: ListResourcesResponse = serde_json::from_value(result)?;
        Ok(response.resources)
    }

    /// List the resource templates the server advertises.
    pub async fn list_resource_templates(&self) -> PolyResult<Vec<ResourceTemplateDescriptor>> {
        let result = self
            .send_request(methods::LIST_RESOURCE_TEMPLATES, None)
            .await?;
        let response: ListResourceTemplatesResponse = serde_json::from_value(result)?;
        Ok(response.resource_templates)
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> PolyResult<Vec<ContentItem>> {
        let params = json!({"uri": uri});
        let result = self.send_request(methods::READ_RESOURCE, Some(params)).await?;
        let response: ReadResourceResponse = serde_json::from_value(result)?;
        Ok(response.contents)
    }

    /// Lightweight liveness probe.
    pub async fn ping(&self) -> PolyResult<()> {
        self.send_request(methods::PING, None).await?;
        Ok(())
    }

    /// Tear down the connection. Pending callers are failed with a
    /// transport error; the writer task closes the transport when its
    /// channel drains.
    pub fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::Release);
        if let Mode::Correlated { table, .. } = &self.inner.mode {
            let failed = table
                .lock()
                .expect("pending table poisoned")
                .fail_all_waiting(error_codes::TRANSPORT_ERROR, "Transport connection error");
            if failed > 0 {
                debug!(failed, "failed pending requests on disconnect");
            }
        }
        info!(client = %self.inner.config.name, "client disconnected");
    }
}

fn pending_error(err: PendingError) -> PolyMcpError {
    PolyMcpError::internal_error(err.to_string())
}

/// Writer task: drains the outgoing channel into the transport. A wire
/// failure fails every parked caller and stops the loop.
async fn writer_task(
    mut sender: Box<dyn TransportSender>,
    mut outgoing: mpsc::UnboundedReceiver<JsonRpcMessage>,
    table: Arc<Mutex<PendingTable>>,
    connected: Arc<AtomicBool>,
) {
    while let Some(message) = outgoing.recv().await {
        if let Err(e) = sender.send(&message).await {
            warn!(error = %e, "transport send failed");
            connected.store(false, Ordering::Release);
            table
                .lock()
                .expect("pending table poisoned")
                .fail_all_waiting(error_codes::TRANSPORT_ERROR, "Transport connection error");
            break;
        }
    }
    sender.close().await.ok();
    debug!("writer task finished");
}

/// Receive task: decodes frames and routes them to parked callers. The
/// error path runs at most once; afterwards no further frames arrive.
async fn receive_task(
    mut receiver: Box<dyn polymcp_transport::TransportReceiver>,
    table: Arc<Mutex<PendingTable>>,
    connected: Arc<AtomicBool>,
) {
    loop {
        match receiver.receive().await {
            Ok(JsonRpcMessage::Response(response)) => {
                if response.id == KEEPALIVE_ID {
                    debug!("keepalive frame discarded");
                    continue;
                }
                let outcome = match response.error {
                    Some(error) => Outcome::Error {
                        code: error.code,
                        message: error.message,
                    },
                    None => Outcome::Success(response.result.unwrap_or(Value::Null)),
                };
                let delivered = table
                    .lock()
                    .expect("pending table poisoned")
                    .complete(response.id, outcome);
                if !delivered {
                    warn!(rid = response.id, "response for unknown request id dropped");
                }
            }
            Ok(JsonRpcMessage::Request(request)) => {
                // Server-initiated traffic; this client exposes no methods.
                debug!(method = %request.method, "ignoring server-initiated request");
            }
            Err(TransportError::ConnectionClosed) => {
                info!("transport closed");
                fail_all(&table, &connected);
                break;
            }
            Err(e) => {
                warn!(error = %e, "transport receive failed");
                fail_all(&table, &connected);
                break;
            }
        }
    }
}

fn fail_all(table: &Arc<Mutex<PendingTable>>, connected: &Arc<AtomicBool>) {
    connected.store(false, Ordering::Release);
    let failed = table
        .lock()
        .expect("pending table poisoned")
        .fail_all_waiting(error_codes::TRANSPORT_ERROR, "Transport connection error");
    if failed > 0 {
        info!(failed, "failed pending requests after transport error");
    }
}
