//! Shared fixtures for the end-to-end test suite.

use std::sync::Once;
use std::time::Duration;

use polymcp_client::{Client, ClientConfig};
use polymcp_core::types::{ContentItem, ParamKind, ParamSpec, ToolSpec};
use polymcp_server::{tool_fn, Server, ServerInfo};
use polymcp_transport::TcpTransport;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[cfg(test)]
mod end_to_end_tests;

static INIT_TRACING: Once = Once::new();

/// Install a test subscriber once, honoring `RUST_LOG`.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A server fixture with `echo` (string param, echoed back), `ping` (a
/// registered tool, distinct from the dispatcher's built-in method) and
/// `sleep` (responds after 500 ms).
pub async fn spawn_fixture_server(name: &str, tools: &[&str]) -> (String, JoinHandle<()>) {
    let server = Server::new(ServerInfo::new(name, "1.0.0"));
    for tool in tools {
        match *tool {
            "echo" => {
                server
                    .register_tool(
                        ToolSpec::new("echo")
                            .with_description("Echo text back")
                            .with_param(ParamSpec::new("text", ParamKind::String).required()),
                        tool_fn(|arguments| async move {
                            let text =
                                arguments["text"].as_str().unwrap_or_default().to_string();
                            Ok(vec![ContentItem::text(text)])
                        }),
                    )
                    .await
                    .expect("register echo");
            }
            "sleep" => {
                server
                    .register_tool(
                        ToolSpec::new("sleep").with_description("Respond after 500 ms"),
                        tool_fn(|_| async {
                            tokio::time::sleep(Duration::from_millis(500)).await;
                            Ok(vec![ContentItem::text("finally")])
                        }),
                    )
                    .await
                    .expect("register sleep");
            }
            "ping" => {
                server
                    .register_tool(
                        ToolSpec::new("ping"),
                        tool_fn(|_| async { Ok(vec![ContentItem::text("pong")]) }),
                    )
                    .await
                    .expect("register ping");
            }
            "sum" => {
                server
                    .register_tool(
                        ToolSpec::new("sum")
                            .with_param(ParamSpec::new("a", ParamKind::Int).required())
                            .with_param(ParamSpec::new("b", ParamKind::Int).required()),
                        tool_fn(|arguments| async move {
                            let a = arguments["a"].as_i64().unwrap_or(0);
                            let b = arguments["b"].as_i64().unwrap_or(0);
                            Ok(vec![ContentItem::text((a + b).to_string())])
                        }),
                    )
                    .await
                    .expect("register sum");
            }
            other => panic!("unknown fixture tool {other}"),
        }
    }

    serve(server).await
}

/// Bind an ephemeral port and serve `server` on it.
pub async fn serve(server: Server) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        server.serve_listener(listener).await.ok();
    });
    (addr.to_string(), handle)
}

/// Connect a client to a fixture server.
pub async fn connect_client(addr: &str, timeout_ms: i64) -> Client {
    let transport = TcpTransport::connect(addr).await.expect("connect");
    Client::connect(
        Box::new(transport),
        ClientConfig {
            timeout_ms,
            ..Default::default()
        },
    )
    .expect("client")
}
