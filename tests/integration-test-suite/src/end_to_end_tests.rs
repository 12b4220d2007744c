//! End-to-end scenarios over real TCP connections.

use std::time::{Duration, Instant};

use polymcp_core::error::error_codes;
use polymcp_core::types::{ContentItem, ResourceTemplateDescriptor};
use polymcp_core::TemplateValue;
use polymcp_gateway::{ConnectionState, Gateway};
use polymcp_server::{resource_fn, ResourceCache, ResourceCacheConfig, Server, ServerInfo, Ttl};
use polymcp_core::config::{ClientSettings, ServerEntry, ToolAccessControl};
use serde_json::json;

use crate::{connect_client, init_tracing, serve, spawn_fixture_server};

#[tokio::test]
async fn test_happy_path_tool_call() {
    init_tracing();
    let (addr, _server) = spawn_fixture_server("echo-server", &["echo"]).await;
    let client = connect_client(&addr, 0).await;

    let content = client
        .call_tool("echo", json!({"text": "hello"}))
        .await
        .expect("call");
    assert_eq!(content, vec![ContentItem::text("hello")]);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_method_not_found_over_the_wire() {
    init_tracing();
    let (addr, _server) = spawn_fixture_server("bare-server", &[]).await;
    let client = connect_client(&addr, 0).await;

    let err = client
        .send_request("no_such", Some(json!({})))
        .await
        .expect_err("unknown method");
    assert_eq!(err.wire_code(), error_codes::METHOD_NOT_FOUND);
    assert!(err.to_string().contains("Method not found"));
}

#[tokio::test]
async fn test_timeout_beats_slow_tool() {
    init_tracing();
    let (addr, _server) = spawn_fixture_server("slow-server", &["echo", "sleep"]).await;
    let client = connect_client(&addr, 50).await;

    let started = Instant::now();
    let err = client
        .call_tool("sleep", json!({}))
        .await
        .expect_err("timeout");
    let elapsed = started.elapsed();

    assert_eq!(err.wire_code(), error_codes::TRANSPORT_ERROR);
    assert!(err.to_string().contains("timed out"), "got: {err}");
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(500));

    // The server's eventual response must be dropped silently: wait past
    // its 500 ms sleep, then confirm the connection still works.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(client.is_connected());
    let content = client
        .call_tool("echo", json!({"text": "still alive"}))
        .await
        .expect("follow-up");
    assert_eq!(content, vec![ContentItem::text("still alive")]);
}

#[tokio::test]
async fn test_uri_template_extraction_over_the_wire() {
    init_tracing();
    let server = Server::new(ServerInfo::new("posts", "1.0.0"));
    server
        .register_resource_template(
            ResourceTemplateDescriptor::new("example://{user}/posts/{post_id:int}", "posts"),
            resource_fn(|_uri, params| async move {
                let user = match params.get("user") {
                    Some(TemplateValue::Str(user)) => user.clone(),
                    other => panic!("bad user param: {other:?}"),
                };
                let post_id = match params.get("post_id") {
                    Some(TemplateValue::Int(id)) => *id,
                    other => panic!("bad post_id param: {other:?}"),
                };
                Ok(vec![ContentItem::json(json!({
                    "user": user,
                    "post_id": post_id,
                }))])
            }),
        )
        .await
        .expect("register");
    let (addr, _handle) = serve(server).await;
    let client = connect_client(&addr, 0).await;

    let content = client
        .read_resource("example://john/posts/42")
        .await
        .expect("read");
    match &content[0] {
        ContentItem::Json { json: value, .. } => {
            assert_eq!(value["user"], "john");
            assert_eq!(value["post_id"], 42);
        }
        other => panic!("expected json item, got {other:?}"),
    }

    // Type mismatch and literal mismatch both fail to route.
    for uri in ["example://john/posts/abc", "example://john/comments/42"] {
        let err = client.read_resource(uri).await.expect_err("no match");
        assert_eq!(err.wire_code(), error_codes::RESOURCE_NOT_FOUND, "{uri}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_resource_cache_ttl_scenario() {
    // Capacity 2, default TTL 1 s, driven on the paused clock.
    let cache = ResourceCache::new(ResourceCacheConfig {
        capacity: 2,
        default_ttl: Duration::from_secs(1),
    });
    cache.put("a", &[ContentItem::text("X")], Ttl::Default);
    cache.put("b", &[ContentItem::text("Y")], Ttl::Default);
    assert_eq!(cache.get("a"), Some(vec![ContentItem::text("X")]));

    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(cache.get("a"), None);
    assert_eq!(cache.prune_expired(), 1);
    assert_eq!(cache.prune_expired(), 0);
}

#[tokio::test]
async fn test_gateway_routing_scenario() {
    init_tracing();
    let (addr0, _h0) = spawn_fixture_server("s0", &["echo", "ping"]).await;
    let (addr1, _h1) = spawn_fixture_server("s1", &["sum"]).await;

    let gateway = Gateway::new(ClientSettings::default(), ToolAccessControl::default());
    gateway.add("s0", ServerEntry::url(format!("tcp://{addr0}")));
    gateway.add("s1", ServerEntry::url(format!("tcp://{addr1}")));
    gateway.connect_all().await.expect("connect");

    assert_eq!(gateway.select_for_tool("sum"), Some(1));
    assert_eq!(gateway.select_for_tool("echo"), Some(0));
    assert_eq!(gateway.select_for_tool("unknown"), None);

    let content = gateway
        .call_tool("sum", json!({"a": 20, "b": 22}))
        .await
        .expect("sum");
    assert_eq!(content, vec![ContentItem::text("42")]);

    gateway.disconnect_backend(0);
    assert_eq!(gateway.select_for_tool("echo"), None);
    assert_eq!(
        gateway.connection_states()[0].1,
        ConnectionState::Disconnected
    );
    // The other backend keeps serving.
    assert_eq!(gateway.select_for_tool("sum"), Some(1));
}

#[tokio::test]
async fn test_websocket_transport_end_to_end() {
    init_tracing();
    let server = Server::new(ServerInfo::new("ws-server", "1.0.0"));
    server
        .register_tool(
            polymcp_core::types::ToolSpec::new("echo").with_param(
                polymcp_core::types::ParamSpec::new("text", polymcp_core::types::ParamKind::String)
                    .required(),
            ),
            polymcp_server::tool_fn(|arguments| async move {
                let text = arguments["text"].as_str().unwrap_or_default().to_string();
                Ok(vec![ContentItem::text(text)])
            }),
        )
        .await
        .expect("register");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        server.serve_websocket_listener(listener).await.ok();
    });

    let transport = polymcp_transport::WebSocketTransport::connect(&format!("ws://{addr}"))
        .await
        .expect("ws connect");
    let client = polymcp_client::Client::connect(
        Box::new(transport),
        polymcp_client::ClientConfig::default(),
    )
    .expect("client");

    let content = client
        .call_tool("echo", json!({"text": "over websocket"}))
        .await
        .expect("call");
    assert_eq!(content, vec![ContentItem::text("over websocket")]);

    // Unknown methods travel the same frames.
    let err = client
        .send_request("no_such", None)
        .await
        .expect_err("unknown");
    assert_eq!(err.wire_code(), error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_per_request_timeout_override() {
    init_tracing();
    // Client default is generous; the per-call override is what expires.
    let (addr, _server) = spawn_fixture_server("slow", &["sleep"]).await;
    let client = connect_client(&addr, 10_000).await;

    let started = Instant::now();
    let err = client
        .send_request_with_timeout(
            "call_tool",
            Some(json!({"name": "sleep", "arguments": {}})),
            Duration::from_millis(50),
        )
        .await
        .expect_err("timeout");
    assert_eq!(err.wire_code(), error_codes::TRANSPORT_ERROR);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_concurrent_clients_share_one_server() {
    init_tracing();
    let (addr, _server) = spawn_fixture_server("shared", &["echo"]).await;

    let mut joins = Vec::new();
    for n in 0..8 {
        let addr = addr.clone();
        joins.push(tokio::spawn(async move {
            let client = connect_client(&addr, 0).await;
            let text = format!("message-{n}");
            let content = client
                .call_tool("echo", json!({"text": text}))
                .await
                .expect("call");
            assert_eq!(content, vec![ContentItem::text(format!("message-{n}"))]);
        }));
    }
    for join in joins {
        join.await.expect("join");
    }
}

#[tokio::test]
async fn test_keepalive_frames_are_transparent() {
    init_tracing();
    let server = Server::new(ServerInfo::new("chatty", "1.0.0"))
        .with_keepalive(Duration::from_millis(10));
    server
        .register_tool(
            polymcp_core::types::ToolSpec::new("noop"),
            polymcp_server::tool_fn(|_| async { Ok(vec![ContentItem::text("ok")]) }),
        )
        .await
        .expect("register");
    let (addr, _handle) = serve(server).await;
    let client = connect_client(&addr, 0).await;

    // Let a burst of id-0 keepalives arrive, then verify normal traffic is
    // untouched by them.
    tokio::time::sleep(Duration::from_millis(100)).await;
    for _ in 0..3 {
        let content = client.call_tool("noop", json!({})).await.expect("call");
        assert_eq!(content, vec![ContentItem::text("ok")]);
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_api_key_end_to_end() {
    init_tracing();
    let server = Server::new(ServerInfo::new("locked", "1.0.0")).with_api_key("hunter2");
    let (addr, _handle) = serve(server).await;

    // Without the key every request is rejected.
    let no_key = connect_client(&addr, 0).await;
    let err = no_key.ping().await.expect_err("rejected");
    assert_eq!(err.wire_code(), error_codes::INVALID_REQUEST);

    // With the key the same request passes the gate.
    let transport = polymcp_transport::TcpTransport::connect(&addr)
        .await
        .expect("connect");
    let with_key = polymcp_client::Client::connect(
        Box::new(transport),
        polymcp_client::ClientConfig {
            api_key: Some("hunter2".to_string()),
            ..Default::default()
        },
    )
    .expect("client");
    with_key.ping().await.expect("accepted");
}
