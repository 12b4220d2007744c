//! Loopback tests for the stream transports.

use polymcp_core::protocol::{JsonRpcMessage, JsonRpcRequest, JsonRpcResponse};
use polymcp_transport::{TcpTransport, Transport, TransportError};
use serde_json::json;
use tokio::net::TcpListener;

async fn tcp_pair() -> (TcpTransport, TcpTransport) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        TcpTransport::from_stream(stream)
    });
    let client = TcpTransport::connect(&addr.to_string())
        .await
        .expect("connect");
    let server = accept.await.expect("join");
    (client, server)
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let (client, server) = tcp_pair().await;
    let (mut client_tx, mut client_rx) = Box::new(client).split();
    let (mut server_tx, mut server_rx) = Box::new(server).split();

    let request = JsonRpcMessage::Request(JsonRpcRequest::new(
        1,
        "call_tool",
        Some(json!({"name": "echo", "arguments": {"text": "hello"}})),
    ));
    client_tx.send(&request).await.expect("send");

    let received = server_rx.receive().await.expect("receive");
    assert_eq!(received, request);

    let response =
        JsonRpcMessage::Response(JsonRpcResponse::success(1, json!([{"ok": true}])));
    server_tx.send(&response).await.expect("send");
    let received = client_rx.receive().await.expect("receive");
    assert_eq!(received, response);
}

#[tokio::test]
async fn test_tcp_out_of_order_ids_pass_through() {
    let (client, server) = tcp_pair().await;
    let (mut client_tx, _client_rx) = Box::new(client).split();
    let (_server_tx, mut server_rx) = Box::new(server).split();

    for id in [3u64, 1, 2] {
        client_tx
            .send(&JsonRpcMessage::Request(JsonRpcRequest::new(id, "ping", None)))
            .await
            .expect("send");
    }
    let ids: Vec<u64> = [
        server_rx.receive().await.expect("receive"),
        server_rx.receive().await.expect("receive"),
        server_rx.receive().await.expect("receive"),
    ]
    .iter()
    .map(|m| m.id().expect("id"))
    .collect();
    // The transport preserves wire order; correlation happens above it.
    assert_eq!(ids, vec![3, 1, 2]);
}

#[tokio::test]
async fn test_tcp_peer_close_is_terminal() {
    let (client, server) = tcp_pair().await;
    let (mut client_tx, _client_rx) = Box::new(client).split();
    let (_server_tx, mut server_rx) = Box::new(server).split();

    client_tx.close().await.expect("close");
    drop(client_tx);

    let result = server_rx.receive().await;
    assert!(matches!(result, Err(TransportError::ConnectionClosed)));
}

#[tokio::test]
async fn test_large_frame_round_trip() {
    let (client, server) = tcp_pair().await;
    let (mut client_tx, _client_rx) = Box::new(client).split();
    let (_server_tx, mut server_rx) = Box::new(server).split();

    // A payload spanning many TCP segments still arrives as one frame.
    let big = "x".repeat(1 << 20);
    let request =
        JsonRpcMessage::Request(JsonRpcRequest::new(5, "call_tool", Some(json!({"blob": big}))));
    client_tx.send(&request).await.expect("send");
    let received = server_rx.receive().await.expect("receive");
    assert_eq!(received, request);
}
