//! Auto-reconnect behavior, including exhaustion.

use std::sync::Arc;
use std::time::Duration;

use betterspotlight_ipc::server::RequestHandler;
use betterspotlight_ipc::{message, ClientEvent, SocketClient, SocketServer};
use serde_json::Value;

fn noop_handler() -> RequestHandler {
    Arc::new(|incoming: Value| {
        Box::pin(async move {
            let id = message::message_id(&incoming).unwrap_or(0);
            message::make_response(id, serde_json::json!({}))
        })
    })
}

#[tokio::test]
async fn reconnect_succeeds_when_server_returns() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");
    let server = SocketServer::listen(&sock, noop_handler()).await.unwrap();

    let client = SocketClient::connect(&sock, 2_000).await.unwrap();
    client.enable_auto_reconnect(10, 50);
    let mut events = client.subscribe();

    server.close();

    // Server comes back while the client is retrying.
    let revived = SocketServer::listen(&sock, noop_handler()).await.unwrap();

    let mut reconnected = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(ClientEvent::Reconnected)) => {
                reconnected = true;
                break;
            }
            Ok(Ok(_)) => {}
            _ => break,
        }
    }
    assert!(reconnected, "client should have reconnected");
    assert!(client.is_connected());
    revived.close();
}

#[tokio::test]
async fn reconnect_exhaustion_emits_failure_error() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");
    let server = SocketServer::listen(&sock, noop_handler()).await.unwrap();

    let client = SocketClient::connect(&sock, 2_000).await.unwrap();
    client.enable_auto_reconnect(2, 50);
    let mut events = client.subscribe();

    // Kill the server and keep the socket dead.
    server.close();

    let mut failure_message = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(ClientEvent::Error(msg))) => {
                failure_message = Some(msg);
                break;
            }
            Ok(Ok(_)) => {}
            _ => break,
        }
    }
    let msg = failure_message.expect("expected an error event within 10s");
    assert!(msg.contains("Auto-reconnect failed"), "got: {msg}");
    assert!(!client.is_connected());
}
