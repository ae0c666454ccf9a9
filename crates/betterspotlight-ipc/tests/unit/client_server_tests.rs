//! Request/response and notification flow over a real unix socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use betterspotlight_ipc::server::RequestHandler;
use betterspotlight_ipc::{message, SocketClient, SocketServer};
use serde_json::{json, Value};

fn echo_handler(notifications: Arc<AtomicUsize>) -> RequestHandler {
    Arc::new(move |incoming: Value| {
        let notifications = Arc::clone(&notifications);
        Box::pin(async move {
            let id = message::message_id(&incoming).unwrap_or(0);
            match message::message_type(&incoming) {
                Some("notification") => {
                    notifications.fetch_add(1, Ordering::SeqCst);
                    Value::Null
                }
                _ => {
                    let method = message::message_method(&incoming).unwrap_or("").to_owned();
                    message::make_response(id, json!({"echoedMethod": method}))
                }
            }
        })
    })
}

#[tokio::test]
async fn request_gets_matching_response() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");
    let server = SocketServer::listen(&sock, echo_handler(Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();

    let client = SocketClient::connect(&sock, 2_000).await.unwrap();
    let response = client
        .send_request("getHealth", Some(json!({"x": 1})), 2_000)
        .await
        .unwrap();

    assert_eq!(response["type"], "response");
    assert_eq!(response["result"]["echoedMethod"], "getHealth");
    server.close();
}

#[tokio::test]
async fn notifications_reach_handler_and_get_no_reply() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");
    let seen = Arc::new(AtomicUsize::new(0));
    let server = SocketServer::listen(&sock, echo_handler(Arc::clone(&seen)))
        .await
        .unwrap();

    let client = SocketClient::connect(&sock, 2_000).await.unwrap();
    client.send_notification("progress", Some(json!({"n": 1}))).unwrap();
    client.send_notification("progress", None).unwrap();

    // A request afterwards proves the notifications were drained in order.
    let _ = client.send_request("ping2", None, 2_000).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
    server.close();
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");
    let server = SocketServer::listen(&sock, echo_handler(Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();

    let make_client = || async {
        let (tx, rx) = tokio::sync::oneshot::channel::<Value>();
        let client = SocketClient::connect(&sock, 2_000).await.unwrap();
        let tx = std::sync::Mutex::new(Some(tx));
        client.set_notification_handler(move |method, params| {
            if method == "indexProgress" {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(params);
                }
            }
        });
        (client, rx)
    };

    let (_c1, rx1) = make_client().await;
    let (_c2, rx2) = make_client().await;
    // Give both reader tasks a beat to register before broadcasting.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    server.broadcast(&message::make_notification(
        "indexProgress",
        Some(json!({"pending": 3})),
    ));

    let p1 = tokio::time::timeout(std::time::Duration::from_secs(2), rx1)
        .await
        .unwrap()
        .unwrap();
    let p2 = tokio::time::timeout(std::time::Duration::from_secs(2), rx2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(p1["pending"], 3);
    assert_eq!(p2["pending"], 3);
    server.close();
}

#[tokio::test]
async fn stale_socket_is_cleaned_up_and_live_socket_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");

    // Stale file with no listener behind it.
    std::fs::write(&sock, b"").unwrap();
    let server = SocketServer::listen(&sock, echo_handler(Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();

    // A second listen on the live socket must fail fast.
    let second = SocketServer::listen(&sock, echo_handler(Arc::new(AtomicUsize::new(0)))).await;
    assert!(second.is_err());
    server.close();
}

#[tokio::test]
async fn oversized_length_header_disconnects_the_client() {
    use betterspotlight_domain::constants::ipc::MAX_MESSAGE_SIZE;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");
    let server = SocketServer::listen(&sock, echo_handler(Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();

    let mut raw = tokio::net::UnixStream::connect(&sock).await.unwrap();
    let header = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes();
    raw.write_all(&header).await.unwrap();

    // The server refuses the frame without buffering a payload and drops
    // the connection; the peer observes EOF.
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(std::time::Duration::from_secs(2), raw.read(&mut buf))
        .await
        .expect("server should disconnect promptly")
        .unwrap();
    assert_eq!(n, 0);
    server.close();
}

#[tokio::test]
async fn close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let sock = dir.path().join("svc.sock");
    let server = SocketServer::listen(&sock, echo_handler(Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();
    server.close();
    server.close();
    assert!(!sock.exists());
}
