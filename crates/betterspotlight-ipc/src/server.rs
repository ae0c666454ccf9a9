//! Socket server: accepts local clients, decodes frames, dispatches
//! requests to a handler and writes responses back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use betterspotlight_domain::constants::ipc::{
    MAX_READ_BUFFER_SIZE, STALE_SOCKET_PROBE_TIMEOUT_MS,
};
use betterspotlight_domain::{Error, Result};
use bytes::BytesMut;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{codec, message};

/// Async request handler. Receives the full incoming message (request or
/// notification) and returns the response object; for notifications the
/// return value is discarded.
pub type RequestHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

struct ServerInner {
    path: PathBuf,
    handler: RequestHandler,
    clients: Mutex<HashMap<u64, mpsc::UnboundedSender<Vec<u8>>>>,
    next_client_id: AtomicU64,
    closing: AtomicBool,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// A listening IPC server bound to a filesystem socket path.
pub struct SocketServer {
    inner: Arc<ServerInner>,
}

/// True when a live peer answers on `path` within the probe timeout.
async fn socket_has_active_peer(path: &Path) -> bool {
    matches!(
        tokio::time::timeout(
            Duration::from_millis(STALE_SOCKET_PROBE_TIMEOUT_MS),
            UnixStream::connect(path),
        )
        .await,
        Ok(Ok(_))
    )
}

impl SocketServer {
    /// Bind to `socket_path` and start serving.
    ///
    /// On `AddrInUse`, the path is probed: a live peer is a hard error; a
    /// stale socket file is removed and the listen retried once.
    ///
    /// # Errors
    ///
    /// Returns an error when the bind fails or another live service owns
    /// the socket.
    pub async fn listen(socket_path: impl AsRef<Path>, handler: RequestHandler) -> Result<Self> {
        let path = socket_path.as_ref().to_path_buf();

        let listener = match UnixListener::bind(&path) {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                if socket_has_active_peer(&path).await {
                    return Err(Error::already_running(format!(
                        "socket already in use by an active service: {}",
                        path.display()
                    )));
                }
                warn!(path = %path.display(), "detected stale socket, attempting safe cleanup");
                std::fs::remove_file(&path)
                    .map_err(|e| Error::io("failed to remove stale socket", e))?;
                UnixListener::bind(&path)
                    .map_err(|e| Error::io("failed to listen after stale cleanup", e))?
            }
            Err(e) => {
                return Err(Error::io(
                    format!("failed to listen on {}", path.display()),
                    e,
                ));
            }
        };

        info!(path = %path.display(), "listening");

        let inner = Arc::new(ServerInner {
            path,
            handler,
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            closing: AtomicBool::new(false),
            accept_task: Mutex::new(None),
        });

        let accept_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        if accept_inner.closing.load(Ordering::SeqCst) {
                            break;
                        }
                        spawn_client(&accept_inner, stream);
                    }
                    Err(e) => {
                        if !accept_inner.closing.load(Ordering::SeqCst) {
                            warn!(error = %e, "accept failed");
                        }
                        break;
                    }
                }
            }
        });
        if let Ok(mut slot) = inner.accept_task.lock() {
            *slot = Some(task);
        }

        Ok(Self { inner })
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Serialize `notification` once and write it to every connected client.
    pub fn broadcast(&self, notification: &Value) {
        let Ok(encoded) = codec::encode(notification) else {
            warn!("failed to encode broadcast notification");
            return;
        };
        let clients = match self.inner.clients.lock() {
            Ok(c) => c.values().cloned().collect::<Vec<_>>(),
            Err(_) => return,
        };
        for tx in &clients {
            let _ = tx.send(encoded.clone());
        }
        debug!(count = clients.len(), "broadcast notification");
    }

    /// Two-phase close: detach client bookkeeping first, then tear down the
    /// listener and socket file. Idempotent.
    pub fn close(&self) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        // Phase one: detach bookkeeping. Dropping the senders ends each
        // client writer task; reader tasks end on peer close.
        if let Ok(mut clients) = self.inner.clients.lock() {
            clients.clear();
        }
        // Phase two: stop accepting and remove the socket.
        if let Ok(mut task) = self.inner.accept_task.lock() {
            if let Some(t) = task.take() {
                t.abort();
            }
        }
        let _ = std::fs::remove_file(&self.inner.path);
        info!(path = %self.inner.path.display(), "server closed");
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_client(inner: &Arc<ServerInner>, stream: UnixStream) {
    let client_id = inner.next_client_id.fetch_add(1, Ordering::SeqCst);
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    if let Ok(mut clients) = inner.clients.lock() {
        clients.insert(client_id, tx);
    }
    debug!(client_id, "client connected");

    // Writer: drains queued frames until the sender side is dropped.
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    // Reader: accumulates bytes, decodes complete frames, dispatches.
    let reader_inner = Arc::clone(inner);
    tokio::spawn(async move {
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        loop {
            match read_half.read_buf(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            if buffer.len() > MAX_READ_BUFFER_SIZE {
                warn!(
                    client_id,
                    "client read buffer exceeded {MAX_READ_BUFFER_SIZE} bytes, disconnecting"
                );
                break;
            }
            if !drain_frames(&reader_inner, client_id, &mut buffer).await {
                break;
            }
        }
        if let Ok(mut clients) = reader_inner.clients.lock() {
            if clients.remove(&client_id).is_some() {
                debug!(client_id, "client disconnected");
            }
        }
    });
}

/// Decode and dispatch every complete frame in `buffer`. Returns false when
/// the client must be disconnected (malformed frame).
async fn drain_frames(inner: &Arc<ServerInner>, client_id: u64, buffer: &mut BytesMut) -> bool {
    loop {
        let decoded = match codec::decode(buffer) {
            Ok(Some(d)) => d,
            Ok(None) => return true,
            Err(e) => {
                warn!(client_id, error = %e, "malformed frame, disconnecting client");
                return false;
            }
        };
        let _ = buffer.split_to(decoded.bytes_consumed);
        let incoming = decoded.message;

        match message::message_type(&incoming) {
            Some("request") => {
                debug!(
                    client_id,
                    method = message::message_method(&incoming).unwrap_or(""),
                    "received request"
                );
                let response = (inner.handler)(incoming).await;
                match codec::encode(&response) {
                    Ok(frame) => {
                        let tx = inner
                            .clients
                            .lock()
                            .ok()
                            .and_then(|c| c.get(&client_id).cloned());
                        if let Some(tx) = tx {
                            let _ = tx.send(frame);
                        }
                    }
                    Err(e) => warn!(client_id, error = %e, "failed to encode response"),
                }
            }
            Some("notification") => {
                // Fire-and-forget: dispatch and discard the result.
                let _ = (inner.handler)(incoming).await;
            }
            other => {
                warn!(client_id, message_type = ?other, "received unknown message type");
            }
        }
    }
}
