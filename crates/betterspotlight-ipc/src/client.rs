//! Socket client: blocking request/response over a shared connection, a
//! notification handler for server pushes, and bounded auto-reconnect.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use betterspotlight_domain::{Error, Result};
use bytes::BytesMut;
use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{codec, message};

/// Lifecycle events observable by the owner of the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Disconnected,
    Reconnected,
    Error(String),
}

type NotificationHandler = Arc<dyn Fn(&str, Value) + Send + Sync>;

#[derive(Clone)]
struct ReconnectConfig {
    max_attempts: u32,
    base_delay_ms: u64,
}

struct ClientInner {
    socket_path: PathBuf,
    writer: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    connected: AtomicBool,
    manual_close: AtomicBool,
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Value>>,
    notification_handler: RwLock<Option<NotificationHandler>>,
    events: broadcast::Sender<ClientEvent>,
    reconnect: Mutex<Option<ReconnectConfig>>,
    reconnecting: AtomicBool,
}

/// IPC client for one service socket.
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<ClientInner>,
}

impl SocketClient {
    /// Connect to `socket_path` within `timeout_ms`.
    ///
    /// # Errors
    ///
    /// Returns a timeout or I/O error when the connection cannot be
    /// established.
    pub async fn connect(socket_path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = socket_path.as_ref().to_path_buf();
        let (events, _) = broadcast::channel(16);
        let inner = Arc::new(ClientInner {
            socket_path: path,
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            manual_close: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            notification_handler: RwLock::new(None),
            events,
            reconnect: Mutex::new(None),
            reconnecting: AtomicBool::new(false),
        });
        let client = Self { inner };
        client.connect_once(timeout_ms).await?;
        Ok(client)
    }

    async fn connect_once(&self, timeout_ms: u64) -> Result<()> {
        let path = self.inner.socket_path.clone();
        let stream = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            UnixStream::connect(&path),
        )
        .await
        .map_err(|_| Error::timeout(format!("connect to {}", path.display())))?
        .map_err(|e| Error::io(format!("connect to {}", path.display()), e))?;

        start_io(&self.inner, stream);
        self.inner.connected.store(true, Ordering::SeqCst);
        debug!(path = %path.display(), "connected");
        Ok(())
    }

    /// True while the connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Install the handler for fire-and-forget server pushes.
    pub fn set_notification_handler(&self, handler: impl Fn(&str, Value) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.inner.notification_handler.write() {
            *slot = Some(Arc::new(handler));
        }
    }

    /// Send a request and wait for its response object.
    ///
    /// # Errors
    ///
    /// `Timeout` when no response arrives in time, `ServiceUnavailable`
    /// when the connection is down or drops mid-flight.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.insert(id, tx);

        let frame = codec::encode(&message::make_request(id, method, params))?;
        let sender = self
            .inner
            .writer
            .lock()
            .ok()
            .and_then(|w| w.as_ref().cloned());
        let Some(sender) = sender else {
            self.inner.pending.remove(&id);
            return Err(Error::service_unavailable("not connected"));
        };
        if sender.send(frame).is_err() {
            self.inner.pending.remove(&id);
            return Err(Error::service_unavailable("connection closed"));
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::service_unavailable(
                "disconnected before response arrived",
            )),
            Err(_) => {
                self.inner.pending.remove(&id);
                Err(Error::timeout(format!("request '{method}'")))
            }
        }
    }

    /// Async variant delivering the result (or `None` on failure) to a
    /// callback.
    pub fn send_request_async(
        &self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
        callback: impl FnOnce(Option<Value>) + Send + 'static,
    ) {
        let client = self.clone();
        let method = method.to_owned();
        tokio::spawn(async move {
            let result = client.send_request(&method, params, timeout_ms).await.ok();
            callback(result);
        });
    }

    /// Send a fire-and-forget notification.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` when the connection is down.
    pub fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        let frame = codec::encode(&message::make_notification(method, params))?;
        let sender = self
            .inner
            .writer
            .lock()
            .ok()
            .and_then(|w| w.as_ref().cloned());
        match sender {
            Some(s) if s.send(frame).is_ok() => Ok(()),
            _ => Err(Error::service_unavailable("not connected")),
        }
    }

    /// Enable bounded auto-reconnect. On disconnect the client retries up
    /// to `max_attempts` times with linearly growing delay, emits
    /// `Reconnected` on success and an `Error` event after exhaustion.
    pub fn enable_auto_reconnect(&self, max_attempts: u32, base_delay_ms: u64) {
        if let Ok(mut cfg) = self.inner.reconnect.lock() {
            *cfg = Some(ReconnectConfig {
                max_attempts,
                base_delay_ms,
            });
        }
    }

    /// Disable auto-reconnect.
    pub fn disable_auto_reconnect(&self) {
        if let Ok(mut cfg) = self.inner.reconnect.lock() {
            *cfg = None;
        }
    }

    /// Disconnect and suppress reconnect attempts.
    pub fn disconnect(&self) {
        self.inner.manual_close.store(true, Ordering::SeqCst);
        self.disable_auto_reconnect();
        if let Ok(mut w) = self.inner.writer.lock() {
            *w = None;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
    }
}

/// Spawn reader and writer tasks for an established stream.
fn start_io(inner: &Arc<ClientInner>, stream: UnixStream) {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    if let Ok(mut w) = inner.writer.lock() {
        *w = Some(tx);
    }

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let reader_inner = Arc::clone(inner);
    tokio::spawn(async move {
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        loop {
            match read_half.read_buf(&mut buffer).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            loop {
                match codec::decode(&buffer) {
                    Ok(Some(decoded)) => {
                        let _ = buffer.split_to(decoded.bytes_consumed);
                        dispatch_incoming(&reader_inner, decoded.message);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "malformed frame from server");
                        buffer.clear();
                        break;
                    }
                }
            }
        }
        on_disconnect(&reader_inner);
    });
}

/// Route a decoded frame to the pending-request registry or the
/// notification handler.
fn dispatch_incoming(inner: &Arc<ClientInner>, incoming: Value) {
    match message::message_type(&incoming) {
        Some("response" | "error") => {
            if let Some(id) = message::message_id(&incoming) {
                if let Some((_, tx)) = inner.pending.remove(&id) {
                    let _ = tx.send(incoming);
                }
            }
        }
        Some("notification") => {
            let handler = inner
                .notification_handler
                .read()
                .ok()
                .and_then(|h| h.clone());
            if let Some(handler) = handler {
                let method = message::message_method(&incoming).unwrap_or("").to_owned();
                let params = incoming.get("params").cloned().unwrap_or(Value::Null);
                handler(&method, params);
            }
        }
        other => debug!(message_type = ?other, "ignoring unexpected message"),
    }
}

/// Handle a dropped connection: fail in-flight requests, emit events and
/// kick off the reconnect loop when enabled.
fn on_disconnect(inner: &Arc<ClientInner>) {
    inner.connected.store(false, Ordering::SeqCst);
    if let Ok(mut w) = inner.writer.lock() {
        *w = None;
    }
    // Waiters observe the dropped sender and fail with ServiceUnavailable.
    inner.pending.clear();

    if inner.manual_close.load(Ordering::SeqCst) {
        return;
    }
    let _ = inner.events.send(ClientEvent::Disconnected);

    let cfg = inner.reconnect.lock().ok().and_then(|c| c.clone());
    let Some(cfg) = cfg else { return };
    if inner.reconnecting.swap(true, Ordering::SeqCst) {
        return;
    }

    let rc_inner = Arc::clone(inner);
    tokio::spawn(async move {
        for attempt in 1..=cfg.max_attempts {
            let delay = (cfg.base_delay_ms * u64::from(attempt)).min(30_000);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if rc_inner.manual_close.load(Ordering::SeqCst) {
                rc_inner.reconnecting.store(false, Ordering::SeqCst);
                return;
            }
            match UnixStream::connect(&rc_inner.socket_path).await {
                Ok(stream) => {
                    start_io(&rc_inner, stream);
                    rc_inner.connected.store(true, Ordering::SeqCst);
                    rc_inner.reconnecting.store(false, Ordering::SeqCst);
                    info!(attempt, "reconnected");
                    let _ = rc_inner.events.send(ClientEvent::Reconnected);
                    return;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
        rc_inner.reconnecting.store(false, Ordering::SeqCst);
        let _ = rc_inner.events.send(ClientEvent::Error(format!(
            "Auto-reconnect failed after {} attempts",
            cfg.max_attempts
        )));
    });
}
