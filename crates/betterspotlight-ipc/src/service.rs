//! Service base: socket/pid path resolution from the runtime environment,
//! built-in `ping`/`shutdown` handling, and the main-loop helper every
//! service binary runs on.

use std::path::PathBuf;
use std::sync::Arc;

use betterspotlight_domain::constants::ipc::{ENV_PID_DIR, ENV_SOCKET_DIR};
use betterspotlight_domain::{Error, Result};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::message;
use crate::server::{RequestHandler, SocketServer};

/// Handler for one service method: `(method, params) -> result object`.
/// Errors are turned into wire errors with the canonical code mapping.
pub type MethodHandler =
    Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Socket path for `service` from the runtime environment.
///
/// # Errors
///
/// Returns a config error when `BETTERSPOTLIGHT_SOCKET_DIR` is unset; the
/// supervisor exports it before spawning children.
pub fn socket_path(service: &str) -> Result<PathBuf> {
    let dir = std::env::var(ENV_SOCKET_DIR)
        .map_err(|_| Error::config(format!("{ENV_SOCKET_DIR} is not set")))?;
    Ok(PathBuf::from(dir).join(format!("{service}.sock")))
}

/// Pid file path for `service` from the runtime environment.
///
/// # Errors
///
/// Returns a config error when `BETTERSPOTLIGHT_PID_DIR` is unset.
pub fn pid_path(service: &str) -> Result<PathBuf> {
    let dir = std::env::var(ENV_PID_DIR)
        .map_err(|_| Error::config(format!("{ENV_PID_DIR} is not set")))?;
    Ok(PathBuf::from(dir).join(format!("{service}.pid")))
}

/// Runs one service process: socket server, pid file, ping/shutdown.
pub struct ServiceRunner {
    name: String,
    server: SocketServer,
    pid_file: PathBuf,
    shutdown: Arc<Notify>,
}

impl ServiceRunner {
    /// Bind the service socket, write the pid file and start serving.
    ///
    /// `ping` and `shutdown` are answered by the runner itself; every other
    /// method goes to `handler`.
    ///
    /// # Errors
    ///
    /// Returns an error when the runtime environment is missing or the
    /// socket cannot be bound.
    pub async fn start(name: &str, handler: MethodHandler) -> Result<Self> {
        let sock = socket_path(name)?;
        let pid_file = pid_path(name)?;

        let shutdown = Arc::new(Notify::new());
        let dispatch_shutdown = Arc::clone(&shutdown);
        let request_handler: RequestHandler = Arc::new(move |incoming: Value| {
            let handler = Arc::clone(&handler);
            let shutdown = Arc::clone(&dispatch_shutdown);
            Box::pin(async move { dispatch(incoming, handler, shutdown).await })
        });

        let server = SocketServer::listen(&sock, request_handler).await?;

        std::fs::write(&pid_file, std::process::id().to_string())
            .map_err(|e| Error::io(format!("failed to write pid file {}", pid_file.display()), e))?;

        info!(service = name, socket = %sock.display(), "service started");
        Ok(Self {
            name: name.to_owned(),
            server,
            pid_file,
            shutdown,
        })
    }

    /// Push a notification to every connected client.
    pub fn broadcast(&self, method: &str, params: Option<Value>) {
        self.server
            .broadcast(&message::make_notification(method, params));
    }

    /// Block until a `shutdown` request or a termination signal arrives,
    /// then tear down the socket and pid file.
    pub async fn run_until_shutdown(&self) {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        tokio::select! {
            () = self.shutdown.notified() => {
                info!(service = %self.name, "shutdown requested over IPC");
            }
            _ = async {
                match sigterm.as_mut() {
                    Some(s) => { s.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                info!(service = %self.name, "SIGTERM received");
            }
            _ = tokio::signal::ctrl_c() => {
                info!(service = %self.name, "interrupt received");
            }
        }
        self.server.close();
        if let Err(e) = std::fs::remove_file(&self.pid_file) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(error = %e, "failed to remove pid file");
            }
        }
    }
}

async fn dispatch(incoming: Value, handler: MethodHandler, shutdown: Arc<Notify>) -> Value {
    let id = message::message_id(&incoming).unwrap_or(0);
    let Some(method) = message::message_method(&incoming).map(str::to_owned) else {
        return message::make_error(
            id,
            betterspotlight_domain::error::IpcErrorCode::InvalidParams,
            "message has no method",
        );
    };
    let params = incoming.get("params").cloned().unwrap_or(Value::Null);

    match method.as_str() {
        "ping" => message::make_response(id, json!({"pong": true})),
        "shutdown" => {
            // notify_one stores a permit, so a shutdown arriving before the
            // main loop is parked is not lost.
            shutdown.notify_one();
            message::make_response(id, json!({"ok": true}))
        }
        _ => match handler(method, params).await {
            Ok(result) => message::make_response(id, result),
            Err(e) => message::make_error_from(id, &e),
        },
    }
}
