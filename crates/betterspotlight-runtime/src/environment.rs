//! Per-launch runtime environment: instance directories, metadata and
//! orphan reconciliation.

use std::path::{Path, PathBuf};

use betterspotlight_domain::constants::ipc::{
    ENV_INSTANCE_ID, ENV_PID_DIR, ENV_RUNTIME_DIR, ENV_SOCKET_DIR,
};
use betterspotlight_domain::utils::time;
use betterspotlight_domain::{Error, Result};
use serde_json::json;
use tracing::{info, warn};

/// Filesystem layout for one app launch.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub runtime_root: PathBuf,
    pub instance_id: String,
    pub runtime_dir: PathBuf,
    pub socket_dir: PathBuf,
    pub pid_dir: PathBuf,
    pub metadata_path: PathBuf,
}

impl RuntimeContext {
    /// Environment variables handed to every spawned service child.
    #[must_use]
    pub fn child_env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_INSTANCE_ID.to_owned(), self.instance_id.clone()),
            (
                ENV_RUNTIME_DIR.to_owned(),
                self.runtime_dir.display().to_string(),
            ),
            (
                ENV_SOCKET_DIR.to_owned(),
                self.socket_dir.display().to_string(),
            ),
            (ENV_PID_DIR.to_owned(), self.pid_dir.display().to_string()),
        ]
    }
}

/// Per-user runtime root: `<tmp>/betterspotlight-<uid>`.
#[must_use]
pub fn runtime_root_path() -> PathBuf {
    let uid = nix::unistd::getuid().as_raw();
    std::env::temp_dir().join(format!("betterspotlight-{uid}"))
}

/// Unique instance id: `<millis>-<pid>-<uuid8>`.
#[must_use]
pub fn make_instance_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        time::epoch_millis(),
        std::process::id(),
        &uuid[..8]
    )
}

/// Pid liveness via signal 0.
#[must_use]
pub fn process_is_alive(pid: i64) -> bool {
    if pid <= 0 {
        return false;
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok()
}

fn ensure_directory(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| Error::io(format!("failed to create directory {}", path.display()), e))
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Initialize the runtime context for this launch: resolve (or create) the
/// instance directory tree and write `instance.json`. The supervisor passes
/// the `BETTERSPOTLIGHT_*` variables to each child it spawns; the variables
/// also override the defaults here for tests.
///
/// # Errors
///
/// Returns an I/O error when a directory or the metadata file cannot be
/// created.
pub fn init_runtime_context() -> Result<RuntimeContext> {
    let runtime_root = runtime_root_path();
    ensure_directory(&runtime_root)?;

    let instance_id = std::env::var(ENV_INSTANCE_ID)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(make_instance_id);
    let runtime_dir = env_path(ENV_RUNTIME_DIR).unwrap_or_else(|| runtime_root.join(&instance_id));
    let socket_dir = env_path(ENV_SOCKET_DIR).unwrap_or_else(|| runtime_dir.join("sockets"));
    let pid_dir = env_path(ENV_PID_DIR).unwrap_or_else(|| runtime_dir.join("pids"));
    let metadata_path = runtime_dir.join("instance.json");

    ensure_directory(&runtime_dir)?;
    ensure_directory(&socket_dir)?;
    ensure_directory(&pid_dir)?;

    let context = RuntimeContext {
        runtime_root,
        instance_id,
        runtime_dir,
        socket_dir,
        pid_dir,
        metadata_path,
    };
    write_runtime_metadata(&context)?;
    info!(instance = %context.instance_id, dir = %context.runtime_dir.display(), "runtime context initialized");
    Ok(context)
}

fn write_runtime_metadata(context: &RuntimeContext) -> Result<()> {
    let metadata = json!({
        "instance_id": context.instance_id,
        "app_pid": std::process::id(),
        "started_at": time::iso_now(),
        "version": env!("CARGO_PKG_VERSION"),
        "runtime_dir": context.runtime_dir,
        "socket_dir": context.socket_dir,
        "pid_dir": context.pid_dir,
    });
    let body = serde_json::to_vec_pretty(&metadata)?;
    std::fs::write(&context.metadata_path, body).map_err(|e| {
        Error::io(
            format!(
                "failed to write runtime metadata: {}",
                context.metadata_path.display()
            ),
            e,
        )
    })
}

/// Remove sibling instance directories whose recorded app pid is no longer
/// alive. Never removes the live instance or a sibling with a living pid.
/// Returns the removed directories.
pub fn cleanup_orphan_runtime_directories(context: &RuntimeContext) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let Ok(entries) = std::fs::read_dir(&context.runtime_root) else {
        return removed;
    };

    for entry in entries.flatten() {
        let instance_path = entry.path();
        if !instance_path.is_dir() || instance_path == context.runtime_dir {
            continue;
        }
        let metadata_path = instance_path.join("instance.json");
        let Ok(body) = std::fs::read(&metadata_path) else {
            continue;
        };
        let Ok(metadata) = serde_json::from_slice::<serde_json::Value>(&body) else {
            continue;
        };
        let app_pid = metadata.get("app_pid").and_then(serde_json::Value::as_i64);
        if app_pid.is_none_or(process_is_alive) {
            continue;
        }
        match std::fs::remove_dir_all(&instance_path) {
            Ok(()) => {
                info!(path = %instance_path.display(), "removed orphan runtime directory");
                removed.push(instance_path);
            }
            Err(e) => warn!(path = %instance_path.display(), error = %e, "failed to remove orphan directory"),
        }
    }
    removed
}
