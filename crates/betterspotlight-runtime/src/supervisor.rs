//! Supervisor: owns the service child processes, isolates their crashes
//! and restarts them under a bounded crash-window policy.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use betterspotlight_domain::utils::time;
use betterspotlight_ipc::SocketClient;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::environment::RuntimeContext;

/// Crash window: crashes older than this do not count toward give-up.
pub const CRASH_WINDOW_SECS: i64 = 60;

/// Crashes inside one window before the supervisor gives up.
pub const MAX_CRASHES_BEFORE_GIVE_UP: u32 = 3;

/// Heartbeat ping cadence.
pub const HEARTBEAT_INTERVAL_MS: u64 = 10_000;

/// Restart backoff cap.
pub const MAX_RESTART_BACKOFF_MS: u64 = 30_000;

/// Per-service lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Registered,
    Starting,
    Ready,
    Backoff,
    Crashed,
    GivingUp,
    Stopped,
}

impl ServiceState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Backoff => "backoff",
            Self::Crashed => "crashed",
            Self::GivingUp => "giving_up",
            Self::Stopped => "stopped",
        }
    }
}

/// Events published to observers.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    ServiceStateChanged { name: String, state: ServiceState },
    ServiceStarted { name: String },
    ServiceStopped { name: String },
    ServiceCrashed { name: String, crash_count: u32 },
    AllServicesReady,
}

/// One row of the observer snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub name: String,
    pub crash_count: u32,
    pub first_crash_time: i64,
    pub last_crash_time: i64,
    pub ready: bool,
    pub running: bool,
    pub state: &'static str,
    pub pid: i64,
}

struct ManagedService {
    name: String,
    exec_path: PathBuf,
    state: ServiceState,
    crash_count: u32,
    first_crash_time: i64,
    last_crash_time: i64,
    ready: bool,
    pid: Option<u32>,
    exited_rx: Option<watch::Receiver<bool>>,
    client: Option<SocketClient>,
}

impl ManagedService {
    fn running(&self) -> bool {
        self.pid.is_some() && self.exited_rx.as_ref().is_some_and(|rx| !*rx.borrow())
    }
}

struct Shared {
    context: RuntimeContext,
    services: Mutex<Vec<ManagedService>>,
    events: broadcast::Sender<SupervisorEvent>,
    stopping: AtomicBool,
    heartbeat_task: StdMutex<Option<JoinHandle<()>>>,
    extra_env: StdMutex<Vec<(String, String)>>,
}

/// Supervisor of the four long-running service processes.
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Create a supervisor bound to this launch's runtime context.
    #[must_use]
    pub fn new(context: RuntimeContext) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                context,
                services: Mutex::new(Vec::new()),
                events,
                stopping: AtomicBool::new(false),
                heartbeat_task: StdMutex::new(None),
                extra_env: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Add an environment variable passed to every spawned child (on top
    /// of the runtime-context variables).
    pub fn set_child_env(&self, key: &str, value: &str) {
        if let Ok(mut env) = self.shared.extra_env.lock() {
            env.retain(|(k, _)| k != key);
            env.push((key.to_owned(), value.to_owned()));
        }
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.shared.events.subscribe()
    }

    /// Register a service. Idempotent: re-registering with the same name
    /// updates the executable path, resets counters and returns the entry
    /// to Registered.
    pub async fn add_service(&self, name: &str, exec_path: impl Into<PathBuf>) {
        let exec_path = exec_path.into();
        let mut services = self.shared.services.lock().await;
        if let Some(existing) = services.iter_mut().find(|s| s.name == name) {
            if existing.exec_path != exec_path {
                warn!(
                    service = name,
                    path = %exec_path.display(),
                    "service already registered, updating executable path"
                );
                existing.exec_path = exec_path;
            } else {
                info!(service = name, "service already registered, skipping duplicate");
            }
            existing.crash_count = 0;
            existing.first_crash_time = 0;
            existing.last_crash_time = 0;
            transition(&self.shared, existing, ServiceState::Registered);
            return;
        }

        info!(service = name, path = %exec_path.display(), "registered service");
        services.push(ManagedService {
            name: name.to_owned(),
            exec_path,
            state: ServiceState::Registered,
            crash_count: 0,
            first_crash_time: 0,
            last_crash_time: 0,
            ready: false,
            pid: None,
            exited_rx: None,
            client: None,
        });
    }

    /// Launch every registered child and start the heartbeat. Returns
    /// false when any child failed to spawn.
    pub async fn start_all(&self) -> bool {
        self.shared.stopping.store(false, Ordering::SeqCst);
        for dir in [
            &self.shared.context.runtime_dir,
            &self.shared.context.socket_dir,
            &self.shared.context.pid_dir,
        ] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                error!(dir = %dir.display(), error = %e, "failed to create runtime directory");
            }
        }

        let mut all_started = true;
        let names: Vec<String> = {
            let services = self.shared.services.lock().await;
            services.iter().map(|s| s.name.clone()).collect()
        };
        for name in names {
            if !start_service(&self.shared, &name).await {
                all_started = false;
            }
        }

        let hb_shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if hb_shared.stopping.load(Ordering::SeqCst) {
                    break;
                }
                heartbeat(&hb_shared).await;
            }
        });
        if let Ok(mut slot) = self.shared.heartbeat_task.lock() {
            if let Some(old) = slot.replace(task) {
                old.abort();
            }
        }

        all_started
    }

    /// Stop every child: graceful IPC shutdown, then SIGTERM, then SIGKILL.
    /// Idempotent; crash handling is suppressed while stopping.
    pub async fn stop_all(&self) {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut slot) = self.shared.heartbeat_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }

        let names: Vec<String> = {
            let services = self.shared.services.lock().await;
            services.iter().map(|s| s.name.clone()).collect()
        };
        for name in names {
            stop_service(&self.shared, &name).await;
        }
        self.shared.stopping.store(false, Ordering::SeqCst);
    }

    /// IPC client for a ready service, if connected.
    pub async fn client_for(&self, name: &str) -> Option<SocketClient> {
        let services = self.shared.services.lock().await;
        services
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.client.clone())
    }

    /// Observer snapshot of every registered service.
    pub async fn snapshot(&self) -> Vec<ServiceSnapshot> {
        let services = self.shared.services.lock().await;
        services
            .iter()
            .map(|s| ServiceSnapshot {
                name: s.name.clone(),
                crash_count: s.crash_count,
                first_crash_time: s.first_crash_time,
                last_crash_time: s.last_crash_time,
                ready: s.ready,
                running: s.running(),
                state: s.state.as_str(),
                pid: s.pid.map_or(0, i64::from),
            })
            .collect()
    }
}

fn emit(shared: &Shared, event: SupervisorEvent) {
    let _ = shared.events.send(event);
}

fn transition(shared: &Shared, service: &mut ManagedService, next: ServiceState) {
    if service.state == next {
        return;
    }
    service.state = next;
    emit(
        shared,
        SupervisorEvent::ServiceStateChanged {
            name: service.name.clone(),
            state: next,
        },
    );
}

fn pid_file(shared: &Shared, name: &str) -> PathBuf {
    shared.context.pid_dir.join(format!("{name}.pid"))
}

fn socket_file(shared: &Shared, name: &str) -> PathBuf {
    shared.context.socket_dir.join(format!("{name}.sock"))
}

/// Restart delay: first retry gets 0-125 ms of jitter; each subsequent
/// retry doubles a 1 s base, bounded to 30 s, plus up to 25% bounded
/// jitter, to avoid synchronized restart storms.
fn restart_delay_ms(crash_count: u32) -> u64 {
    let mut rng = rand::rng();
    if crash_count <= 1 {
        return rng.random_range(0..125);
    }
    let mut base: u64 = 1_000;
    for _ in 2..crash_count {
        if base >= MAX_RESTART_BACKOFF_MS {
            break;
        }
        base = (base * 2).min(MAX_RESTART_BACKOFF_MS);
    }
    let jitter = rng.random_range(0..=(base / 4).max(1));
    (base + jitter).min(MAX_RESTART_BACKOFF_MS)
}

fn start_service<'a>(
    shared: &'a Arc<Shared>,
    name: &'a str,
) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
    Box::pin(start_service_inner(shared, name))
}

async fn start_service_inner(shared: &Arc<Shared>, name: &str) -> bool {
    let (exec_path, envs) = {
        let mut services = shared.services.lock().await;
        let Some(service) = services.iter_mut().find(|s| s.name == name) else {
            return false;
        };
        transition(shared, service, ServiceState::Starting);
        let mut envs = shared.context.child_env();
        if let Ok(extra) = shared.extra_env.lock() {
            envs.extend(extra.iter().cloned());
        }
        (service.exec_path.clone(), envs)
    };

    info!(service = name, path = %exec_path.display(), "starting service");
    let spawned = tokio::process::Command::new(&exec_path)
        .envs(envs)
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .spawn();

    let mut child = match spawned {
        Ok(c) => c,
        Err(e) => {
            error!(service = name, error = %e, "failed to start service");
            let mut services = shared.services.lock().await;
            if let Some(service) = services.iter_mut().find(|s| s.name == name) {
                transition(shared, service, ServiceState::Stopped);
                service.pid = None;
                service.exited_rx = None;
            }
            return false;
        }
    };

    let pid = child.id().unwrap_or(0);
    info!(service = name, pid, "service started");

    if let Err(e) = std::fs::write(pid_file(shared, name), pid.to_string()) {
        warn!(service = name, error = %e, "failed to write pid file");
    }

    let (exited_tx, exited_rx) = watch::channel(false);
    {
        let mut services = shared.services.lock().await;
        if let Some(service) = services.iter_mut().find(|s| s.name == name) {
            service.pid = Some(pid);
            service.exited_rx = Some(exited_rx);
            service.ready = false;
        }
    }

    // Parent-wait the child; route its exit back into lifecycle handling.
    let waiter_shared = Arc::clone(shared);
    let waiter_name = name.to_owned();
    tokio::spawn(async move {
        let status = child.wait().await;
        let (code, crashed) = match status {
            Ok(s) => (s.code().unwrap_or(-1), !s.success()),
            Err(_) => (-1, true),
        };
        let _ = exited_tx.send(true);
        on_service_finished(&waiter_shared, &waiter_name, code, crashed).await;
    });

    // Initial connection attempt after a short delay; the service needs a
    // moment to set up its socket.
    let connect_shared = Arc::clone(shared);
    let connect_name = name.to_owned();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        try_initial_connect(&connect_shared, &connect_name).await;
    });

    true
}

async fn try_initial_connect(shared: &Arc<Shared>, name: &str) {
    let path = socket_file(shared, name);
    let Ok(client) = SocketClient::connect(&path, 3_000).await else {
        return;
    };

    let mut all_ready = true;
    {
        let mut services = shared.services.lock().await;
        let Some(service) = services.iter_mut().find(|s| s.name == name) else {
            return;
        };
        service.client = Some(client);
        service.ready = true;
        transition(shared, service, ServiceState::Ready);
        info!(service = name, "initial connection succeeded");
        emit(
            shared,
            SupervisorEvent::ServiceStarted {
                name: name.to_owned(),
            },
        );
        for s in services.iter() {
            if !s.ready {
                all_ready = false;
            }
        }
        if services.is_empty() {
            all_ready = false;
        }
    }
    if all_ready {
        emit(shared, SupervisorEvent::AllServicesReady);
    }
}

async fn on_service_finished(shared: &Arc<Shared>, name: &str, exit_code: i32, crashed: bool) {
    if shared.stopping.load(Ordering::SeqCst) {
        let mut services = shared.services.lock().await;
        if let Some(service) = services.iter_mut().find(|s| s.name == name) {
            service.ready = false;
            transition(shared, service, ServiceState::Stopped);
        }
        return;
    }

    let mut schedule_restart_after: Option<u64> = None;
    {
        let mut services = shared.services.lock().await;
        let Some(service) = services.iter_mut().find(|s| s.name == name) else {
            return;
        };
        service.ready = false;
        service.client = None;

        if crashed || exit_code != 0 {
            transition(shared, service, ServiceState::Crashed);
            let now = time::epoch_secs() as i64;

            if service.crash_count == 0 || now - service.first_crash_time > CRASH_WINDOW_SECS {
                service.crash_count = 0;
                service.first_crash_time = now;
            }
            service.crash_count += 1;
            service.last_crash_time = now;

            warn!(
                service = name,
                exit_code,
                crashes = service.crash_count,
                window = MAX_CRASHES_BEFORE_GIVE_UP,
                "service crashed"
            );
            emit(
                shared,
                SupervisorEvent::ServiceCrashed {
                    name: name.to_owned(),
                    crash_count: service.crash_count,
                },
            );

            if service.crash_count >= MAX_CRASHES_BEFORE_GIVE_UP {
                error!(
                    service = name,
                    crashes = service.crash_count,
                    window_secs = CRASH_WINDOW_SECS,
                    "service crashed too often, giving up"
                );
                transition(shared, service, ServiceState::GivingUp);
            } else {
                let delay = restart_delay_ms(service.crash_count);
                transition(shared, service, ServiceState::Backoff);
                info!(service = name, delay_ms = delay, "restart scheduled");
                schedule_restart_after = Some(delay);
            }
        } else {
            info!(service = name, exit_code, "service exited normally");
            transition(shared, service, ServiceState::Stopped);
            emit(
                shared,
                SupervisorEvent::ServiceStopped {
                    name: name.to_owned(),
                },
            );
        }
    }

    if let Some(delay) = schedule_restart_after {
        let restart_shared = Arc::clone(shared);
        let restart_name = name.to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if restart_shared.stopping.load(Ordering::SeqCst) {
                return;
            }
            restart_service(&restart_shared, &restart_name).await;
        });
    }
}

async fn restart_service(shared: &Arc<Shared>, name: &str) {
    if shared.stopping.load(Ordering::SeqCst) {
        return;
    }
    info!(service = name, "restarting service");
    {
        let mut services = shared.services.lock().await;
        let Some(service) = services.iter_mut().find(|s| s.name == name) else {
            return;
        };
        if let Some(client) = service.client.take() {
            client.disconnect();
        }
        let still_running = service.exited_rx.as_ref().is_some_and(|rx| !*rx.borrow());
        if let Some(pid) = service.pid.take() {
            if still_running {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }
        service.ready = false;
        service.exited_rx = None;
        transition(shared, service, ServiceState::Starting);
    }
    let _ = std::fs::remove_file(pid_file(shared, name));
    start_service(shared, name).await;
}

async fn stop_service(shared: &Arc<Shared>, name: &str) {
    let (client, pid, exited_rx) = {
        let mut services = shared.services.lock().await;
        let Some(service) = services.iter_mut().find(|s| s.name == name) else {
            return;
        };
        if service.pid.is_none() {
            return;
        }
        (
            service.client.take(),
            service.pid,
            service.exited_rx.clone(),
        )
    };

    info!(service = name, "stopping service");
    if let Some(client) = client {
        if client.is_connected() {
            let _ = client.send_request("shutdown", None, 2_000).await;
        }
        client.disconnect();
    }

    let exited = |rx: Option<watch::Receiver<bool>>, timeout: Duration| async move {
        let Some(mut rx) = rx else { return true };
        if *rx.borrow() {
            return true;
        }
        tokio::time::timeout(timeout, async {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .is_ok()
    };

    let raw_pid = pid.map(|p| Pid::from_raw(p as i32));
    if !exited(exited_rx.clone(), Duration::from_secs(5)).await {
        warn!(service = name, "service did not exit gracefully, terminating");
        if let Some(p) = raw_pid {
            let _ = kill(p, Signal::SIGTERM);
        }
        if !exited(exited_rx.clone(), Duration::from_secs(2)).await {
            warn!(service = name, "service did not respond to SIGTERM, killing");
            if let Some(p) = raw_pid {
                let _ = kill(p, Signal::SIGKILL);
            }
            let _ = exited(exited_rx, Duration::from_secs(1)).await;
        }
    }

    {
        let mut services = shared.services.lock().await;
        if let Some(service) = services.iter_mut().find(|s| s.name == name) {
            service.ready = false;
            service.pid = None;
            service.exited_rx = None;
            transition(shared, service, ServiceState::Stopped);
        }
    }
    let _ = std::fs::remove_file(pid_file(shared, name));
    emit(
        shared,
        SupervisorEvent::ServiceStopped {
            name: name.to_owned(),
        },
    );
}

async fn heartbeat(shared: &Arc<Shared>) {
    // Reset crash counters for services quiet since giving up.
    let now = time::epoch_secs() as i64;
    let mut to_restart = Vec::new();
    {
        let mut services = shared.services.lock().await;
        for service in services.iter_mut() {
            if service.crash_count >= MAX_CRASHES_BEFORE_GIVE_UP
                && now - service.last_crash_time > CRASH_WINDOW_SECS * 2
            {
                info!(
                    service = %service.name,
                    quiet_secs = now - service.last_crash_time,
                    "resetting crash counter"
                );
                service.crash_count = 0;
                service.first_crash_time = 0;
                to_restart.push(service.name.clone());
            }
        }
    }
    for name in to_restart {
        restart_service(shared, &name).await;
    }

    let names: Vec<String> = {
        let services = shared.services.lock().await;
        services.iter().map(|s| s.name.clone()).collect()
    };

    let mut all_ready = !names.is_empty();
    let mut any_changed = false;

    for name in &names {
        let (running, giving_up, client) = {
            let services = shared.services.lock().await;
            let Some(service) = services.iter().find(|s| &s.name == name) else {
                continue;
            };
            (
                service.running(),
                service.crash_count >= MAX_CRASHES_BEFORE_GIVE_UP,
                service.client.clone(),
            )
        };

        if !running {
            let mut services = shared.services.lock().await;
            if let Some(service) = services.iter_mut().find(|s| &s.name == name) {
                let next = if giving_up {
                    ServiceState::GivingUp
                } else {
                    ServiceState::Stopped
                };
                transition(shared, service, next);
            }
            all_ready = false;
            continue;
        }

        // Ensure a client connection.
        let client = match client.filter(SocketClient::is_connected) {
            Some(c) => c,
            None => {
                let path = socket_file(shared, name);
                match SocketClient::connect(&path, 1_000).await {
                    Ok(c) => {
                        info!(service = %name, "connected to service");
                        let mut services = shared.services.lock().await;
                        if let Some(service) = services.iter_mut().find(|s| &s.name == name) {
                            service.client = Some(c.clone());
                        }
                        c
                    }
                    Err(_) => {
                        let mut services = shared.services.lock().await;
                        if let Some(service) = services.iter_mut().find(|s| &s.name == name) {
                            transition(shared, service, ServiceState::Starting);
                        }
                        all_ready = false;
                        continue;
                    }
                }
            }
        };

        let response = client.send_request("ping", None, 5_000).await;
        let healthy = match &response {
            Ok(value) => value.get("type").and_then(serde_json::Value::as_str) != Some("error"),
            Err(_) => false,
        };

        let mut services = shared.services.lock().await;
        let Some(service) = services.iter_mut().find(|s| &s.name == name) else {
            continue;
        };
        if healthy {
            if !service.ready {
                service.ready = true;
                any_changed = true;
                transition(shared, service, ServiceState::Ready);
                info!(service = %name, "service is ready");
                emit(
                    shared,
                    SupervisorEvent::ServiceStarted { name: name.clone() },
                );
            }
        } else {
            debug!(service = %name, "heartbeat failed");
            if service.ready {
                service.ready = false;
                any_changed = true;
                transition(shared, service, ServiceState::Starting);
            }
            all_ready = false;
        }
    }

    if all_ready && any_changed {
        info!("all services ready");
        emit(shared, SupervisorEvent::AllServicesReady);
    }
}
