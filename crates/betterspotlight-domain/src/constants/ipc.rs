//! IPC transport limits and defaults.

/// Maximum encoded message size accepted by the decoder (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Per-client read buffer cap; exceeding it disconnects the client (64 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default blocking request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Socket-probe timeout when deciding whether a socket path is stale.
pub const STALE_SOCKET_PROBE_TIMEOUT_MS: u64 = 150;

/// Default auto-reconnect attempts.
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Default auto-reconnect base delay in milliseconds.
pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 500;

/// Environment variables overriding the runtime layout (used by tests).
pub const ENV_RUNTIME_DIR: &str = "BETTERSPOTLIGHT_RUNTIME_DIR";
pub const ENV_SOCKET_DIR: &str = "BETTERSPOTLIGHT_SOCKET_DIR";
pub const ENV_PID_DIR: &str = "BETTERSPOTLIGHT_PID_DIR";
pub const ENV_INSTANCE_ID: &str = "BETTERSPOTLIGHT_INSTANCE_ID";
pub const ENV_DATA_DIR: &str = "BETTERSPOTLIGHT_DATA_DIR";
