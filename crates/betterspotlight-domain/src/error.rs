//! Error handling types.
//!
//! One error enum for the whole system. Every variant maps onto exactly one
//! of the nine canonical IPC error codes via [`Error::ipc_code`], so a
//! service handler can turn any failure into a well-formed wire error
//! without inspecting the variant.

use thiserror::Error;

/// Result type alias for operations that can fail.
pub type Result<T> = std::result::Result<T, Error>;

/// Canonical IPC error codes shared by every service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpcErrorCode {
    InvalidParams,
    Timeout,
    PermissionDenied,
    NotFound,
    AlreadyRunning,
    InternalError,
    Unsupported,
    CorruptedIndex,
    ServiceUnavailable,
}

impl IpcErrorCode {
    /// Numeric code carried in the wire error body.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::InvalidParams => 1,
            Self::Timeout => 2,
            Self::PermissionDenied => 3,
            Self::NotFound => 4,
            Self::AlreadyRunning => 5,
            Self::InternalError => 6,
            Self::Unsupported => 7,
            Self::CorruptedIndex => 8,
            Self::ServiceUnavailable => 9,
        }
    }

    /// Wire string (`codeString` field).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "INVALID_PARAMS",
            Self::Timeout => "TIMEOUT",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyRunning => "ALREADY_RUNNING",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Unsupported => "UNSUPPORTED",
            Self::CorruptedIndex => "CORRUPTED_INDEX",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Main error type for BetterSpotlight.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Database operation error
    #[error("Database error: {message}")]
    Database {
        /// Description of the database error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database stayed busy/locked after the retry budget was exhausted
    #[error("Database busy after {attempts} attempts: {message}")]
    DatabaseBusy {
        /// Description of the contended statement
        message: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// IPC framing error (bad length header, oversized frame, invalid UTF-8)
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the framing error
        message: String,
    },

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Required field missing, wrong type, or enum value out of range
    #[error("Invalid params: {message}")]
    InvalidParams {
        /// What was wrong with the parameters
        message: String,
    },

    /// Target path/id does not exist
    #[error("Not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },

    /// Capability unavailable (feature flag off, backend missing)
    #[error("Unsupported: {message}")]
    Unsupported {
        /// Why the operation is unsupported
        message: String,
    },

    /// A one-of-a-kind background job is already in progress
    #[error("Already running: {message}")]
    AlreadyRunning {
        /// The job that is already in progress
        message: String,
    },

    /// Per-call deadline exceeded
    #[error("Timeout: {message}")]
    Timeout {
        /// What timed out
        message: String,
    },

    /// Filesystem refusal
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// What was refused
        message: String,
    },

    /// FTS integrity check failed; callers escalate to administrative rebuild
    #[error("Corrupted index: {message}")]
    CorruptedIndex {
        /// Diagnostic detail
        message: String,
    },

    /// Dependent service not ready
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Which dependency is unavailable
        message: String,
    },

    /// Programming bug, unreachable branch
    #[error("Internal error: {message}")]
    Internal {
        /// Diagnostic detail
        message: String,
    },
}

impl Error {
    /// Map this error onto its canonical IPC code.
    #[must_use]
    pub fn ipc_code(&self) -> IpcErrorCode {
        match self {
            Self::InvalidParams { .. } => IpcErrorCode::InvalidParams,
            Self::Timeout { .. } => IpcErrorCode::Timeout,
            Self::PermissionDenied { .. } => IpcErrorCode::PermissionDenied,
            Self::NotFound { .. } => IpcErrorCode::NotFound,
            Self::AlreadyRunning { .. } => IpcErrorCode::AlreadyRunning,
            Self::Unsupported { .. } => IpcErrorCode::Unsupported,
            Self::CorruptedIndex { .. } => IpcErrorCode::CorruptedIndex,
            Self::ServiceUnavailable { .. } => IpcErrorCode::ServiceUnavailable,
            Self::Io { .. }
            | Self::Json { .. }
            | Self::Database { .. }
            | Self::DatabaseBusy { .. }
            | Self::Codec { .. }
            | Self::Config { .. }
            | Self::Internal { .. } => IpcErrorCode::InternalError,
        }
    }

    /// I/O error with context.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Database error without a source.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Database error wrapping an underlying driver error.
    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Codec/framing error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Invalid request parameters.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Resource not found.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Capability unavailable.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Job already in progress.
    pub fn already_running(message: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            message: message.into(),
        }
    }

    /// Deadline exceeded.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Dependent service not ready.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Internal/programming error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        let message = source.to_string();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied { message };
        }
        Self::Io {
            message,
            source: Some(Box::new(source)),
        }
    }
}
