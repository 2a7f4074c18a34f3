//! Error types for livesql.
//!
//! All errors are strongly typed using thiserror so callers can pattern match
//! on the failure that matters to them: a rejected `select`, a failed query,
//! a replication reader that never became ready.

use thiserror::Error;

use crate::live::lifecycle::LifecycleState;

/// Validation errors raised synchronously for malformed input.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Trigger table name cannot be empty")]
    EmptyTableName,

    #[error("No database selected on trigger for table '{table}'")]
    NoDatabaseSelected {
        table: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors that occur while the engine is running.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Query failed ({query}): {message}")]
    Query {
        query: String,
        message: String,
    },

    #[error("INIT_TIMEOUT: replication reader not ready after {duration_ms}ms")]
    InitTimeout {
        duration_ms: u64,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Replication reader error: {message}")]
    Reader {
        message: String,
    },

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidState {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Engine has been stopped")]
    Stopped,
}

/// Database connection errors.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Connection failed: {message}")]
    ConnectFailed {
        message: String,
    },

    #[error("Connection closed")]
    Closed,
}

/// Top-level error type for livesql.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LiveError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl LiveError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Execution(e) => match e {
                ExecutionError::Query { .. } => "QUERY_FAILED",
                ExecutionError::InitTimeout { .. } => "INIT_TIMEOUT",
                ExecutionError::Timeout { .. } => "TIMEOUT",
                ExecutionError::Disconnected { .. } => "DISCONNECTED",
                ExecutionError::Reader { .. } => "READER",
                ExecutionError::InvalidState { .. } => "INVALID_STATE",
                ExecutionError::Stopped => "STOPPED",
            },
            Self::Connection(_) => "CONNECTION",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns true if the replication reader missed its readiness deadline.
    #[must_use]
    pub const fn is_init_timeout(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::InitTimeout { .. }))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if retrying the same operation could succeed.
    ///
    /// The engine itself never retries; this is a hint for callers.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Query { .. }
                    | ExecutionError::Timeout { .. }
                    | ExecutionError::InitTimeout { .. }
            ),
            Self::Connection(e) => matches!(e, ConnectionError::ConnectFailed { .. }),
        }
    }
}

/// Result type alias for livesql operations.
pub type LiveResult<T> = Result<T, LiveError>;

pub(crate) fn disconnected(path: &str) -> LiveError {
    LiveError::Execution(ExecutionError::Disconnected {
        path: path.to_string(),
    })
}
