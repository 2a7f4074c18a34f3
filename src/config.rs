//! Engine configuration.
//!
//! `LiveConfig` carries the connection settings handed to the SQL driver and
//! replication reader plus the engine's own timing and queue knobs. It can be
//! built in code with the `with_*` helpers or deserialized from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LiveResult, ValidationError};

/// Maximum time to wait for the replication reader to report ready.
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 1500;

/// Interval between readiness polls during initialization.
pub const DEFAULT_INIT_POLL_INTERVAL_MS: u64 = 40;

/// Connection and engine settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// MySQL host
    pub host: String,
    /// MySQL port (default: 3306)
    pub port: u16,
    /// Username for authentication
    pub user: String,
    /// Password for authentication
    pub password: Option<String>,
    /// Default database for triggers that do not name one
    pub database: Option<String>,
    /// Replication server id (must be unique among all replicas)
    pub server_id: u32,
    /// Readiness deadline for the replication reader
    pub init_timeout_ms: u64,
    /// Readiness poll interval
    pub init_poll_interval_ms: u64,
    /// Capacity of the dispatch worker's inbound queue (events and control)
    pub queue_capacity: usize,
    /// Per-subscription update buffer capacity
    pub stream_capacity: usize,
    /// Execute each query once when it is registered
    pub initial_load: bool,
}

impl std::fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("server_id", &self.server_id)
            .field("init_timeout_ms", &self.init_timeout_ms)
            .field("init_poll_interval_ms", &self.init_poll_interval_ms)
            .field("queue_capacity", &self.queue_capacity)
            .field("stream_capacity", &self.stream_capacity)
            .field("initial_load", &self.initial_load)
            .finish()
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            database: None,
            server_id: 1,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            init_poll_interval_ms: DEFAULT_INIT_POLL_INTERVAL_MS,
            queue_capacity: 4096,
            stream_capacity: 1024,
            initial_load: true,
        }
    }
}

#[allow(missing_docs)]
impl LiveConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> LiveResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("invalid config json: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn with_server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    #[must_use]
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_init_poll_interval(mut self, interval: Duration) -> Self {
        self.init_poll_interval_ms = duration_ms(interval);
        self
    }

    #[must_use]
    pub fn with_initial_load(mut self, initial_load: bool) -> Self {
        self.initial_load = initial_load;
        self
    }

    #[must_use]
    pub const fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    #[must_use]
    pub const fn init_poll_interval(&self) -> Duration {
        Duration::from_millis(self.init_poll_interval_ms)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> LiveResult<()> {
        let reason = if self.server_id == 0 {
            "server_id must be non-zero"
        } else if self.init_poll_interval_ms == 0 {
            "init_poll_interval_ms must be non-zero"
        } else if self.queue_capacity == 0 {
            "queue_capacity must be non-zero"
        } else if self.stream_capacity == 0 {
            "stream_capacity must be non-zero"
        } else {
            return Ok(());
        };
        Err(ValidationError::InvalidConfig {
            reason: reason.to_string(),
        }
        .into())
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn duration_ms(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
