//! In-memory SQL connection and replication reader.
//!
//! Thread-safe stand-ins for the external driver and binlog client. They are
//! intended for embedded usage, tests, and as a reference for implementing the
//! boundary traits against a real MySQL server.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::driver::SqlConnection;
use crate::error::{ConnectionError, ExecutionError, LiveError, LiveResult};
use crate::event::{ChangeEvent, Row};
use crate::reader::{EventSink, ReaderConfig, ReplicationReader};

#[derive(Debug, Default)]
struct ConnectionState {
    results: HashMap<String, Vec<Row>>,
    failures: HashMap<String, VecDeque<String>>,
    executions: HashMap<String, usize>,
    connected: bool,
    destroyed: bool,
}

/// Scripted SQL connection.
///
/// Each query text maps to a fixed result set (empty if never set). Failures
/// can be queued per query text and are consumed one execution at a time.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    state: Mutex<ConnectionState>,
    refuse: Option<String>,
}

impl MemoryConnection {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection whose `connect` always fails with `message`.
    #[must_use]
    pub fn refusing(message: impl Into<String>) -> Self {
        Self {
            state: Mutex::default(),
            refuse: Some(message.into()),
        }
    }

    /// Rows returned by every later execution of `query`.
    pub fn set_result(&self, query: &str, rows: Vec<Row>) {
        self.lock().results.insert(query.to_string(), rows);
    }

    /// Make the next execution of `query` fail with `message`.
    pub fn fail_next(&self, query: &str, message: &str) {
        self.lock()
            .failures
            .entry(query.to_string())
            .or_default()
            .push_back(message.to_string());
    }

    /// Number of times `query` has been executed, failures included.
    #[must_use]
    pub fn executions(&self, query: &str) -> usize {
        self.lock().executions.get(query).copied().unwrap_or(0)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn total_executions(&self) -> usize {
        self.lock().executions.values().sum()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SqlConnection for MemoryConnection {
    fn connect(&self) -> Result<(), ConnectionError> {
        if let Some(message) = &self.refuse {
            return Err(ConnectionError::ConnectFailed {
                message: message.clone(),
            });
        }
        self.lock().connected = true;
        Ok(())
    }

    fn query(&self, sql: &str) -> LiveResult<Vec<Row>> {
        let mut state = self.lock();
        if state.destroyed {
            return Err(LiveError::Connection(ConnectionError::Closed));
        }
        *state.executions.entry(sql.to_string()).or_insert(0) += 1;

        if let Some(message) = state.failures.get_mut(sql).and_then(VecDeque::pop_front) {
            return Err(ExecutionError::Query {
                query: sql.to_string(),
                message,
            }
            .into());
        }
        Ok(state.results.get(sql).cloned().unwrap_or_default())
    }

    fn destroy(&self) {
        let mut state = self.lock();
        state.destroyed = true;
        state.connected = false;
    }
}

#[derive(Debug)]
enum Readiness {
    OnStart,
    After(Duration),
    Manual,
}

#[derive(Debug, Default)]
struct ReaderState {
    sink: Option<EventSink>,
    config: Option<ReaderConfig>,
    history: Vec<ReaderConfig>,
    set_failures: VecDeque<String>,
    started_at: Option<Instant>,
    stopped: bool,
}

/// Replication reader driven by the caller.
///
/// `emit` applies the current `include_schema` the way a binlog client does,
/// dropping events for unwatched tables; `inject` bypasses the filter.
#[derive(Debug)]
pub struct MemoryReader {
    state: Mutex<ReaderState>,
    readiness: Readiness,
    ready: AtomicBool,
}

impl Default for MemoryReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReader {
    /// Reports ready as soon as it is started.
    #[must_use]
    pub fn new() -> Self {
        Self::with_readiness(Readiness::OnStart)
    }

    /// Reports ready once `delay` has passed since `start`.
    #[must_use]
    pub fn ready_after(delay: Duration) -> Self {
        Self::with_readiness(Readiness::After(delay))
    }

    /// Only reports ready after `set_ready(true)`.
    #[must_use]
    pub fn manual() -> Self {
        Self::with_readiness(Readiness::Manual)
    }

    fn with_readiness(readiness: Readiness) -> Self {
        Self {
            state: Mutex::default(),
            readiness,
            ready: AtomicBool::new(false),
        }
    }

    #[allow(missing_docs)]
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    /// Make the next `set` fail with `message`, leaving the filter unchanged.
    pub fn fail_next_set(&self, message: impl Into<String>) {
        self.lock().set_failures.push_back(message.into());
    }

    /// Deliver `event` if the current filter admits it. Table maps for
    /// watched tables are delivered too.
    pub fn emit(&self, event: ChangeEvent) -> LiveResult<bool> {
        let sink = {
            let state = self.lock();
            let (database, table) = event.table();
            let admitted = state
                .config
                .as_ref()
                .is_some_and(|cfg| cfg.admits(database, table) && cfg.include_events.contains(&event.name()));
            match (&state.sink, admitted, state.stopped) {
                (Some(sink), true, false) => sink.clone(),
                _ => return Ok(false),
            }
        };
        sink.emit(event)?;
        Ok(true)
    }

    /// Deliver `event` regardless of the filter.
    pub fn inject(&self, event: ChangeEvent) -> LiveResult<()> {
        let sink = self.lock().sink.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => Err(ExecutionError::Reader {
                message: "reader not started".to_string(),
            }
            .into()),
        }
    }

    /// Most recent configuration from `start` or `set`.
    #[must_use]
    pub fn config(&self) -> Option<ReaderConfig> {
        self.lock().config.clone()
    }

    /// Every configuration received, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<ReaderConfig> {
        self.lock().history.clone()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.lock().started_at.is_some()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ReplicationReader for MemoryReader {
    fn start(&self, config: &ReaderConfig, sink: EventSink) -> LiveResult<()> {
        let mut state = self.lock();
        if state.started_at.is_some() {
            return Err(ExecutionError::Reader {
                message: "reader already started".to_string(),
            }
            .into());
        }
        state.sink = Some(sink);
        state.config = Some(config.clone());
        state.history.push(config.clone());
        state.started_at = Some(Instant::now());
        Ok(())
    }

    fn set(&self, config: &ReaderConfig) -> LiveResult<()> {
        let mut state = self.lock();
        if let Some(message) = state.set_failures.pop_front() {
            return Err(ExecutionError::Reader { message }.into());
        }
        state.config = Some(config.clone());
        state.history.push(config.clone());
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        state.sink = None;
    }

    fn is_ready(&self) -> bool {
        if self.ready.load(Ordering::Acquire) {
            return true;
        }
        let started_at = self.lock().started_at;
        match (&self.readiness, started_at) {
            (Readiness::OnStart, Some(_)) => true,
            (Readiness::After(delay), Some(at)) => at.elapsed() >= *delay,
            _ => false,
        }
    }
}
