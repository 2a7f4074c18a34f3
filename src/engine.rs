//! `LiveEngine`: the public entry point.
//!
//! The engine connects the SQL driver, starts the replication reader with the
//! current schema filter, spawns the dispatch worker and then drives the
//! lifecycle: readiness handshake, `select`, `pause`/`resume` and `end`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{debug, info, warn};

use crate::config::{duration_ms, LiveConfig};
use crate::driver::SqlConnection;
use crate::error::{disconnected, LiveError, LiveResult, ValidationError};
use crate::live::dispatcher::{worker_loop, Dispatcher, WorkerMsg};
use crate::live::lifecycle::{wait_for_ready, Lifecycle, LifecycleState};
use crate::live::stream::LiveSelect;
use crate::live::subscription::Subscription;
use crate::live::triggers::{LiveUpdate, SubscriptionId, Trigger};
use crate::reader::{EventSink, ReplicationReader};

/// Live query engine over one connection and one replication stream.
pub struct LiveEngine {
    cfg: LiveConfig,
    lifecycle: Lifecycle,
    connection: Arc<dyn SqlConnection>,
    reader: Arc<dyn ReplicationReader>,
    worker_tx: Sender<WorkerMsg>,
    stopped: Arc<AtomicBool>,
    dropped_updates: Arc<AtomicU64>,
    processed_events: Arc<AtomicU64>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveEngine")
            .field("cfg", &self.cfg)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl LiveEngine {
    /// Connect, start the replication reader and spawn the dispatch worker.
    ///
    /// Returns once the engine is `Initializing`; call [`LiveEngine::wait_ready`]
    /// to complete the readiness handshake. A connection failure is fatal and
    /// nothing is started.
    pub fn connect(
        cfg: LiveConfig,
        connection: Arc<dyn SqlConnection>,
        reader: Arc<dyn ReplicationReader>,
    ) -> LiveResult<Self> {
        cfg.validate()?;
        let lifecycle = Lifecycle::new();

        info!(host = %cfg.host, port = cfg.port, server_id = cfg.server_id, "connecting");
        if let Err(err) = connection.connect() {
            warn!(error = %err, "connection failed");
            lifecycle.transition(LifecycleState::Stopped)?;
            return Err(err.into());
        }

        let (worker_tx, worker_rx) = bounded::<WorkerMsg>(cfg.queue_capacity.max(1));
        let stopped = Arc::new(AtomicBool::new(false));
        let dropped_updates = Arc::new(AtomicU64::new(0));
        let processed_events = Arc::new(AtomicU64::new(0));

        let dispatcher = Dispatcher::new(
            cfg.server_id,
            cfg.initial_load,
            Arc::clone(&connection),
            Arc::clone(&reader),
            Arc::clone(&processed_events),
        );

        if let Err(err) = reader.start(&dispatcher.reader_config(), EventSink::new(worker_tx.clone())) {
            warn!(error = %err, "replication reader failed to start");
            connection.destroy();
            lifecycle.transition(LifecycleState::Stopped)?;
            return Err(err);
        }

        let thread_stopped = Arc::clone(&stopped);
        let join = match thread::Builder::new()
            .name("livesql-dispatch".to_string())
            .spawn(move || worker_loop(dispatcher, worker_rx, thread_stopped))
        {
            Ok(join) => join,
            Err(err) => {
                reader.stop();
                connection.destroy();
                lifecycle.transition(LifecycleState::Stopped)?;
                return Err(LiveError::internal(format!("failed to spawn dispatch worker: {err}")));
            }
        };

        lifecycle.transition(LifecycleState::Initializing)?;
        debug!("replication reader started");

        Ok(Self {
            cfg,
            lifecycle,
            connection,
            reader,
            worker_tx,
            stopped,
            dropped_updates,
            processed_events,
            join: Mutex::new(Some(join)),
        })
    }

    /// Connect and run the readiness handshake, reporting its outcome to
    /// `on_ready` exactly once.
    ///
    /// A connection or startup failure is handed to `on_ready` and also
    /// returned as `Err`. An initialization timeout is only handed to
    /// `on_ready`: the engine is returned with the reader still running, so
    /// the caller can keep waiting or `end()` it.
    pub fn open<F>(
        cfg: LiveConfig,
        connection: Arc<dyn SqlConnection>,
        reader: Arc<dyn ReplicationReader>,
        on_ready: F,
    ) -> LiveResult<Self>
    where
        F: FnOnce(LiveResult<()>),
    {
        let engine = match Self::connect(cfg, connection, reader) {
            Ok(engine) => engine,
            Err(err) => {
                on_ready(Err(err.clone()));
                return Err(err);
            }
        };
        on_ready(engine.wait_ready());
        Ok(engine)
    }

    /// Wait for the replication reader to report ready.
    ///
    /// Polls every `init_poll_interval_ms` for at most `init_timeout_ms`. On
    /// timeout the reader keeps running and the engine stays `Initializing`.
    /// Once readiness has been observed, later calls return `Ok` immediately.
    pub fn wait_ready(&self) -> LiveResult<()> {
        match self.lifecycle.ensure_running()? {
            LifecycleState::Ready | LifecycleState::Paused => return Ok(()),
            _ => {}
        }

        match wait_for_ready(
            || self.reader.is_ready(),
            self.cfg.init_timeout(),
            self.cfg.init_poll_interval(),
        ) {
            Ok(elapsed) => {
                if self.lifecycle.mark_ready()? {
                    info!(elapsed_ms = duration_ms(elapsed), "replication reader ready");
                }
                Ok(())
            }
            Err(err) => {
                warn!(timeout_ms = self.cfg.init_timeout_ms, "replication reader not ready in time");
                Err(err)
            }
        }
    }

    /// Register a live select.
    ///
    /// Validation happens before anything is touched: an empty trigger list,
    /// a blank table or a trigger with no resolvable database fails without
    /// registering the query or widening the schema filter. When this returns,
    /// the filter covers the new triggers and every later event sees the
    /// subscription.
    pub fn select(&self, query: impl Into<String>, triggers: Vec<Trigger>) -> LiveResult<LiveSelect> {
        self.lifecycle.ensure_running()?;

        if triggers.is_empty() {
            return Err(ValidationError::MissingField {
                field: "triggers".to_string(),
            }
            .into());
        }
        let resolved = triggers
            .iter()
            .map(|t| t.resolve(self.cfg.database.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;

        let query = query.into();
        let id = SubscriptionId::new();
        let rows = Arc::new(RwLock::new(Vec::new()));
        let (update_tx, update_rx) = bounded::<LiveUpdate>(self.cfg.stream_capacity.max(1));

        let subscription = Subscription::new(
            id,
            query.clone(),
            resolved,
            Arc::clone(&rows),
            update_tx,
            Arc::clone(&self.dropped_updates),
        );
        let handle = LiveSelect::new(id, query, triggers, rows, update_rx);

        self.request(|reply| WorkerMsg::Register { subscription, reply })?;
        Ok(handle)
    }

    /// Stop reacting to changes without stopping the replication stream.
    pub fn pause(&self) -> LiveResult<()> {
        self.lifecycle.check_control(LifecycleState::Paused)?;
        self.request(|reply| WorkerMsg::Pause { reply })?;
        self.lifecycle.transition(LifecycleState::Paused)?;
        Ok(())
    }

    /// Restore the schema filter and re-execute every live select.
    pub fn resume(&self) -> LiveResult<()> {
        self.lifecycle.check_control(LifecycleState::Ready)?;
        self.request(|reply| WorkerMsg::Resume { reply })?;
        self.lifecycle.transition(LifecycleState::Ready)?;
        Ok(())
    }

    /// Wait until every event queued before this call has been dispatched.
    pub fn flush(&self) -> LiveResult<()> {
        self.lifecycle.ensure_running()?;
        self.request(|reply| WorkerMsg::Flush { reply })
    }

    /// Stop the reader and destroy the connection.
    ///
    /// Shutdown is abrupt: a query already running on the dispatch worker is
    /// not awaited and may still deliver one last update. Calling `end` again
    /// is a no-op.
    pub fn end(&self) -> LiveResult<()> {
        if self.lifecycle.state() == LifecycleState::Stopped {
            return Ok(());
        }
        let from = self.lifecycle.transition(LifecycleState::Stopped)?;

        self.stopped.store(true, Ordering::Release);
        self.reader.stop();
        self.connection.destroy();

        // Wake the worker if it is idle; a full queue means it is busy and
        // will observe `stopped` before its next message.
        let _ = self.worker_tx.try_send(WorkerMsg::Flush { reply: bounded(1).0 });

        if let Some(handle) = self.join.lock().unwrap_or_else(PoisonError::into_inner).take() {
            // Detach: the worker may still be inside a query.
            drop(handle);
        }

        info!(from = %from, "live engine stopped");
        Ok(())
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn config(&self) -> &LiveConfig {
        &self.cfg
    }

    /// Updates not delivered because a handle was full or dropped.
    #[must_use]
    pub fn dropped_updates(&self) -> u64 {
        self.dropped_updates.load(Ordering::Relaxed)
    }

    /// Row events fanned out to at least the subscription list.
    #[must_use]
    pub fn processed_events(&self) -> u64 {
        self.processed_events.load(Ordering::Relaxed)
    }

    fn request(&self, build: impl FnOnce(Sender<LiveResult<()>>) -> WorkerMsg) -> LiveResult<()> {
        let (reply_tx, reply_rx) = bounded::<LiveResult<()>>(1);
        self.worker_tx
            .send(build(reply_tx))
            .map_err(|_| disconnected("dispatch_worker"))?;
        reply_rx.recv().map_err(|_| disconnected("dispatch_worker"))?
    }
}

impl Drop for LiveEngine {
    fn drop(&mut self) {
        let _ = self.end();
    }
}
