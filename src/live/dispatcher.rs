//! Dispatch worker.
//!
//! This module owns the subscription list and the schema filter and fans
//! decoded change events out to subscriptions. Everything arrives on one
//! bounded queue (events from the reader, control messages from the engine),
//! so events, registrations and pause/resume are applied strictly in arrival
//! order and two events' passes never interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::driver::SqlConnection;
use crate::error::LiveResult;
use crate::event::{ChangeEvent, Row};
use crate::reader::{ReaderConfig, ReplicationReader};

use super::schema::SchemaFilter;
use super::subscription::Subscription;

#[derive(Debug)]
pub(crate) enum WorkerMsg {
    Event(ChangeEvent),
    Register {
        subscription: Subscription,
        reply: Sender<LiveResult<()>>,
    },
    Pause {
        reply: Sender<LiveResult<()>>,
    },
    Resume {
        reply: Sender<LiveResult<()>>,
    },
    Flush {
        reply: Sender<LiveResult<()>>,
    },
}

/// Work done for one change event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Subscriptions whose triggers matched.
    pub matched: usize,
    /// Queries executed against the connection.
    pub executed: usize,
    /// Matches served from the per-event result cache.
    pub reused: usize,
    /// Executions that failed.
    pub failed: usize,
}

/// Subscription list, schema filter and the event fan-out algorithm.
pub struct Dispatcher {
    server_id: u32,
    initial_load: bool,
    paused: bool,
    // Set when the reader may be behind the registry after a failed push.
    filter_stale: bool,
    schema: SchemaFilter,
    subscriptions: Vec<Subscription>,
    connection: Arc<dyn SqlConnection>,
    reader: Arc<dyn ReplicationReader>,
    processed_events: Arc<AtomicU64>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("server_id", &self.server_id)
            .field("paused", &self.paused)
            .field("schema", &self.schema)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub(crate) fn new(
        server_id: u32,
        initial_load: bool,
        connection: Arc<dyn SqlConnection>,
        reader: Arc<dyn ReplicationReader>,
        processed_events: Arc<AtomicU64>,
    ) -> Self {
        Self {
            server_id,
            initial_load,
            paused: false,
            filter_stale: false,
            schema: SchemaFilter::new(),
            subscriptions: Vec::new(),
            connection,
            reader,
            processed_events,
        }
    }

    /// Reader configuration for the current filter and pause state.
    #[must_use]
    pub fn reader_config(&self) -> ReaderConfig {
        self.schema.reader_config(self.server_id, self.paused)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn schema(&self) -> &SchemaFilter {
        &self.schema
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Add a subscription after widening the schema filter to cover it.
    ///
    /// The filter is pushed to the reader before the subscription can see any
    /// event. If the push fails the subscription is not registered; the tables
    /// it added stay in the registry and the next registration pushes again,
    /// even when it adds nothing new.
    pub fn register(&mut self, subscription: Subscription) -> LiveResult<()> {
        let mut grew = false;
        for trigger in subscription.triggers() {
            grew |= self.schema.add_trigger(&trigger.database, &trigger.table);
        }

        if (grew || self.filter_stale) && !self.paused {
            self.push_active_filter()?;
            debug!(schema = ?self.schema.active_filter(), "schema filter widened");
        }

        if self.initial_load {
            if let Err(err) = subscription.update(self.connection.as_ref()) {
                warn!(subscription_id = %subscription.id(), error = %err, "initial load failed");
            }
        }

        info!(
            subscription_id = %subscription.id(),
            triggers = subscription.triggers().len(),
            "live select registered"
        );
        self.subscriptions.push(subscription);
        Ok(())
    }

    /// Fan one change event out to the subscriptions, in registration order.
    ///
    /// Within the event, each distinct query text runs at most once: later
    /// matching subscriptions with the same text reuse the rows. A failed
    /// execution is not cached, so the next subscription with that text tries
    /// again.
    pub fn dispatch(&mut self, event: &ChangeEvent) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let Some(row_event) = event.as_row_event() else {
            return outcome;
        };
        if self.subscriptions.is_empty() || self.paused {
            return outcome;
        }
        self.processed_events.fetch_add(1, Ordering::Relaxed);

        let mut event_results: HashMap<&str, Vec<Row>> = HashMap::new();
        for subscription in &self.subscriptions {
            if !subscription.match_row_event(row_event) {
                continue;
            }
            outcome.matched += 1;

            if let Some(rows) = event_results.get(subscription.query()) {
                subscription.set_rows(rows.clone());
                outcome.reused += 1;
                continue;
            }

            match subscription.update(self.connection.as_ref()) {
                Ok(rows) => {
                    outcome.executed += 1;
                    event_results.insert(subscription.query(), rows);
                }
                Err(err) => {
                    outcome.failed += 1;
                    warn!(subscription_id = %subscription.id(), error = %err, "live select update failed");
                }
            }
        }

        debug!(
            database = %row_event.database,
            table = %row_event.table,
            event = %row_event.name(),
            matched = outcome.matched,
            executed = outcome.executed,
            reused = outcome.reused,
            failed = outcome.failed,
            "change event dispatched"
        );
        outcome
    }

    /// Swap the reader to the empty filter.
    ///
    /// If the reader rejects the filter the dispatcher stays unpaused.
    pub fn pause(&mut self) -> LiveResult<()> {
        self.reader.set(&self.schema.reader_config(self.server_id, true))?;
        self.paused = true;
        info!("live selects paused");
        Ok(())
    }

    /// Restore the active filter and refresh every subscription.
    ///
    /// Every subscription runs its own query; there is no dedup and no trigger
    /// check, and failures only affect the failing subscription. If the reader
    /// rejects the filter nothing is refreshed and the pause state is kept.
    pub fn resume(&mut self) -> LiveResult<()> {
        self.push_active_filter()?;
        self.paused = false;

        for subscription in &self.subscriptions {
            if let Err(err) = subscription.update(self.connection.as_ref()) {
                warn!(subscription_id = %subscription.id(), error = %err, "refresh on resume failed");
            }
        }
        info!(subscriptions = self.subscriptions.len(), "live selects resumed");
        Ok(())
    }

    fn push_active_filter(&mut self) -> LiveResult<()> {
        let config = self.schema.reader_config(self.server_id, false);
        if let Err(err) = self.reader.set(&config) {
            self.filter_stale = true;
            warn!(error = %err, "reader rejected schema filter");
            return Err(err);
        }
        self.filter_stale = false;
        Ok(())
    }

    fn handle(&mut self, msg: WorkerMsg) {
        match msg {
            WorkerMsg::Event(event) => {
                self.dispatch(&event);
            }
            WorkerMsg::Register { subscription, reply } => {
                let _ = reply.send(self.register(subscription));
            }
            WorkerMsg::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            WorkerMsg::Resume { reply } => {
                let _ = reply.send(self.resume());
            }
            WorkerMsg::Flush { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

/// Drain `rx` until every sender is gone or `stopped` is raised.
///
/// `stopped` is checked between messages only: a query in flight when the
/// engine ends runs to completion and may still deliver its rows.
pub(crate) fn worker_loop(mut dispatcher: Dispatcher, rx: Receiver<WorkerMsg>, stopped: Arc<AtomicBool>) {
    while let Ok(msg) = rx.recv() {
        if stopped.load(Ordering::Acquire) {
            break;
        }
        dispatcher.handle(msg);
    }
    debug!("dispatch worker exiting");
}
