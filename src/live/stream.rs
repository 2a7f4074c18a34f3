use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::config::duration_ms;
use crate::error::{disconnected, ExecutionError, LiveError, LiveResult};
use crate::event::Row;

use super::triggers::{LiveUpdate, SubscriptionId, Trigger};

/// Caller-side handle for a live select.
///
/// Updates arrive in the order the dispatch worker produced them. Dropping
/// the handle detaches delivery; the subscription itself stays registered.
#[derive(Debug)]
pub struct LiveSelect {
    id: SubscriptionId,
    query: String,
    triggers: Vec<Trigger>,
    rows: Arc<RwLock<Vec<Row>>>,
    rx: Receiver<LiveUpdate>,
}

impl LiveSelect {
    pub(crate) fn new(
        id: SubscriptionId,
        query: String,
        triggers: Vec<Trigger>,
        rows: Arc<RwLock<Vec<Row>>>,
        rx: Receiver<LiveUpdate>,
    ) -> Self {
        Self {
            id,
            query,
            triggers,
            rows,
            rx,
        }
    }

    /// The subscription id backing this handle.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Triggers as given to `select`.
    #[must_use]
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Snapshot of the last known rows.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Receive the next update (blocking).
    pub fn recv(&self) -> LiveResult<LiveUpdate> {
        self.rx.recv().map_err(|_| disconnected("live_select"))
    }

    /// Receive the next update with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> LiveResult<LiveUpdate> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => LiveError::Execution(ExecutionError::Timeout {
                duration_ms: duration_ms(timeout),
            }),
            RecvTimeoutError::Disconnected => disconnected("live_select"),
        })
    }

    /// Receive a pending update without waiting.
    pub fn try_recv(&self) -> LiveResult<Option<LiveUpdate>> {
        match self.rx.try_recv() {
            Ok(update) => Ok(Some(update)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected("live_select")),
        }
    }
}
