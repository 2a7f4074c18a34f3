//! Worker-side state of a registered live select.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use crossbeam_channel::{Sender, TrySendError};
use tracing::debug;

use crate::driver::SqlConnection;
use crate::error::LiveResult;
use crate::event::{Row, RowEvent};

use super::diff::RowDiff;
use super::matcher::any_trigger_matches;
use super::triggers::{LiveUpdate, ResolvedTrigger, RowsUpdate, SubscriptionId};

/// A registered query, its triggers and its last known rows.
///
/// The cached rows are shared with the caller's `LiveSelect` handle; only the
/// dispatch worker writes them.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    query: String,
    triggers: Vec<ResolvedTrigger>,
    rows: Arc<RwLock<Vec<Row>>>,
    tx: Sender<LiveUpdate>,
    dropped_updates: Arc<AtomicU64>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        query: String,
        triggers: Vec<ResolvedTrigger>,
        rows: Arc<RwLock<Vec<Row>>>,
        tx: Sender<LiveUpdate>,
        dropped_updates: Arc<AtomicU64>,
    ) -> Self {
        Self {
            id,
            query,
            triggers,
            rows,
            tx,
            dropped_updates,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn triggers(&self) -> &[ResolvedTrigger] {
        &self.triggers
    }

    /// Whether `event` touches any of this subscription's triggers.
    #[must_use]
    pub fn match_row_event(&self, event: &RowEvent) -> bool {
        any_trigger_matches(&self.triggers, event)
    }

    /// Re-execute the query and replace the cached rows.
    ///
    /// On failure the cached rows are left untouched and the handle receives
    /// a `QueryFailed` notice.
    pub fn update(&self, connection: &dyn SqlConnection) -> LiveResult<Vec<Row>> {
        match connection.query(&self.query) {
            Ok(rows) => {
                self.set_rows(rows.clone());
                Ok(rows)
            }
            Err(err) => {
                self.deliver(LiveUpdate::QueryFailed {
                    subscription_id: self.id,
                    timestamp: Utc::now(),
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Replace the cached rows without running the query.
    ///
    /// The handle is notified only when the rows actually changed.
    pub fn set_rows(&self, rows: Vec<Row>) {
        let diff = {
            let mut cached = self.rows.write().unwrap_or_else(PoisonError::into_inner);
            let diff = RowDiff::between(&cached, &rows);
            cached.clone_from(&rows);
            diff
        };

        if diff.is_empty() {
            return;
        }

        self.deliver(LiveUpdate::Rows(RowsUpdate {
            subscription_id: self.id,
            timestamp: Utc::now(),
            rows,
            diff,
        }));
    }

    /// Snapshot of the cached rows.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // Never block the worker on a slow or detached handle.
    fn deliver(&self, update: LiveUpdate) {
        match self.tx.try_send(update) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped_updates.fetch_add(1, Ordering::Relaxed);
                debug!(subscription_id = %self.id, "live update dropped");
            }
        }
    }
}
