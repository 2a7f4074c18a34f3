//! Replication reader boundary.
//!
//! The binlog client that decodes row events lives outside this crate. The
//! engine drives it through `ReplicationReader` and receives decoded events
//! through the `EventSink` handed over in `start`.

use std::collections::BTreeMap;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::error::{disconnected, LiveResult};
use crate::event::{ChangeEvent, EventName};
use crate::live::dispatcher::WorkerMsg;

/// Database name to watched table names.
pub type IncludeSchema = BTreeMap<String, Vec<String>>;

/// Configuration pushed to the reader on start and on every reconfigure.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub server_id: u32,
    pub start_at_end: bool,
    pub include_events: Vec<EventName>,
    pub include_schema: IncludeSchema,
}

impl ReaderConfig {
    /// Tail the binlog from its current end, decoding table maps and row events
    /// for the tables in `include_schema` only.
    #[must_use]
    pub fn new(server_id: u32, include_schema: IncludeSchema) -> Self {
        Self {
            server_id,
            start_at_end: true,
            include_events: EventName::ALL.to_vec(),
            include_schema,
        }
    }

    /// Whether a reader honoring this config would emit events for the table.
    #[must_use]
    pub fn admits(&self, database: &str, table: &str) -> bool {
        self.include_schema
            .get(database)
            .is_some_and(|tables| tables.iter().any(|t| t == table))
    }
}

/// Source of decoded change events.
///
/// Implementations wrap a binlog client. `set` must apply the new filter
/// without restarting the stream.
pub trait ReplicationReader: Send + Sync {
    /// Start streaming; decoded events go to `sink` in binlog order.
    fn start(&self, config: &ReaderConfig, sink: EventSink) -> LiveResult<()>;

    /// Hot-reconfigure the running stream.
    fn set(&self, config: &ReaderConfig) -> LiveResult<()>;

    /// Stop streaming. Must not block on the engine.
    fn stop(&self);

    /// Whether the stream has finished its own handshake.
    fn is_ready(&self) -> bool;
}

/// Handle through which a reader delivers events to the dispatch worker.
///
/// Delivery blocks while the worker queue is full, so a slow subscriber set
/// applies backpressure to the binlog stream instead of losing events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<WorkerMsg>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<WorkerMsg>) -> Self {
        Self { tx }
    }

    /// Queue an event for dispatch.
    pub fn emit(&self, event: ChangeEvent) -> LiveResult<()> {
        self.tx
            .send(WorkerMsg::Event(event))
            .map_err(|_| disconnected("event_sink"))
    }
}
