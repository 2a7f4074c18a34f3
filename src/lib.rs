//! # livesql - Live SQL query results from the MySQL binlog
//!
//! livesql keeps query results current by watching a database's replication
//! stream. A caller registers a query together with the tables that should
//! trigger it; whenever a replicated row change touches one of those tables,
//! the query is re-executed and the fresh rows are delivered to the caller.
//!
//! ## Core Concepts
//!
//! - **Trigger**: a `(database, table)` pair a live select listens to
//! - **Live select**: a query plus its triggers and its last known rows
//! - **Schema filter**: the union of all triggers, pushed to the replication reader
//! - **Dispatch**: per change event, matching live selects re-run their query,
//!   sharing one execution among selects with identical query text
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use livesql::{LiveConfig, LiveEngine, LiveUpdate, Trigger};
//!
//! let cfg = LiveConfig::new("localhost", "root")
//!     .with_database("app")
//!     .with_server_id(126);
//!
//! let engine = LiveEngine::connect(cfg, connection, reader)?;
//! engine.wait_ready()?;
//!
//! let players = engine.select("SELECT * FROM players ORDER BY score DESC", vec![Trigger::table("players")])?;
//! while let Ok(LiveUpdate::Rows(update)) = players.recv() {
//!     println!("{} rows", update.rows.len());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod live;
pub mod memory;
pub mod reader;

// Re-export primary types at crate root for convenience
pub use config::LiveConfig;
pub use driver::SqlConnection;
pub use engine::LiveEngine;
pub use error::{ConnectionError, ExecutionError, LiveError, LiveResult, ValidationError};
pub use event::{ChangeEvent, EventName, Row, RowChange, RowEvent};
pub use live::{
    DiffEntry, DispatchOutcome, LifecycleState, LiveSelect, LiveUpdate, RowCondition, RowDiff,
    RowsUpdate, SubscriptionId, Trigger,
};
pub use memory::{MemoryConnection, MemoryReader};
pub use reader::{EventSink, IncludeSchema, ReaderConfig, ReplicationReader};
