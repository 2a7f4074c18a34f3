//! Live select subsystem.
//!
//! A live select is a query re-executed whenever a replicated row change
//! touches one of its trigger tables. Subscriptions, the schema filter and the
//! event fan-out all live on a single dispatch worker; callers hold
//! `LiveSelect` handles that receive row updates.

/// Positional diffing of result sets.
pub mod diff;
/// Subscription list, per-event dedup and the dispatch worker.
pub mod dispatcher;
/// Connection lifecycle state machine and readiness handshake.
pub mod lifecycle;
/// Trigger matching logic.
pub mod matcher;
/// Schema filter registry.
pub mod schema;
/// Caller-side subscription handle.
pub mod stream;
/// Worker-side subscription state.
pub mod subscription;
/// Trigger and update type definitions.
pub mod triggers;

pub use diff::{DiffEntry, RowDiff};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use schema::SchemaFilter;
pub use stream::LiveSelect;
pub use subscription::Subscription;
pub use triggers::{LiveUpdate, ResolvedTrigger, RowCondition, RowsUpdate, SubscriptionId, Trigger};
