//! SQL driver boundary.

use crate::error::{ConnectionError, LiveResult};
use crate::event::Row;

/// A single database connection used to (re-)execute live queries.
///
/// Queries are issued one at a time from the dispatch worker.
pub trait SqlConnection: Send + Sync {
    /// Establish the connection.
    fn connect(&self) -> Result<(), ConnectionError>;

    /// Execute `sql` and return its rows in result order.
    fn query(&self, sql: &str) -> LiveResult<Vec<Row>>;

    /// Close the connection immediately, abandoning in-flight work.
    fn destroy(&self);
}
