//! Schema filter registry.
//!
//! Tracks the union of every registered trigger as a database → tables map.
//! The map only grows: subscriptions are never unregistered, so their tables
//! stay watched for the life of the engine.

use crate::reader::{IncludeSchema, ReaderConfig};

/// Watched tables, keyed by database.
#[derive(Debug, Clone, Default)]
pub struct SchemaFilter {
    tables: IncludeSchema,
}

impl SchemaFilter {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `database`.`table`. Returns true if the filter grew.
    pub fn add_trigger(&mut self, database: &str, table: &str) -> bool {
        let tables = self.tables.entry(database.to_string()).or_default();
        if tables.iter().any(|t| t == table) {
            return false;
        }
        tables.push(table.to_string());
        true
    }

    /// Filter used while running.
    #[must_use]
    pub const fn active_filter(&self) -> &IncludeSchema {
        &self.tables
    }

    /// Filter used while paused: nothing is watched.
    #[must_use]
    pub fn paused_filter(&self) -> IncludeSchema {
        IncludeSchema::new()
    }

    /// Reader configuration for the current filter.
    #[must_use]
    pub fn reader_config(&self, server_id: u32, paused: bool) -> ReaderConfig {
        let schema = if paused {
            self.paused_filter()
        } else {
            self.tables.clone()
        };
        ReaderConfig::new(server_id, schema)
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn contains(&self, database: &str, table: &str) -> bool {
        self.tables
            .get(database)
            .is_some_and(|tables| tables.iter().any(|t| t == table))
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
