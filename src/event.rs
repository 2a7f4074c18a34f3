//! Decoded replication events.
//!
//! The binlog parser is an external collaborator; these are the structured
//! records it hands to the engine. Only row events are ever dispatched to
//! subscriptions. Table-map events exist so a reader can forward them without
//! the engine having to special-case the wire format.

use serde::{Deserialize, Serialize};

/// A result or change row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Binlog event names understood by the reader configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
    TableMap,
    WriteRows,
    UpdateRows,
    DeleteRows,
}

impl EventName {
    /// Every event the engine asks the reader to decode.
    pub const ALL: [Self; 4] = [
        Self::TableMap,
        Self::WriteRows,
        Self::UpdateRows,
        Self::DeleteRows,
    ];

    /// Wire name used in reader configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TableMap => "tablemap",
            Self::WriteRows => "writerows",
            Self::UpdateRows => "updaterows",
            Self::DeleteRows => "deleterows",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One changed row inside a row event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RowChange {
    Inserted { row: Row },
    Updated { before: Row, after: Row },
    Deleted { row: Row },
}

impl RowChange {
    /// The row image a trigger condition sees first, and the post-image for updates.
    #[must_use]
    pub fn images(&self) -> (&Row, Option<&Row>) {
        match self {
            Self::Inserted { row } | Self::Deleted { row } => (row, None),
            Self::Updated { before, after } => (before, Some(after)),
        }
    }
}

/// Row mutations against a single table.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowEvent {
    pub database: String,
    pub table: String,
    pub rows: Vec<RowChange>,
}

impl RowEvent {
    /// Event name implied by the contained changes.
    ///
    /// A binlog row event never mixes kinds, so the first change decides.
    /// An empty event reports `writerows`.
    #[must_use]
    pub fn name(&self) -> EventName {
        match self.rows.first() {
            Some(RowChange::Updated { .. }) => EventName::UpdateRows,
            Some(RowChange::Deleted { .. }) => EventName::DeleteRows,
            Some(RowChange::Inserted { .. }) | None => EventName::WriteRows,
        }
    }

    /// Whether this event touches `database`.`table`.
    #[must_use]
    pub fn touches(&self, database: &str, table: &str) -> bool {
        self.database == database && self.table == table
    }
}

/// A decoded replication event.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// Table definition; feeds the parser's own schema cache only.
    TableMap { database: String, table: String },
    /// Row insert/update/delete.
    Rows(RowEvent),
}

impl ChangeEvent {
    #[allow(missing_docs)]
    #[must_use]
    pub fn table_map(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self::TableMap {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Rows inserted into `database`.`table`.
    #[must_use]
    pub fn write_rows(database: impl Into<String>, table: impl Into<String>, rows: Vec<Row>) -> Self {
        Self::Rows(RowEvent {
            database: database.into(),
            table: table.into(),
            rows: rows.into_iter().map(|row| RowChange::Inserted { row }).collect(),
        })
    }

    /// Rows updated in `database`.`table`, as `(before, after)` pairs.
    #[must_use]
    pub fn update_rows(
        database: impl Into<String>,
        table: impl Into<String>,
        rows: Vec<(Row, Row)>,
    ) -> Self {
        Self::Rows(RowEvent {
            database: database.into(),
            table: table.into(),
            rows: rows
                .into_iter()
                .map(|(before, after)| RowChange::Updated { before, after })
                .collect(),
        })
    }

    /// Rows deleted from `database`.`table`.
    #[must_use]
    pub fn delete_rows(database: impl Into<String>, table: impl Into<String>, rows: Vec<Row>) -> Self {
        Self::Rows(RowEvent {
            database: database.into(),
            table: table.into(),
            rows: rows.into_iter().map(|row| RowChange::Deleted { row }).collect(),
        })
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn name(&self) -> EventName {
        match self {
            Self::TableMap { .. } => EventName::TableMap,
            Self::Rows(ev) => ev.name(),
        }
    }

    /// `(database, table)` the event refers to.
    #[must_use]
    pub fn table(&self) -> (&str, &str) {
        match self {
            Self::TableMap { database, table } => (database.as_str(), table.as_str()),
            Self::Rows(ev) => (ev.database.as_str(), ev.table.as_str()),
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_row_event(&self) -> Option<&RowEvent> {
        match self {
            Self::TableMap { .. } => None,
            Self::Rows(ev) => Some(ev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: serde_json::Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn event_names_match_reader_wire_names() {
        let names: Vec<String> = EventName::ALL
            .iter()
            .map(|n| serde_json::to_value(n).unwrap().as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["tablemap", "writerows", "updaterows", "deleterows"]);
        for n in EventName::ALL {
            assert_eq!(serde_json::to_value(n).unwrap(), json!(n.as_str()));
        }
    }

    #[test]
    fn row_event_name_follows_change_kind() {
        let ev = ChangeEvent::update_rows("app", "t", vec![(row(json!({"id": 1})), row(json!({"id": 2})))]);
        assert_eq!(ev.name(), EventName::UpdateRows);
        assert_eq!(ev.table(), ("app", "t"));

        let ev = ChangeEvent::delete_rows("app", "t", vec![row(json!({"id": 1}))]);
        assert_eq!(ev.name(), EventName::DeleteRows);

        assert_eq!(ChangeEvent::table_map("app", "t").name(), EventName::TableMap);
        assert!(ChangeEvent::table_map("app", "t").as_row_event().is_none());
    }

    #[test]
    fn update_images_expose_before_and_after() {
        let change = RowChange::Updated {
            before: row(json!({"score": 1})),
            after: row(json!({"score": 2})),
        };
        let (before, after) = change.images();
        assert_eq!(before["score"], json!(1));
        assert_eq!(after.unwrap()["score"], json!(2));
    }
}
