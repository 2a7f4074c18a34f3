//! Trigger and update types for live selects.
//!
//! Triggers are serializable (minus their optional row condition) so they can
//! be loaded from configuration alongside the query text.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::event::Row;

use super::diff::RowDiff;

/// Unique identifier for a subscription.
///
/// Query text is not an identity: several subscriptions may share it.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new random subscription id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

type ConditionFn = dyn Fn(&Row, Option<&Row>) -> bool + Send + Sync;

/// Row-level predicate narrowing a trigger.
///
/// Called with `(row, None)` for inserts and deletes and with
/// `(before, Some(after))` for updates.
#[derive(Clone)]
pub struct RowCondition(Arc<ConditionFn>);

impl RowCondition {
    #[allow(missing_docs)]
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Row, Option<&Row>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn accepts(&self, row: &Row, after: Option<&Row>) -> bool {
        (self.0)(row, after)
    }
}

impl std::fmt::Debug for RowCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RowCondition(..)")
    }
}

/// A table whose changes re-evaluate a live select.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub table: String,
    #[serde(skip)]
    pub condition: Option<RowCondition>,
}

impl Trigger {
    /// Trigger on `table` in the connection's default database.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            database: None,
            table: table.into(),
            condition: None,
        }
    }

    /// Trigger on `database`.`table`.
    #[must_use]
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            table: table.into(),
            condition: None,
        }
    }

    /// Only fire when `condition` accepts a changed row.
    #[must_use]
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Row, Option<&Row>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(RowCondition::new(condition));
        self
    }

    /// Pin the trigger to a concrete database.
    pub fn resolve(&self, default_database: Option<&str>) -> Result<ResolvedTrigger, ValidationError> {
        let table = self.table.trim();
        if table.is_empty() {
            return Err(ValidationError::EmptyTableName);
        }
        let database = self
            .database
            .as_deref()
            .or(default_database)
            .map(str::trim)
            .filter(|db| !db.is_empty())
            .ok_or_else(|| ValidationError::NoDatabaseSelected {
                table: table.to_string(),
            })?;

        Ok(ResolvedTrigger {
            database: database.to_string(),
            table: table.to_string(),
            condition: self.condition.clone(),
        })
    }
}

/// A trigger with its database filled in.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct ResolvedTrigger {
    pub database: String,
    pub table: String,
    pub condition: Option<RowCondition>,
}

/// Fresh rows for a subscription.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowsUpdate {
    pub subscription_id: SubscriptionId,
    pub timestamp: DateTime<Utc>,
    pub rows: Vec<Row>,
    pub diff: RowDiff,
}

/// Notification delivered to a `LiveSelect` handle.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveUpdate {
    /// The result set changed.
    Rows(RowsUpdate),
    /// Re-executing the query failed; the previous rows are retained.
    QueryFailed {
        subscription_id: SubscriptionId,
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl LiveUpdate {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        match self {
            Self::Rows(update) => update.subscription_id,
            Self::QueryFailed { subscription_id, .. } => *subscription_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_default_database() {
        let t = Trigger::table("players").resolve(Some("app")).unwrap();
        assert_eq!(t.database, "app");
        assert_eq!(t.table, "players");

        let t = Trigger::new("other", "players").resolve(Some("app")).unwrap();
        assert_eq!(t.database, "other");
    }

    #[test]
    fn resolve_requires_a_database() {
        let err = Trigger::table("players").resolve(None).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NoDatabaseSelected {
                table: "players".to_string()
            }
        );
    }

    #[test]
    fn resolve_rejects_blank_table() {
        let err = Trigger::new("app", "  ").resolve(None).unwrap_err();
        assert_eq!(err, ValidationError::EmptyTableName);
    }

    #[test]
    fn trigger_deserializes_without_database() {
        let t: Trigger = serde_json::from_str(r#"{"table":"t"}"#).unwrap();
        assert!(t.database.is_none());
        assert!(t.condition.is_none());
        assert_eq!(t.table, "t");
    }

    #[test]
    fn condition_survives_resolution() {
        let t = Trigger::table("t")
            .with_condition(|row, _| row.get("id").is_some())
            .resolve(Some("app"))
            .unwrap();
        let cond = t.condition.unwrap();
        let mut row = Row::new();
        assert!(!cond.accepts(&row, None));
        row.insert("id".to_string(), serde_json::json!(1));
        assert!(cond.accepts(&row, None));
    }
}
