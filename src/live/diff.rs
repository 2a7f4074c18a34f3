//! Positional row diffing.
//!
//! Result sets are compared index by index. A row that moves shows up as a
//! change at both positions; callers wanting keyed diffs can compute them from
//! `RowsUpdate::rows`.

use serde::Serialize;

use crate::event::Row;

/// One difference between the cached and the fresh result set.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiffEntry {
    Added { index: usize, row: Row },
    Changed { index: usize, old: Row, new: Row },
    Removed { index: usize, row: Row },
}

/// Differences between two result sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RowDiff {
    entries: Vec<DiffEntry>,
}

impl RowDiff {
    /// Compare `old` with `new`. Removals are listed from the tail inward.
    #[must_use]
    pub fn between(old: &[Row], new: &[Row]) -> Self {
        let mut entries = Vec::new();

        for (index, row) in new.iter().enumerate() {
            match old.get(index) {
                None => entries.push(DiffEntry::Added {
                    index,
                    row: row.clone(),
                }),
                Some(prev) if prev != row => entries.push(DiffEntry::Changed {
                    index,
                    old: prev.clone(),
                    new: row.clone(),
                }),
                Some(_) => {}
            }
        }

        for index in (new.len()..old.len()).rev() {
            entries.push(DiffEntry::Removed {
                index,
                row: old[index].clone(),
            });
        }

        Self { entries }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }
}
