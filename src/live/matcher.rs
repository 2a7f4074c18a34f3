//! Trigger matching against row events.

use crate::event::RowEvent;

use super::triggers::ResolvedTrigger;

/// Whether `trigger` is affected by `event`.
///
/// The event must touch the trigger's exact `(database, table)`. When the
/// trigger carries a row condition, at least one changed row must satisfy it.
#[must_use]
pub fn trigger_matches(trigger: &ResolvedTrigger, event: &RowEvent) -> bool {
    if !event.touches(&trigger.database, &trigger.table) {
        return false;
    }

    let Some(condition) = &trigger.condition else {
        return true;
    };

    event.rows.iter().any(|change| {
        let (row, after) = change.images();
        condition.accepts(row, after)
    })
}

/// Whether any of `triggers` is affected by `event`.
#[must_use]
pub fn any_trigger_matches(triggers: &[ResolvedTrigger], event: &RowEvent) -> bool {
    triggers.iter().any(|t| trigger_matches(t, event))
}
