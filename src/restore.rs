//! Seeding a new session from an engine snapshot.
//!
//! Restoration is deliberately partial: dataset identity (path, row count,
//! columns) and any active grouping come back, while sort order and filters
//! always start cleared. The view lands on the same dataset shape the user
//! left, with a clean slate of query refinements.

use crate::engine::SessionSnapshot;
use crate::QueryState;

/// Apply a snapshot to a fresh query state.
pub fn apply_snapshot(state: &mut QueryState, snapshot: &SessionSnapshot) {
    state.file_path = snapshot.file_path.clone();
    state.row_count = snapshot.row_count;
    state.columns = snapshot.columns.clone();
    state.grouping = snapshot.grouping.clone();
    // Sort and filters are never carried across sessions.
    state.sort = None;
    state.filter = crate::FilterState::None;
}
