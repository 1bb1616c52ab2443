//! Sparse row cache for the windowed view.
//!
//! Rows are keyed by absolute index and stamped with a generation. Any change
//! to the working set bumps the generation and empties the cache, so results
//! from fetches issued before the change can never land in the new view.
//!
//! Memory only shrinks through invalidation; there is no incremental
//! eviction. A session that scrolls an entire huge dataset without ever
//! mutating it will hold every fetched row.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::engine::RowValues;
use crate::viewport::RowWindow;

/// A fetch the caller should issue: `limit` rows from `start`, tagged with
/// the generation the result must match to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub start: usize,
    pub limit: usize,
    pub generation: u64,
}

#[derive(Default)]
pub struct RowWindowCache {
    rows: HashMap<usize, RowValues>,
    in_flight: HashSet<(usize, usize)>,
    generation: u64,
}

impl RowWindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn lookup(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(&index)
    }

    pub fn cached_len(&self) -> usize {
        self.rows.len()
    }

    /// Decide whether `window` needs a fetch.
    ///
    /// Returns `None` when the window is empty, every row in it is already
    /// cached, or an identical `(start, end)` fetch is still in flight.
    /// Otherwise marks the range in flight and returns the ticket. Distinct
    /// overlapping ranges are allowed to proceed; merges are idempotent.
    pub fn ensure_range(&mut self, window: &RowWindow) -> Option<FetchTicket> {
        if window.is_empty() {
            return None;
        }
        let key = (window.start, window.end);
        if self.in_flight.contains(&key) {
            return None;
        }
        if (window.start..window.end).all(|idx| self.rows.contains_key(&idx)) {
            return None;
        }
        self.in_flight.insert(key);
        Some(FetchTicket {
            start: window.start,
            limit: window.len(),
            generation: self.generation,
        })
    }

    /// Merge a completed fetch. Results stamped with an old generation are
    /// dropped without touching the cache; a later fetch against the current
    /// working set will cover the range.
    pub fn on_fetch_complete(
        &mut self,
        start: usize,
        limit: usize,
        rows: Vec<RowValues>,
        generation: u64,
    ) {
        if generation != self.generation {
            debug!(
                "dropping stale fetch result for rows {}..{} (generation {} != {})",
                start,
                start + limit,
                generation,
                self.generation
            );
            return;
        }
        if rows.is_empty() && limit > 0 {
            // Engine reports rows in this range but returns none. Retrying
            // would loop, so the in-flight marker stays put: the range stays
            // a hole until the next invalidation.
            warn!(
                "engine returned no rows for populated range {}..{}, not retrying",
                start,
                start + limit
            );
            return;
        }
        self.in_flight.remove(&(start, start + limit));
        for (offset, row) in rows.into_iter().enumerate() {
            self.rows.insert(start + offset, row);
        }
    }

    /// Record a failed fetch: clear the in-flight marker so a later scroll
    /// can retry, and leave the hole.
    pub fn on_fetch_failed(&mut self, start: usize, limit: usize, generation: u64) {
        if generation != self.generation {
            return;
        }
        self.in_flight.remove(&(start, start + limit));
        warn!("fetch failed for rows {}..{}", start, start + limit);
    }

    /// Drop every cached row and in-flight marker and bump the generation.
    /// Called synchronously whenever the working set changes.
    pub fn invalidate_all(&mut self) {
        self.rows.clear();
        self.in_flight.clear();
        self.generation += 1;
    }
}
