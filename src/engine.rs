//! The contract with the tabular query engine.
//!
//! The engine owns the data and all query execution; this crate only
//! orchestrates. The trait methods are synchronous: the [`EngineBridge`]
//! worker runs them off the control thread and posts replies back as events.
//!
//! [`EngineBridge`]: crate::bridge::EngineBridge

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::filter::FilterNode;

/// A single cell. Numbers travel as f64 regardless of source width; anything
/// non-numeric is text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Null,
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Numeric view of the cell, parsing text when it holds a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Null => None,
        }
    }
}

/// One fetched row, keyed by column name.
pub type RowValues = BTreeMap<String, CellValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    Count,
    Sum,
    Mean,
    Min,
    Max,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }

    pub fn iterator() -> impl Iterator<Item = Aggregation> {
        [
            Aggregation::Count,
            Aggregation::Sum,
            Aggregation::Mean,
            Aggregation::Min,
            Aggregation::Max,
        ]
        .iter()
        .copied()
    }
}

/// An active group-by: the key column and how the remaining columns collapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingSpec {
    pub column: String,
    pub aggregation: Aggregation,
}

/// What the engine remembers of a prior session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub file_path: Option<PathBuf>,
    pub row_count: usize,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping: Option<GroupingSpec>,
}

/// The engine contract.
///
/// Mutating calls that reshape the working set return the new row count so
/// the caller can clamp its viewport without a second round trip. The
/// exception is [`apply_group_by`], which reshapes columns as well; callers
/// follow it with [`columns`] and [`row_count`].
///
/// [`apply_group_by`]: TableEngine::apply_group_by
/// [`columns`]: TableEngine::columns
/// [`row_count`]: TableEngine::row_count
pub trait TableEngine: Send {
    /// Open a dataset, replacing any previous one. Returns the row count.
    fn load(&mut self, path: &Path) -> Result<usize>;

    /// Column names of the current working set, in display order.
    fn columns(&self) -> Result<Vec<String>>;

    /// Row count of the current working set.
    fn row_count(&self) -> Result<usize>;

    /// Fetch `limit` rows starting at `offset`. Returns fewer rows only at
    /// the end of the working set; past the end returns an empty vec.
    fn rows(&self, offset: usize, limit: usize) -> Result<Vec<RowValues>>;

    /// Sort by `column`, or clear sorting when `None`. Returns the row count
    /// (unchanged by sorting, returned for uniformity with the other
    /// mutations).
    fn apply_sort(&mut self, column: Option<&str>, descending: bool) -> Result<usize>;

    /// Substring quick filter over `column`, or over every column when
    /// `None`. An empty query clears filtering. Returns the new row count.
    fn apply_filter(&mut self, column: Option<&str>, query: &str) -> Result<usize>;

    /// Structured filter. Returns the new row count.
    fn apply_advanced_filter(&mut self, tree: &FilterNode) -> Result<usize>;

    /// Collapse the working set to one row per distinct value of `column`.
    fn apply_group_by(&mut self, column: &str, aggregation: Aggregation) -> Result<()>;

    /// Drop grouping and return to row-level data. Returns the new row count.
    fn reset_grouping(&mut self) -> Result<usize>;

    /// Snapshot of the engine's current session, if it has one.
    fn current_state(&self) -> Result<Option<SessionSnapshot>>;
}

/// Why a column list was requested; the reply is handled differently per
/// purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnsPurpose {
    AfterLoad,
    AfterGrouping,
    AfterGroupingReset,
}

/// A working-set mutation, named so replies can be attributed.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Sort {
        column: Option<String>,
        descending: bool,
    },
    QuickFilter {
        column: Option<String>,
        query: String,
    },
    AdvancedFilter {
        tree: FilterNode,
    },
    ResetGrouping,
}

/// Work items sent to the engine worker.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineRequest {
    Load(PathBuf),
    Columns {
        purpose: ColumnsPurpose,
        epoch: u64,
    },
    RowCount {
        epoch: u64,
    },
    Rows {
        start: usize,
        limit: usize,
        generation: u64,
    },
    Mutate {
        mutation: Mutation,
        epoch: u64,
    },
    GroupBy {
        column: String,
        aggregation: Aggregation,
        epoch: u64,
    },
    Snapshot,
}

/// Replies posted back into the application event channel. Errors cross as
/// strings; the worker formats them before they leave the engine thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReply {
    Loaded {
        path: PathBuf,
        result: Result<usize, String>,
    },
    Columns {
        purpose: ColumnsPurpose,
        epoch: u64,
        result: Result<Vec<String>, String>,
    },
    RowCount {
        epoch: u64,
        result: Result<usize, String>,
    },
    Rows {
        start: usize,
        limit: usize,
        generation: u64,
        result: Result<Vec<RowValues>, String>,
    },
    MutationApplied {
        mutation: Mutation,
        epoch: u64,
        result: Result<usize, String>,
    },
    Grouped {
        spec: GroupingSpec,
        epoch: u64,
        result: Result<(), String>,
    },
    Snapshot {
        result: Result<Option<SessionSnapshot>, String>,
    },
}
