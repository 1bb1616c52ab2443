use std::cmp::Ordering;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use color_eyre::eyre::eyre;
use color_eyre::Result;

use tabscope::engine::{
    Aggregation, CellValue, GroupingSpec, RowValues, SessionSnapshot, TableEngine,
};
use tabscope::filter::{FilterCondition, FilterNode, FilterOperator, LogicalOperator};

/// An in-memory engine for end-to-end tests. Mirrors the remote engine's
/// contract: filters rebuild the working set from the original rows (dropping
/// any grouping), sorting reorders the working set in place, and row fetches
/// clamp to the working set's bounds.
pub struct MemoryEngine {
    datasets: HashMap<PathBuf, (Vec<String>, Vec<RowValues>)>,
    file_path: Option<PathBuf>,
    columns: Vec<String>,
    display_columns: Vec<String>,
    original: Vec<RowValues>,
    base: Vec<RowValues>,
    unsorted: Vec<RowValues>,
    display: Vec<RowValues>,
    sort_spec: Option<(String, bool)>,
    grouping: Option<GroupingSpec>,
    snapshot: Option<SessionSnapshot>,
    /// When set, every mutating query fails. Loads still succeed.
    pub fail_queries: bool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            datasets: HashMap::new(),
            file_path: None,
            columns: Vec::new(),
            display_columns: Vec::new(),
            original: Vec::new(),
            base: Vec::new(),
            unsorted: Vec::new(),
            display: Vec::new(),
            sort_spec: None,
            grouping: None,
            snapshot: None,
            fail_queries: false,
        }
    }

    /// Make a dataset loadable at `path`. Unregistered paths fail to load
    /// with a not-found error.
    pub fn register(&mut self, path: PathBuf, columns: Vec<String>, rows: Vec<RowValues>) {
        self.datasets.insert(path, (columns, rows));
    }

    /// Seed the prior-session snapshot returned by `current_state`.
    pub fn with_snapshot(mut self, snapshot: SessionSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.file_path.is_none() {
            return Err(eyre!("no dataset loaded"));
        }
        Ok(())
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail_queries {
            return Err(eyre!("injected query failure"));
        }
        Ok(())
    }

    fn resort(&mut self) {
        self.display = self.unsorted.clone();
        if let Some((column, descending)) = self.sort_spec.clone() {
            sort_rows(&mut self.display, &column, descending);
        }
    }

    fn rebuild_from_base(&mut self) {
        self.grouping = None;
        self.display_columns = self.columns.clone();
        self.unsorted = self.base.clone();
        self.resort();
    }

    fn column_is_numeric(&self, column: &str) -> bool {
        let mut saw_number = false;
        for row in &self.base {
            match row.get(column) {
                None | Some(CellValue::Null) => {}
                Some(cell) => {
                    if cell.as_number().is_none() {
                        return false;
                    }
                    saw_number = true;
                }
            }
        }
        saw_number
    }
}

impl TableEngine for MemoryEngine {
    fn load(&mut self, path: &Path) -> Result<usize> {
        let (columns, rows) = self
            .datasets
            .get(path)
            .ok_or_else(|| {
                color_eyre::eyre::Report::new(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no such dataset",
                ))
            })?
            .clone();
        self.file_path = Some(path.to_path_buf());
        self.columns = columns.clone();
        self.display_columns = columns;
        self.original = rows.clone();
        self.base = rows.clone();
        self.unsorted = rows.clone();
        self.display = rows;
        self.sort_spec = None;
        self.grouping = None;
        Ok(self.display.len())
    }

    fn columns(&self) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.display_columns.clone())
    }

    fn row_count(&self) -> Result<usize> {
        self.ensure_loaded()?;
        Ok(self.display.len())
    }

    fn rows(&self, offset: usize, limit: usize) -> Result<Vec<RowValues>> {
        self.ensure_loaded()?;
        if offset >= self.display.len() {
            return Ok(Vec::new());
        }
        let end = (offset + limit).min(self.display.len());
        Ok(self.display[offset..end].to_vec())
    }

    fn apply_sort(&mut self, column: Option<&str>, descending: bool) -> Result<usize> {
        self.check_failure()?;
        self.ensure_loaded()?;
        self.sort_spec = column.map(|c| (c.to_string(), descending));
        self.resort();
        Ok(self.display.len())
    }

    fn apply_filter(&mut self, column: Option<&str>, query: &str) -> Result<usize> {
        self.check_failure()?;
        self.ensure_loaded()?;
        if query.is_empty() {
            self.base = self.original.clone();
        } else {
            let needle = query.to_lowercase();
            self.base = self
                .original
                .iter()
                .filter(|row| quick_match(row, column, &needle))
                .cloned()
                .collect();
        }
        self.rebuild_from_base();
        Ok(self.display.len())
    }

    fn apply_advanced_filter(&mut self, tree: &FilterNode) -> Result<usize> {
        self.check_failure()?;
        self.ensure_loaded()?;
        self.base = self
            .original
            .iter()
            .filter(|row| eval_node(row, tree))
            .cloned()
            .collect();
        self.rebuild_from_base();
        Ok(self.display.len())
    }

    fn apply_group_by(&mut self, column: &str, aggregation: Aggregation) -> Result<()> {
        self.check_failure()?;
        self.ensure_loaded()?;

        let numeric: Vec<String> = match aggregation {
            Aggregation::Count => Vec::new(),
            _ => self
                .columns
                .iter()
                .filter(|c| c.as_str() != column && self.column_is_numeric(c))
                .cloned()
                .collect(),
        };

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&RowValues>> = HashMap::new();
        for row in &self.base {
            let key = row.get(column).map(cell_text).unwrap_or_default();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(row);
        }

        let mut out = Vec::new();
        for key in &order {
            let members = &groups[key];
            let mut row = RowValues::new();
            let key_cell = members[0].get(column).cloned().unwrap_or(CellValue::Null);
            row.insert(column.to_string(), key_cell);
            match aggregation {
                Aggregation::Count => {
                    row.insert(
                        "count".to_string(),
                        CellValue::Number(members.len() as f64),
                    );
                }
                _ => {
                    for col in &numeric {
                        row.insert(col.clone(), aggregate(members, col, aggregation));
                    }
                }
            }
            out.push(row);
        }

        self.display_columns = match aggregation {
            Aggregation::Count => vec![column.to_string(), "count".to_string()],
            _ => {
                let mut cols = vec![column.to_string()];
                cols.extend(numeric);
                cols
            }
        };
        self.grouping = Some(GroupingSpec {
            column: column.to_string(),
            aggregation,
        });
        self.unsorted = out;
        self.resort();
        Ok(())
    }

    fn reset_grouping(&mut self) -> Result<usize> {
        self.check_failure()?;
        self.ensure_loaded()?;
        self.rebuild_from_base();
        Ok(self.display.len())
    }

    fn current_state(&self) -> Result<Option<SessionSnapshot>> {
        Ok(self.snapshot.clone())
    }
}

fn cell_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Text(s) => s.clone(),
        CellValue::Number(n) => {
            if n.fract() == 0.0 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        CellValue::Null => String::new(),
    }
}

fn quick_match(row: &RowValues, column: Option<&str>, needle_lower: &str) -> bool {
    match column {
        Some(c) => row
            .get(c)
            .is_some_and(|cell| cell_text(cell).to_lowercase().contains(needle_lower)),
        None => row
            .values()
            .any(|cell| cell_text(cell).to_lowercase().contains(needle_lower)),
    }
}

fn eval_node(row: &RowValues, node: &FilterNode) -> bool {
    match node {
        FilterNode::Condition(cond) => eval_condition(row, cond),
        FilterNode::Group(group) => match group.logic {
            LogicalOperator::And => group.conditions.iter().all(|c| eval_node(row, c)),
            LogicalOperator::Or => group.conditions.iter().any(|c| eval_node(row, c)),
        },
    }
}

fn eval_condition(row: &RowValues, cond: &FilterCondition) -> bool {
    let cell = row.get(&cond.column);
    let is_null = cell.map_or(true, CellValue::is_null);
    match cond.operator {
        FilterOperator::IsNull => return is_null,
        FilterOperator::IsNotNull => return !is_null,
        _ => {}
    }
    if is_null {
        return false;
    }
    let cell = cell.unwrap();
    let text = cell_text(cell);
    let value = cond.value.as_deref().unwrap_or("");

    // Comparisons go numeric when both sides parse, string otherwise.
    let numeric = cell.as_number().zip(value.trim().parse::<f64>().ok());
    match cond.operator {
        FilterOperator::Contains => text.to_lowercase().contains(&value.to_lowercase()),
        FilterOperator::NotContains => !text.to_lowercase().contains(&value.to_lowercase()),
        FilterOperator::StartsWith => text.to_lowercase().starts_with(&value.to_lowercase()),
        FilterOperator::EndsWith => text.to_lowercase().ends_with(&value.to_lowercase()),
        FilterOperator::Equals => match numeric {
            Some((a, b)) => a == b,
            None => text == value,
        },
        FilterOperator::NotEquals => match numeric {
            Some((a, b)) => a != b,
            None => text != value,
        },
        FilterOperator::GreaterThan => match numeric {
            Some((a, b)) => a > b,
            None => text.as_str() > value,
        },
        FilterOperator::LessThan => match numeric {
            Some((a, b)) => a < b,
            None => text.as_str() < value,
        },
        FilterOperator::IsNull | FilterOperator::IsNotNull => unreachable!(),
    }
}

// Nulls sort last in ascending order.
fn sort_rows(rows: &mut [RowValues], column: &str, descending: bool) {
    rows.sort_by(|a, b| {
        let ord = compare_cells(a.get(column), b.get(column));
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

fn compare_cells(a: Option<&CellValue>, b: Option<&CellValue>) -> Ordering {
    let a_null = a.map_or(true, CellValue::is_null);
    let b_null = b.map_or(true, CellValue::is_null);
    match (a_null, b_null) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let (a, b) = (a.unwrap(), b.unwrap());
            match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => cell_text(a).cmp(&cell_text(b)),
            }
        }
    }
}

fn aggregate(rows: &[&RowValues], column: &str, aggregation: Aggregation) -> CellValue {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.get(column).and_then(CellValue::as_number))
        .collect();
    if values.is_empty() {
        return CellValue::Null;
    }
    let value = match aggregation {
        Aggregation::Count => values.len() as f64,
        Aggregation::Sum => values.iter().sum(),
        Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    CellValue::Number(value)
}

pub fn city_columns() -> Vec<String> {
    ["id", "city", "amount", "note"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

/// `n` rows cycling through five cities. `amount` repeats 0..100; `note` is
/// null on odd ids.
pub fn city_rows(n: usize) -> Vec<RowValues> {
    const CITIES: [&str; 5] = ["tokyo", "paris", "berlin", "lima", "oslo"];
    (0..n)
        .map(|i| {
            let mut row = RowValues::new();
            row.insert("id".to_string(), CellValue::Number(i as f64));
            row.insert(
                "city".to_string(),
                CellValue::Text(CITIES[i % CITIES.len()].to_string()),
            );
            row.insert("amount".to_string(), CellValue::Number((i % 100) as f64));
            row.insert(
                "note".to_string(),
                if i % 2 == 0 {
                    CellValue::Text(format!("n{}", i))
                } else {
                    CellValue::Null
                },
            );
            row
        })
        .collect()
}
