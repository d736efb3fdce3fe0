// ********* Input data structures ***********

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Marks a column request as "every column starting with this label".
pub const WILDCARD: char = '*';

/// Suffix of the header label holding the explicit percentage of a column.
///
/// For a value column `Project Allocation 1`, the percentage lives in
/// `Project Allocation 1 %`.
pub const PERCENT_SUFFIX: &str = " %";

/// Label of the leading column when a theme table is provided.
pub const THEME_LABEL: &str = "Theme";

/// Number of rows at the top of a theme table that are not data.
pub const THEME_HEADER_ROWS: usize = 2;

/// A single cell, as read from a table.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    /// Empty cells and whitespace-only text are blank. Numbers never are.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Reads the cell as a fraction.
    ///
    /// Numbers are taken as they are. Text is trimmed, and a trailing `%`
    /// divides the value by 100 (`"80%"` is 0.8).
    pub fn as_fraction(&self) -> Option<f64> {
        match self {
            Cell::Number(x) => Some(*x),
            Cell::Text(s) => {
                let s = s.trim();
                match s.strip_suffix('%') {
                    Some(pct) => pct.trim().parse::<f64>().ok().map(|x| x / 100.0),
                    None => s.parse::<f64>().ok(),
                }
            }
            Cell::Empty => None,
        }
    }

    /// The text used to match this cell against lookup keys.
    pub fn key(&self) -> String {
        match self {
            Cell::Text(s) => s.trim().to_string(),
            c => c.to_string(),
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Number(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Cell {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Cell {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s)
        }
    }
}

impl From<f64> for Cell {
    fn from(x: f64) -> Cell {
        Cell::Number(x)
    }
}

/// A table: a header row and the data rows below it.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Splits raw rows into a header (the first row) and data rows.
    /// An empty input gives an empty table.
    pub fn from_rows(raw: Vec<Vec<Cell>>) -> Table {
        let mut iter = raw.into_iter();
        let header = iter
            .next()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default();
        Table {
            header,
            rows: iter.collect(),
        }
    }
}

/// A requested column label.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct ColumnSpec {
    pub label: String,
    pub wildcard: bool,
}

impl ColumnSpec {
    /// Parses `"Project Allocation*"` into a wildcard request for
    /// `Project Allocation`, and `"User"` into an exact request.
    pub fn parse(s: &str) -> ColumnSpec {
        let trimmed = s.trim();
        match trimmed.strip_suffix(WILDCARD) {
            Some(prefix) => ColumnSpec {
                label: prefix.trim().to_string(),
                wildcard: true,
            },
            None => ColumnSpec {
                label: trimmed.to_string(),
                wildcard: false,
            },
        }
    }
}

/// The position of a value column, and of its percentage column if any.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct Slot {
    pub value_index: usize,
    pub percent_index: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ResolvedColumn {
    pub label: String,
    pub slots: Vec<Slot>,
}

impl ResolvedColumn {
    /// Repeated columns carry a ratio in the output.
    pub fn is_repeated(&self) -> bool {
        self.slots.len() > 1
    }
}

/// The slot picked for one column group. `ordinal` is the position of the
/// slot in its group.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct SlotChoice {
    pub ordinal: usize,
    pub slot: Slot,
}

/// One slot choice per requested column, in request order.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Action {
    pub choices: Vec<SlotChoice>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ThemeRow {
    pub project_name: String,
    pub theme_name: String,
}

/// Maps project names to themes. The first matching row wins.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ThemeTable {
    pub rows: Vec<ThemeRow>,
}

impl ThemeTable {
    /// Builds the table from raw rows, skipping the header rows at the top.
    /// Rows without a project name are ignored.
    pub fn from_rows(raw: &[Vec<Cell>]) -> ThemeTable {
        let rows = raw
            .iter()
            .skip(THEME_HEADER_ROWS)
            .filter_map(|r| {
                let project_name = r.first().map(|c| c.key()).unwrap_or_default();
                if project_name.is_empty() {
                    return None;
                }
                let theme_name = r.get(1).map(|c| c.key()).unwrap_or_default();
                Some(ThemeRow {
                    project_name,
                    theme_name,
                })
            })
            .collect();
        ThemeTable { rows }
    }

    pub fn lookup(&self, project_name: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.project_name == project_name)
            .map(|r| r.theme_name.as_str())
    }
}

// ******** Output data structures *********

pub type OutputRow = Vec<Cell>;

/// Errors that prevent the normalization from completing.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AllocationError {
    #[snafu(display(
        "line {lineno} ({row_id}): explicit percentages for {label:?} add up to {total:.2}, more than 100%"
    ))]
    OverAllocation {
        lineno: usize,
        row_id: String,
        label: String,
        total: f64,
    },
    #[snafu(display(
        "line {lineno} ({row_id}): cannot read {content:?} in column {column} as a percentage"
    ))]
    InvalidPercentage {
        lineno: usize,
        row_id: String,
        column: usize,
        content: String,
    },
}

// ********* Cross-tab configuration **********

/// The block of the raw table that feeds a cross-tab view.
/// Rows and columns are 0-based, the end bounds are exclusive.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SourceRange {
    #[serde(rename = "tableName")]
    pub table_name: String,
    #[serde(rename = "startRow")]
    pub start_row: usize,
    #[serde(rename = "endRow")]
    pub end_row: usize,
    #[serde(rename = "startColumn")]
    pub start_column: usize,
    #[serde(rename = "endColumn")]
    pub end_column: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    #[serde(rename = "sourceColumn")]
    pub source_column: usize,
    pub label: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Summarize {
    #[serde(rename = "SUM")]
    Sum,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ValueSpec {
    #[serde(rename = "sourceColumn")]
    pub source_column: usize,
    pub label: String,
    pub summarize: Summarize,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CrossTabConfig {
    pub source: SourceRange,
    pub rows: Vec<Dimension>,
    pub columns: Vec<Dimension>,
    pub values: Vec<ValueSpec>,
}

/// The evaluated content of a cross-tab view.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CrossTabSummary {
    #[serde(rename = "rowKeys")]
    pub row_keys: Vec<Vec<String>>,
    #[serde(rename = "columnKeys")]
    pub column_keys: Vec<String>,
    /// One line per row key, one entry per column key.
    pub values: Vec<Vec<f64>>,
    #[serde(rename = "rowTotals")]
    pub row_totals: Vec<f64>,
    #[serde(rename = "grandTotal")]
    pub grand_total: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Failures reported by a cross-tab service.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServiceError {
    /// The backing service hit a limit or a transient internal failure.
    #[snafu(display("service limit reached: {message}"))]
    LimitReached { message: String },
    #[snafu(display("{source}"))]
    Backend {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CrossTabError {
    #[snafu(display("quota exceeded while retrieving view {view:?}: {message}"))]
    QuotaExceeded { view: String, message: String },
    #[snafu(display("{source}"))]
    Service { source: ServiceError },
}
