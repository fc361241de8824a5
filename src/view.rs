//! Sorting and column visibility layered over a metric table snapshot.
//!
//! None of this touches the snapshot itself: views hand out borrowed rows in
//! display order.

use crate::model::{CellValue, MetricRecord, MetricTable};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnKey {
    Name,
    Period(String),
}

impl From<&str> for ColumnKey {
    /// `name` (any case) is the name column; every other label is a period.
    fn from(label: &str) -> Self {
        let trimmed = label.trim();
        if trimmed.eq_ignore_ascii_case("name") {
            Self::Name
        } else {
            Self::Period(trimmed.to_string())
        }
    }
}

impl FromStr for ColumnKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => f.write_str("name"),
            Self::Period(period) => f.write_str(period),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub const fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    pub const fn arrow(self) -> &'static str {
        match self {
            Self::Ascending => "^",
            Self::Descending => "v",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortState {
    pub column: ColumnKey,
    pub direction: SortDirection,
}

impl SortState {
    pub const fn new(column: ColumnKey, direction: SortDirection) -> Self {
        Self { column, direction }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnVisibility {
    hidden: FxHashSet<ColumnKey>,
}

impl ColumnVisibility {
    /// Hides a column. The name column always stays visible.
    pub fn hide(&mut self, column: ColumnKey) {
        if column != ColumnKey::Name {
            self.hidden.insert(column);
        }
    }

    pub fn set(&mut self, column: ColumnKey, visible: bool) {
        if visible {
            self.hidden.remove(&column);
        } else {
            self.hide(column);
        }
    }

    pub fn is_visible(&self, column: &ColumnKey) -> bool {
        !self.hidden.contains(column)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableView {
    pub sort: Option<SortState>,
    pub visibility: ColumnVisibility,
}

impl TableView {
    /// Sorts by `column`, flipping direction if it is already the sort column.
    pub fn toggle_sort(&mut self, column: ColumnKey) {
        self.sort = Some(match self.sort.take() {
            Some(state) if state.column == column => {
                SortState::new(column, state.direction.reversed())
            }
            _ => SortState::new(column, SortDirection::Ascending),
        });
    }

    /// Records in display order. The sort is stable, so ties keep source order.
    pub fn rows<'a>(&self, table: &'a MetricTable) -> Vec<&'a MetricRecord> {
        let mut rows: Vec<&MetricRecord> = table.records().iter().collect();
        if let Some(sort) = &self.sort {
            rows.sort_by(|a, b| {
                let ord = compare_by(a, b, &sort.column);
                match sort.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }
        rows
    }

    pub fn visible_periods<'a>(&self, table: &'a MetricTable) -> Vec<&'a str> {
        table
            .periods()
            .into_iter()
            .filter(|period| {
                self.visibility
                    .is_visible(&ColumnKey::Period((*period).to_string()))
            })
            .collect()
    }

    pub fn sort_marker(&self, column: &ColumnKey) -> Option<&'static str> {
        self.sort
            .as_ref()
            .filter(|state| &state.column == column)
            .map(|state| state.direction.arrow())
    }
}

fn compare_by(a: &MetricRecord, b: &MetricRecord, column: &ColumnKey) -> Ordering {
    match column {
        ColumnKey::Name => a.name.cmp(&b.name),
        ColumnKey::Period(period) => compare_cells(a.value(period), b.value(period)),
    }
}

/// Numbers first by `total_cmp`, then text, then missing cells.
fn compare_cells(a: Option<&CellValue>, b: Option<&CellValue>) -> Ordering {
    const fn rank(cell: Option<&CellValue>) -> u8 {
        match cell {
            Some(CellValue::Number(_)) => 0,
            Some(CellValue::Text(_)) => 1,
            None => 2,
        }
    }
    match (a, b) {
        (Some(CellValue::Number(x)), Some(CellValue::Number(y))) => x.total_cmp(y),
        (Some(CellValue::Text(x)), Some(CellValue::Text(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
