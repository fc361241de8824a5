//! Projection of a metric table into per-period chart samples.

use crate::formatting::ValueStyle;
use crate::model::{CellValue, MetricRecord, MetricTable};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("invalid series selection for '{key}': {reason}")]
    InvalidSelection { key: String, reason: String },
}

/// Which record feeds a series.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SeriesSelector {
    Index { index: usize },
    Name { name: String },
}

impl SeriesSelector {
    /// `Name` matches the first record whose name contains the given text.
    fn resolve<'a>(&self, table: &'a MetricTable) -> Option<&'a MetricRecord> {
        match self {
            Self::Index { index } => table.record(*index),
            Self::Name { name } => table.find(name).or_else(|| {
                table
                    .records()
                    .iter()
                    .find(|record| record.name.contains(name.as_str()))
            }),
        }
    }

    fn describe(&self, table: &MetricTable) -> String {
        match self {
            Self::Index { index } => format!(
                "row {index} is out of range for a table of {} metrics",
                table.len()
            ),
            Self::Name { name } => format!("no metric name contains '{name}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeriesSpec {
    pub key: String,
    #[serde(flatten)]
    pub selector: SeriesSelector,
}

impl SeriesSpec {
    pub fn by_index(key: impl Into<String>, index: usize) -> Self {
        Self {
            key: key.into(),
            selector: SeriesSelector::Index { index },
        }
    }

    pub fn by_name(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            selector: SeriesSelector::Name { name: name.into() },
        }
    }

    /// Parses `key=2` (row index) or `key=~ROIC` (name match).
    pub fn parse(input: &str) -> Result<Self, ProjectionError> {
        let invalid = |reason: &str| ProjectionError::InvalidSelection {
            key: input.to_string(),
            reason: reason.to_string(),
        };
        let (key, target) = input
            .split_once('=')
            .ok_or_else(|| invalid("expected KEY=INDEX or KEY=~NAME"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid("series key is empty"));
        }
        let target = target.trim();
        if let Some(name) = target.strip_prefix('~') {
            if name.is_empty() {
                return Err(invalid("metric name is empty"));
            }
            return Ok(Self::by_name(key, name));
        }
        let index = target
            .parse::<usize>()
            .map_err(|_| invalid("row index must be a non-negative integer"))?;
        Ok(Self::by_index(key, index))
    }

    /// Resolves the record this series reads from.
    pub fn resolve<'a>(
        &self,
        table: &'a MetricTable,
    ) -> Result<&'a MetricRecord, ProjectionError> {
        self.selector
            .resolve(table)
            .ok_or_else(|| ProjectionError::InvalidSelection {
                key: self.key.clone(),
                reason: self.selector.describe(table),
            })
    }

    /// Value axis the series belongs on. Unresolvable selections default to currency.
    pub fn axis(&self, table: &MetricTable) -> Axis {
        self.selector
            .resolve(table)
            .map_or(Axis::Currency, |record| Axis::for_metric(&record.name))
    }
}

/// The chart carries two independent value axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Currency,
    Percent,
}

impl Axis {
    pub fn for_metric(name: &str) -> Self {
        match ValueStyle::classify(name) {
            ValueStyle::Percent => Self::Percent,
            ValueStyle::Currency => Self::Currency,
        }
    }
}

/// One projected sample: the value of every selected series at `period`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub period: String,
    pub values: Vec<(String, f64)>,
}

impl SeriesPoint {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }
}

impl Serialize for SeriesPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("period", &self.period)?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Rows 0, 1 and 2 as `revenue`, `nopbt` and `roic`.
pub fn default_series() -> Vec<SeriesSpec> {
    vec![
        SeriesSpec::by_index("revenue", 0),
        SeriesSpec::by_index("nopbt", 1),
        SeriesSpec::by_index("roic", 2),
    ]
}

/// Projects `table` into one point per period of its first record.
///
/// Percentage metrics are scaled by 100 so the chart axis reads in percent.
/// Cells that are missing or non-numeric are left out of their point.
pub fn project(
    table: &MetricTable,
    series: &[SeriesSpec],
) -> Result<Vec<SeriesPoint>, ProjectionError> {
    if table.is_empty() {
        return Ok(Vec::new());
    }

    let selected = series
        .iter()
        .map(|spec| {
            let record = spec.resolve(table)?;
            let scale = match ValueStyle::classify(&record.name) {
                ValueStyle::Percent => 100.0,
                ValueStyle::Currency => 1.0,
            };
            Ok((spec.key.as_str(), record, scale))
        })
        .collect::<Result<Vec<_>, ProjectionError>>()?;

    let points = table
        .periods()
        .into_iter()
        .map(|period| {
            let values = selected
                .iter()
                .filter_map(|(key, record, scale)| {
                    record
                        .value(period)
                        .and_then(CellValue::as_number)
                        .map(|value| ((*key).to_string(), value * scale))
                })
                .collect();
            SeriesPoint {
                period: period.to_string(),
                values,
            }
        })
        .collect();

    Ok(points)
}
