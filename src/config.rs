//! Report configuration: built-in defaults, an optional YAML file, then CLI
//! overrides, in that order.

use crate::chart::{ChartOptions, MAX_CHART_SIDE};
use crate::projector::{SeriesSpec, default_series};
use crate::view::{ColumnKey, SortDirection, SortState, TableView};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "metricboard.yaml";
pub const DEFAULT_SHEET_NAME: &str = "Metrics";
const MAX_SHEET_NAME_LEN: usize = 31;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SortConfig {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub series: Vec<SeriesSpec>,
    pub sort: Option<SortConfig>,
    pub hidden_columns: Vec<String>,
    pub chart: ChartOptions,
    pub spreadsheet_sheet: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            series: default_series(),
            sort: None,
            hidden_columns: Vec::new(),
            chart: ChartOptions::default(),
            spreadsheet_sheet: DEFAULT_SHEET_NAME.to_string(),
        }
    }
}

/// Values from the command line that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub sort: Option<String>,
    pub descending: bool,
    pub hide: Vec<String>,
    pub series: Vec<SeriesSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Defaults,
    File(PathBuf),
}

impl ReportConfig {
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sides = 1..=MAX_CHART_SIDE;
        if !sides.contains(&self.chart.width) || !sides.contains(&self.chart.height) {
            return Err(ConfigError::Invalid(format!(
                "chart size must be 1-{MAX_CHART_SIDE} pixels per side, got {}x{}",
                self.chart.width, self.chart.height
            )));
        }
        let sheet = self.spreadsheet_sheet.trim();
        if sheet.is_empty() || sheet.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "spreadsheet sheet name must be 1-{MAX_SHEET_NAME_LEN} characters"
            )));
        }
        if let Some(key) = duplicate_key(&self.series) {
            return Err(ConfigError::Invalid(format!(
                "series key '{key}' is used more than once"
            )));
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: Overrides) -> Result<(), ConfigError> {
        if let Some(column) = overrides.sort {
            self.sort = Some(SortConfig {
                column,
                descending: overrides.descending,
            });
        } else if overrides.descending {
            if let Some(sort) = self.sort.as_mut() {
                sort.descending = true;
            }
        }
        self.hidden_columns.extend(overrides.hide);
        if !overrides.series.is_empty() {
            self.series = overrides.series;
        }
        self.validate()
    }

    pub fn table_view(&self) -> TableView {
        let mut view = TableView::default();
        if let Some(sort) = &self.sort {
            let direction = if sort.descending {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            view.sort = Some(SortState::new(
                ColumnKey::from(sort.column.as_str()),
                direction,
            ));
        }
        for column in &self.hidden_columns {
            view.visibility.set(ColumnKey::from(column.as_str()), false);
        }
        view
    }
}

fn duplicate_key(series: &[SeriesSpec]) -> Option<&str> {
    series.iter().enumerate().find_map(|(idx, spec)| {
        series[..idx]
            .iter()
            .any(|earlier| earlier.key == spec.key)
            .then_some(spec.key.as_str())
    })
}

/// Reads the explicit config file, or `metricboard.yaml` when it exists.
pub async fn load_config(
    explicit: Option<&Path>,
) -> Result<(ReportConfig, ConfigSource), ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_PATH);
            if !tokio::fs::try_exists(&fallback).await.unwrap_or(false) {
                log::debug!("no config file found; using built-in defaults");
                return Ok((ReportConfig::default(), ConfigSource::Defaults));
            }
            fallback
        }
    };

    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
    let config = ReportConfig::from_yaml(&text, &path)?;
    log::debug!("loaded config from {}", path.display());
    Ok((config, ConfigSource::File(path)))
}
