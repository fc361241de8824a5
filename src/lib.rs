//! Financial metric tables: formatting, chart series projection, and
//! spreadsheet/chart exports.

pub mod chart;
pub mod config;
pub mod export;
pub mod formatting;
pub mod loader;
pub mod model;
pub mod projector;
pub mod view;

pub use model::{CellValue, MetricRecord, MetricTable, PeriodValues};
pub use projector::{ProjectionError, SeriesPoint, SeriesSpec, project};
