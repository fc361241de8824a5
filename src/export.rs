//! File exports: the raw table as a spreadsheet or CSV, and the chart
//! surface as SVG or PNG.
//!
//! Callers treat every failure here as non-fatal: log it and move on.

use crate::chart::ChartSurface;
use crate::model::{CellValue, MetricTable};
use csv::Writer;
use flate2::Compression;
use flate2::write::GzEncoder;
use rust_xlsxwriter::{Format, Workbook};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::{fs, task};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("chart surface is not available; nothing has been rendered")]
    SurfaceUnavailable,
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("spreadsheet encoding failed: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("table has {0} columns, more than a worksheet can hold")]
    TooManyColumns(usize),
    #[error("chart rasterisation failed: {0}")]
    Raster(String),
}

/// Encodes the raw table as a single-sheet workbook: a header row of `name`
/// and period labels, then one row per metric with unformatted values.
pub fn spreadsheet_bytes(table: &MetricTable, sheet_name: &str) -> Result<Vec<u8>, ExportError> {
    let periods = table.periods();
    let column_count = periods.len() + 1;
    if u16::try_from(column_count).is_err() {
        return Err(ExportError::TooManyColumns(column_count));
    }

    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    worksheet.write_string_with_format(0, 0, "name", &header_format)?;
    for (col, period) in (1u16..).zip(&periods) {
        worksheet.write_string_with_format(0, col, *period, &header_format)?;
    }

    for (row, record) in (1u32..).zip(table.records()) {
        worksheet.write_string(row, 0, record.name.as_str())?;
        for (col, period) in (1u16..).zip(&periods) {
            match record.value(period) {
                Some(CellValue::Number(value)) if value.is_finite() => {
                    worksheet.write_number(row, col, *value)?;
                }
                Some(CellValue::Text(text)) => {
                    worksheet.write_string(row, col, text.as_str())?;
                }
                _ => {}
            }
        }
    }
    worksheet.set_freeze_panes(1, 1)?;

    Ok(workbook.save_to_buffer()?)
}

/// Same rows as the spreadsheet, as CSV.
pub fn csv_bytes(table: &MetricTable) -> Result<Vec<u8>, ExportError> {
    let periods = table.periods();
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(std::iter::once("name").chain(periods.iter().copied()))?;
    for record in table.records() {
        let mut row = Vec::with_capacity(periods.len() + 1);
        row.push(record.name.clone());
        for period in &periods {
            row.push(match record.value(period) {
                Some(CellValue::Number(value)) => value.to_string(),
                Some(CellValue::Text(text)) => text.clone(),
                None => String::new(),
            });
        }
        writer.write_record(&row)?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: PathBuf::from("<csv buffer>"),
        source,
    })?;
    writer
        .into_inner()
        .map_err(|err| ExportError::Csv(err.into_error().into()))
}

pub fn gzip(bytes: &[u8]) -> Result<Vec<u8>, ExportError> {
    let io_err = |source| ExportError::Io {
        path: PathBuf::from("<gzip buffer>"),
        source,
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes).map_err(io_err)?;
    encoder.finish().map_err(io_err)
}

/// `report.csv` -> `report.csv.gz`
pub fn archive_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

pub async fn write_output_file(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    fs::write(path, bytes).await.map_err(io_err)
}

pub async fn save_spreadsheet(
    table: &MetricTable,
    sheet_name: &str,
    path: &Path,
) -> Result<PathBuf, ExportError> {
    let bytes = spreadsheet_bytes(table, sheet_name)?;
    write_output_file(path, &bytes).await?;
    Ok(path.to_path_buf())
}

/// Writes the CSV, gzip-compressed to `<path>.gz` when `archive` is set.
pub async fn save_csv(
    table: &MetricTable,
    path: &Path,
    archive: bool,
) -> Result<PathBuf, ExportError> {
    let bytes = csv_bytes(table)?;
    if archive {
        let target = archive_path(path);
        write_output_file(&target, &gzip(&bytes)?).await?;
        Ok(target)
    } else {
        write_output_file(path, &bytes).await?;
        Ok(path.to_path_buf())
    }
}

pub async fn save_chart_png(
    surface: Option<&ChartSurface>,
    path: &Path,
) -> Result<PathBuf, ExportError> {
    let surface = surface.ok_or(ExportError::SurfaceUnavailable)?.clone();
    let bytes = task::spawn_blocking(move || surface.to_png())
        .await
        .map_err(|err| ExportError::Raster(format!("rasteriser task failed: {err}")))??;
    write_output_file(path, &bytes).await?;
    Ok(path.to_path_buf())
}

pub async fn save_chart_svg(
    surface: Option<&ChartSurface>,
    path: &Path,
) -> Result<PathBuf, ExportError> {
    let surface = surface.ok_or(ExportError::SurfaceUnavailable)?;
    write_output_file(path, surface.svg().as_bytes()).await?;
    Ok(path.to_path_buf())
}
