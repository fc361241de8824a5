use crate::model::{CellValue, MetricRecord, MetricTable, PeriodValues};
use rustc_hash::FxHashSet;
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

const NAME_FIELD: &str = "name";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),
    #[error("record {row} has no 'name' field")]
    MissingName { row: usize },
    #[error("expected an array of metric objects, found {0}")]
    UnexpectedShape(&'static str),
    #[error("metric '{0}' appears more than once")]
    DuplicateName(String),
    #[error("CSV header must start with a 'name' column")]
    MissingNameColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Csv,
}

impl InputFormat {
    /// Picks the format from the file extension; anything but `.csv` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }
}

pub async fn load_table(path: &Path) -> Result<MetricTable, LoadError> {
    let bytes = if path.as_os_str() == "-" {
        read_stdin().await?
    } else {
        tokio::fs::read(path).await.map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?
    };
    let table = parse_table(&bytes, InputFormat::from_path(path))?;
    log::info!(
        "loaded {} metrics across {} periods from {}",
        table.len(),
        table.periods().len(),
        path.display()
    );
    if !table.is_rectangular() {
        log::warn!(
            "{} is not rectangular; some metrics are missing periods of the first record",
            path.display()
        );
    }
    Ok(table)
}

async fn read_stdin() -> Result<Vec<u8>, LoadError> {
    use tokio::io::AsyncReadExt;

    let mut buffer = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut buffer)
        .await
        .map_err(|source| LoadError::Io {
            path: "<stdin>".to_string(),
            source,
        })?;
    Ok(buffer)
}

pub fn parse_table(bytes: &[u8], format: InputFormat) -> Result<MetricTable, LoadError> {
    let records = match format {
        InputFormat::Json => parse_json_records(bytes)?,
        InputFormat::Csv => parse_csv_records(bytes)?,
    };
    ensure_unique_names(&records)?;
    Ok(MetricTable::new(records))
}

fn parse_json_records(bytes: &[u8]) -> Result<Vec<MetricRecord>, LoadError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let items = match value {
        Value::Array(items) => items,
        other => return Err(LoadError::UnexpectedShape(json_kind(&other))),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(row, item)| {
            let fields = match item {
                Value::Object(fields) => fields,
                other => return Err(LoadError::UnexpectedShape(json_kind(&other))),
            };
            let mut name = None;
            let mut values = PeriodValues::new();
            for (key, field) in fields {
                if key == NAME_FIELD {
                    name = field.as_str().map(str::to_string);
                    continue;
                }
                match field {
                    Value::Number(number) => {
                        if let Some(v) = number.as_f64() {
                            values.insert(key, v);
                        }
                    }
                    Value::String(text) => values.insert(key, CellValue::Text(text)),
                    Value::Null => {}
                    other => values.insert(key, CellValue::Text(other.to_string())),
                }
            }
            let name = name.ok_or(LoadError::MissingName { row })?;
            Ok(MetricRecord::new(name, values))
        })
        .collect()
}

fn parse_csv_records<R: Read>(reader: R) -> Result<Vec<MetricRecord>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.get(0) != Some(NAME_FIELD) {
        return Err(LoadError::MissingNameColumn);
    }

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let row_data = result?;
        let name = row_data
            .get(0)
            .filter(|name| !name.is_empty())
            .ok_or(LoadError::MissingName { row })?;
        let mut values = PeriodValues::new();
        for (period, cell) in headers.iter().zip(row_data.iter()).skip(1) {
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(number) => values.insert(period, number),
                Err(_) => values.insert(period, cell),
            }
        }
        records.push(MetricRecord::new(name, values));
    }
    Ok(records)
}

fn ensure_unique_names(records: &[MetricRecord]) -> Result<(), LoadError> {
    let mut seen = FxHashSet::default();
    for record in records {
        if !seen.insert(record.name.as_str()) {
            return Err(LoadError::DuplicateName(record.name.clone()));
        }
    }
    Ok(())
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_period_order() {
        let input = br#"[
            {"name": "Revenue", "2019": 3.0, "2017": 1169.09, "2018": 2.0},
            {"name": "ROIC", "2019": 0.1, "2017": 0.542, "2018": 0.2}
        ]"#;
        let table = parse_table(input, InputFormat::Json).unwrap();
        assert_eq!(table.periods(), vec!["2019", "2017", "2018"]);
        assert_eq!(
            table.find("Revenue").and_then(|r| r.value("2017")),
            Some(&CellValue::Number(1169.09))
        );
    }

    #[test]
    fn json_name_position_does_not_matter() {
        let input = br#"[{"2017": 1.0, "name": "Revenue", "2018": "n/a"}]"#;
        let table = parse_table(input, InputFormat::Json).unwrap();
        let record = table.record(0).unwrap();
        assert_eq!(record.name, "Revenue");
        assert_eq!(record.value("2018"), Some(&CellValue::Text("n/a".into())));
    }

    #[test]
    fn json_rejects_non_array_and_missing_names() {
        assert!(matches!(
            parse_table(br#"{"name": "x"}"#, InputFormat::Json),
            Err(LoadError::UnexpectedShape("an object"))
        ));
        assert!(matches!(
            parse_table(br#"[{"2017": 1.0}]"#, InputFormat::Json),
            Err(LoadError::MissingName { row: 0 })
        ));
    }

    #[test]
    fn rejects_duplicate_names() {
        let input = br#"[{"name": "ROIC", "2017": 1.0}, {"name": "ROIC", "2017": 2.0}]"#;
        assert!(matches!(
            parse_table(input, InputFormat::Json),
            Err(LoadError::DuplicateName(name)) if name == "ROIC"
        ));
    }

    #[test]
    fn csv_parses_numbers_and_text() {
        let input = b"name,2017,2018\nRevenue,1169.09,1254.73\nNOPBT (DEFAULT),-26.74,\nNote,n/a,1\n";
        let table = parse_table(input, InputFormat::Csv).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.periods(), vec!["2017", "2018"]);
        let nopbt = table.find("NOPBT (DEFAULT)").unwrap();
        assert_eq!(nopbt.value("2017"), Some(&CellValue::Number(-26.74)));
        assert!(nopbt.value("2018").is_none());
        assert!(!table.is_rectangular());
        assert_eq!(
            table.find("Note").and_then(|r| r.value("2017")),
            Some(&CellValue::Text("n/a".into()))
        );
    }

    #[test]
    fn csv_requires_name_column() {
        assert!(matches!(
            parse_table(b"metric,2017\nRevenue,1\n", InputFormat::Csv),
            Err(LoadError::MissingNameColumn)
        ));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(InputFormat::from_path(Path::new("a/b.CSV")), InputFormat::Csv);
        assert_eq!(InputFormat::from_path(Path::new("a/b.json")), InputFormat::Json);
        assert_eq!(InputFormat::from_path(Path::new("-")), InputFormat::Json);
    }
}
