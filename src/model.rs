use rustc_hash::FxHashMap;
use serde::{Serialize, Serializer};

/// A single table cell. Numeric cells are the norm; text cells survive loading
/// so they can be passed through the formatter untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(value) => serializer.serialize_f64(*value),
            Self::Text(text) => serializer.serialize_str(text),
        }
    }
}

/// Period label to value pairs, kept in source column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodValues {
    entries: Vec<(String, CellValue)>,
}

impl PeriodValues {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends a value, replacing an earlier value for the same period in place.
    pub fn insert(&mut self, period: impl Into<String>, value: impl Into<CellValue>) {
        let period = period.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == period) {
            slot.1 = value;
        } else {
            self.entries.push((period, value));
        }
    }

    pub fn get(&self, period: &str) -> Option<&CellValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == period)
            .map(|(_, value)| value)
    }

    pub fn periods(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for PeriodValues
where
    K: Into<String>,
    V: Into<CellValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (period, value) in iter {
            values.insert(period, value);
        }
        values
    }
}

/// One financial line item tracked across periods.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub name: String,
    pub values: PeriodValues,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, values: PeriodValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn value(&self, period: &str) -> Option<&CellValue> {
        self.values.get(period)
    }
}

impl Serialize for MetricRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("name", &self.name)?;
        for (period, value) in self.values.iter() {
            map.serialize_entry(period, value)?;
        }
        map.end()
    }
}

/// Immutable point-in-time view of the metric table.
///
/// A new snapshot replaces the previous one wholesale; nothing here mutates
/// records after construction.
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    records: Vec<MetricRecord>,
    index: FxHashMap<String, usize>,
}

impl MetricTable {
    /// Builds a snapshot. Names are expected to be unique; on duplicates the
    /// first record wins the name lookup.
    pub fn new(records: Vec<MetricRecord>) -> Self {
        let mut index = FxHashMap::default();
        for (idx, record) in records.iter().enumerate() {
            index.entry(record.name.clone()).or_insert(idx);
        }
        Self { records, index }
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&MetricRecord> {
        self.records.get(index)
    }

    pub fn find(&self, name: &str) -> Option<&MetricRecord> {
        self.index.get(name).and_then(|&idx| self.records.get(idx))
    }

    /// Period keys of the first record, in column order.
    pub fn periods(&self) -> Vec<&str> {
        self.records
            .first()
            .map(|record| record.values.periods().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether every record carries exactly the period keys of the first one.
    pub fn is_rectangular(&self) -> bool {
        let Some(first) = self.records.first() else {
            return true;
        };
        self.records.iter().skip(1).all(|record| {
            record.values.len() == first.values.len()
                && first
                    .values
                    .periods()
                    .all(|period| record.values.get(period).is_some())
        })
    }
}

#[cfg(test)]
pub(crate) fn record(name: &str, values: &[(&str, f64)]) -> MetricRecord {
    MetricRecord::new(name, values.iter().map(|(k, v)| (*k, *v)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_follow_first_record_order() {
        let table = MetricTable::new(vec![
            record("Revenue", &[("2019", 1.0), ("2017", 2.0), ("2018", 3.0)]),
            record("NOPBT", &[("2017", 4.0), ("2018", 5.0), ("2019", 6.0)]),
        ]);
        assert_eq!(table.periods(), vec!["2019", "2017", "2018"]);
        assert!(table.is_rectangular());
    }

    #[test]
    fn empty_table_has_no_periods() {
        let table = MetricTable::default();
        assert!(table.is_empty());
        assert!(table.periods().is_empty());
        assert!(table.is_rectangular());
    }

    #[test]
    fn detects_ragged_tables() {
        let table = MetricTable::new(vec![
            record("Revenue", &[("2017", 1.0), ("2018", 2.0)]),
            record("NOPBT", &[("2017", 4.0), ("2019", 6.0)]),
        ]);
        assert!(!table.is_rectangular());
    }

    #[test]
    fn insert_replaces_existing_period_in_place() {
        let mut values = PeriodValues::new();
        values.insert("2017", 1.0);
        values.insert("2018", 2.0);
        values.insert("2017", 3.0);
        assert_eq!(values.periods().collect::<Vec<_>>(), vec!["2017", "2018"]);
        assert_eq!(values.get("2017"), Some(&CellValue::Number(3.0)));
    }

    #[test]
    fn find_uses_name_index() {
        let table = MetricTable::new(vec![
            record("Revenue", &[("2017", 1.0)]),
            record("ROIC", &[("2017", 0.5)]),
        ]);
        assert_eq!(table.find("ROIC").map(|r| r.name.as_str()), Some("ROIC"));
        assert!(table.find("EBIT").is_none());
    }

    #[test]
    fn record_serializes_name_first_then_periods() {
        let rec = record("Revenue", &[("2017", 1.5), ("2018", 2.0)]);
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"name":"Revenue","2017":1.5,"2018":2.0}"#);
    }
}
