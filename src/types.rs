use chrono::NaiveDateTime;
use std::collections::HashSet;

/// Text layout used whenever a timestamp crosses into the spreadsheet.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

//==============================================================================
// Tabular Dataset
//==============================================================================

/// Column value types (homogeneous arrays, `None` is a missing value)
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Array of numbers (f64)
    Number(Vec<Option<f64>>),
    /// Array of text strings
    Text(Vec<Option<String>>),
    /// Array of naive local timestamps
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl ColumnValue {
    /// Get the length of the array
    pub fn len(&self) -> usize {
        match self {
            ColumnValue::Number(v) => v.len(),
            ColumnValue::Text(v) => v.len(),
            ColumnValue::Timestamp(v) => v.len(),
        }
    }

    /// Check if array is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Number(_) => "Number",
            ColumnValue::Text(_) => "Text",
            ColumnValue::Timestamp(_) => "Timestamp",
        }
    }

    /// Scalar at `index`, or `Scalar::Null` when missing or out of range
    pub fn get(&self, index: usize) -> Scalar {
        match self {
            ColumnValue::Number(v) => v
                .get(index)
                .copied()
                .flatten()
                .map_or(Scalar::Null, Scalar::Number),
            ColumnValue::Text(v) => v
                .get(index)
                .cloned()
                .flatten()
                .map_or(Scalar::Null, Scalar::Text),
            ColumnValue::Timestamp(v) => v
                .get(index)
                .copied()
                .flatten()
                .map_or(Scalar::Null, Scalar::Timestamp),
        }
    }
}

/// A single cell value read out of a dataset
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Null,
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValue,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValue) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered set of equally long columns produced once per run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularDataset {
    pub columns: Vec<Column>,
}

impl TabularDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Number of rows (length of the first column, all should be same)
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |col| col.len())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// A dataset with no columns or no rows publishes nothing
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.row_count() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Zero-based position of a column by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Row `index` as scalars in column order
    pub fn row(&self, index: usize) -> Vec<Scalar> {
        self.columns.iter().map(|c| c.values.get(index)).collect()
    }

    /// Validate unique names and equal lengths
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(format!("Duplicate column name '{}'", column.name));
            }
        }

        let row_count = self.row_count();
        for column in &self.columns {
            if column.len() != row_count {
                return Err(format!(
                    "Column '{}' has {} rows, expected {} rows",
                    column.name,
                    column.len(),
                    row_count
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> TabularDataset {
        TabularDataset::with_columns(vec![
            Column::new(
                "Servidor",
                ColumnValue::Text(vec![Some("S1".to_string()), None]),
            ),
            Column::new("CPU%", ColumnValue::Number(vec![Some(10.0), Some(95.5)])),
        ])
    }

    #[test]
    fn test_row_count_and_names() {
        let ds = sample();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.column_count(), 2);
        assert_eq!(ds.column_names(), vec!["Servidor", "CPU%"]);
        assert_eq!(ds.position("CPU%"), Some(1));
        assert!(ds.position("missing").is_none());
        assert!(!ds.is_empty());
    }

    #[test]
    fn test_row_access_with_nulls() {
        let ds = sample();
        assert_eq!(ds.row(1), vec![Scalar::Null, Scalar::Number(95.5)]);
        assert_eq!(
            ds.row(0),
            vec![Scalar::Text("S1".to_string()), Scalar::Number(10.0)]
        );
    }

    #[test]
    fn test_empty_dataset() {
        assert!(TabularDataset::new().is_empty());
        let ds = TabularDataset::with_columns(vec![Column::new(
            "x",
            ColumnValue::Number(vec![]),
        )]);
        assert!(ds.is_empty());
    }

    #[test]
    fn test_validate_duplicate_names() {
        let ds = TabularDataset::with_columns(vec![
            Column::new("a", ColumnValue::Number(vec![Some(1.0)])),
            Column::new("a", ColumnValue::Number(vec![Some(2.0)])),
        ]);
        assert!(ds.validate().unwrap_err().contains("Duplicate"));
    }

    #[test]
    fn test_validate_lengths() {
        let ds = TabularDataset::with_columns(vec![
            Column::new("a", ColumnValue::Number(vec![Some(1.0)])),
            Column::new("b", ColumnValue::Number(vec![Some(2.0), None])),
        ]);
        assert!(ds.validate().unwrap_err().contains("expected 1 rows"));
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_timestamp_get() {
        let ts = NaiveDate::from_ymd_opt(2026, 1, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let col = ColumnValue::Timestamp(vec![Some(ts), None]);
        assert_eq!(col.get(0), Scalar::Timestamp(ts));
        assert!(col.get(1).is_null());
        assert!(col.get(7).is_null());
        assert_eq!(col.type_name(), "Timestamp");
    }
}
