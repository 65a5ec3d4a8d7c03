//! Dataset scalars → values sent to the sheet

use super::model::CellInput;
use crate::types::{Scalar, TabularDataset, TIMESTAMP_FORMAT};

/// Keep user text from being read as a formula. The sheet drops one leading
/// apostrophe and stores the rest literally.
pub fn escape_text(text: &str) -> String {
    if text.starts_with(['=', '+', '\'']) {
        format!("'{}", text)
    } else {
        text.to_string()
    }
}

/// Value for a `USER_ENTERED` write: trimmed, escaped text; timestamps as
/// `YYYY-MM-DD HH:MM:SS` so the sheet parses them as dates; nulls empty
pub fn to_cell_input(value: &Scalar) -> CellInput {
    match value {
        Scalar::Number(n) if n.is_finite() => CellInput::Number(*n),
        Scalar::Number(_) => CellInput::Empty,
        Scalar::Text(text) => CellInput::Text(escape_text(text.trim())),
        Scalar::Timestamp(ts) => CellInput::Text(ts.format(TIMESTAMP_FORMAT).to_string()),
        Scalar::Null => CellInput::Empty,
    }
}

pub fn header_row(dataset: &TabularDataset) -> Vec<CellInput> {
    dataset
        .column_names()
        .into_iter()
        .map(|name| CellInput::Text(escape_text(name)))
        .collect()
}

pub fn data_rows(dataset: &TabularDataset) -> Vec<Vec<CellInput>> {
    (0..dataset.row_count())
        .map(|i| dataset.row(i).iter().map(to_cell_input).collect())
        .collect()
}

/// Header followed by every data row
pub fn table_rows(dataset: &TabularDataset) -> Vec<Vec<CellInput>> {
    let mut rows = Vec::with_capacity(dataset.row_count() + 1);
    rows.push(header_row(dataset));
    rows.extend(data_rows(dataset));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, ColumnValue};
    use chrono::NaiveDate;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("=SUM(A1)"), "'=SUM(A1)");
        assert_eq!(escape_text("+56 9 1234"), "'+56 9 1234");
        assert_eq!(escape_text("'quoted"), "''quoted");
        assert_eq!(escape_text("plain"), "plain");
        assert_eq!(escape_text("a=b"), "a=b");
    }

    #[test]
    fn test_to_cell_input() {
        assert_eq!(to_cell_input(&Scalar::Number(1.5)), CellInput::Number(1.5));
        assert_eq!(to_cell_input(&Scalar::Number(f64::NAN)), CellInput::Empty);
        assert_eq!(
            to_cell_input(&Scalar::Text("  S1 ".to_string())),
            CellInput::text("S1")
        );
        assert_eq!(to_cell_input(&Scalar::Null), CellInput::Empty);
        let ts = NaiveDate::from_ymd_opt(2026, 1, 20)
            .unwrap()
            .and_hms_opt(12, 0, 5)
            .unwrap();
        assert_eq!(
            to_cell_input(&Scalar::Timestamp(ts)),
            CellInput::text("2026-01-20 12:00:05")
        );
    }

    #[test]
    fn test_table_rows() {
        let ds = TabularDataset::with_columns(vec![
            Column::new("A", ColumnValue::Number(vec![Some(1.0), None])),
            Column::new("B", ColumnValue::Text(vec![None, Some("x".to_string())])),
        ]);
        let rows = table_rows(&ds);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![CellInput::text("A"), CellInput::text("B")]);
        assert_eq!(rows[2], vec![CellInput::Empty, CellInput::text("x")]);
    }
}
