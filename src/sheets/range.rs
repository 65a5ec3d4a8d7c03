//! A1-notation arithmetic
//!
//! Public functions are 1-indexed (row 1, column 1 is `A1`). Grid regions
//! produced by [`to_grid_region`] are zero-based and half-open, as the
//! conditional-format, data-validation and chart requests expect.

use super::model::GridRange;
use regex::Regex;
use std::sync::OnceLock;

fn endpoint_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\$?([A-Za-z]*)\$?([0-9]*)$").ok())
        .as_ref()
}

/// Convert a 1-based column number to letters
///
/// Examples:
/// - 1 → A
/// - 26 → Z
/// - 27 → AA
/// - 702 → ZZ
pub fn column_letter(col: u32) -> String {
    let mut result = String::new();
    let mut idx = col.saturating_sub(1);

    loop {
        let remainder = idx % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }

    result
}

/// Convert column letters to a 1-based column number (`"AA"` → 27)
pub fn column_number(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, ch| {
        if ch.is_ascii_alphabetic() {
            Some(acc * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1))
        } else {
            None
        }
    })
}

/// `(2, 3)` → `"C2"`
pub fn cell_address(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// `((6, 1), (9, 3))` → `"A6:C9"`
pub fn rectangle(top_left: (u32, u32), bottom_right: (u32, u32)) -> String {
    format!(
        "{}:{}",
        cell_address(top_left.0, top_left.1),
        cell_address(bottom_right.0, bottom_right.1)
    )
}

/// `"C7"` → `Some((7, 3))`
pub fn parse_cell(address: &str) -> Option<(u32, u32)> {
    let caps = endpoint_pattern()?.captures(address.trim())?;
    let col = column_number(caps.get(1)?.as_str())?;
    let row: u32 = caps.get(2)?.as_str().parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row, col))
}

/// Prefix a range with a quoted sheet title: `'Historial Servidores'!A2:A`
pub fn qualified(sheet_title: &str, range: &str) -> String {
    format!("'{}'!{}", sheet_title.replace('\'', "''"), range)
}

/// Parsed endpoint: optional 1-based row, optional 1-based column
fn parse_endpoint(text: &str) -> Option<(Option<u32>, Option<u32>)> {
    let caps = endpoint_pattern()?.captures(text.trim())?;
    let col = column_number(caps.get(1).map_or("", |m| m.as_str()));
    let row = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|r| *r > 0);
    if col.is_none() && row.is_none() {
        return None;
    }
    Some((row, col))
}

/// Convert an A1 range into a zero-based half-open grid region.
///
/// Accepts single cells (`C3`), rectangles (`A6:C9`), whole columns (`A:B`),
/// open-ended columns (`A2:A`) and whole rows (`1:1`). A sheet prefix
/// (`'Name'!`) is ignored. Strings that do not parse map to the whole sheet.
pub fn to_grid_region(range: &str, sheet_id: i64) -> GridRange {
    let local = range.rsplit_once('!').map_or(range, |(_, r)| r);
    let (start, end) = match local.split_once(':') {
        Some((a, b)) => (a, Some(b)),
        None => (local, None),
    };

    let mut grid = GridRange {
        sheet_id,
        ..Default::default()
    };

    let Some((start_row, start_col)) = parse_endpoint(start) else {
        return grid;
    };
    let (end_row, end_col) = match end {
        Some(text) => match parse_endpoint(text) {
            Some(parsed) => parsed,
            None => return grid,
        },
        None => (start_row, start_col),
    };

    grid.start_row_index = start_row.map(|r| r - 1);
    grid.start_column_index = start_col.map(|c| c - 1);
    grid.end_row_index = end_row;
    grid.end_column_index = end_col;

    // "A:B" style ranges have no row bounds at either end
    if start_row.is_none() {
        grid.end_row_index = None;
    }
    if start_col.is_none() {
        grid.end_column_index = None;
    }

    grid
}
