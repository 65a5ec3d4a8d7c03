//! History appending against the in-memory spreadsheet

use monitor_sheets::config::{parse_layout_str, TabLayout};
use chrono::NaiveDate;
use monitor_sheets::sheets::memory::StoredValue;
use monitor_sheets::sheets::model::{CellInput, ValueInputOption};
use monitor_sheets::sheets::styles::Style;
use monitor_sheets::sheets::{
    HistoryAppender, HistoryOutcome, MemorySheets, QuotaScheduler, Spreadsheet, StyleRegistry,
};
use monitor_sheets::types::{Column, ColumnValue, TabularDataset};
use pretty_assertions::assert_eq;

fn layout(history: bool) -> TabLayout {
    let history_line = if history {
        "    history_tab: \"Historial\"\n"
    } else {
        ""
    };
    let yaml = format!(
        "entities:\n  servers:\n    tab_name: \"Servidores\"\n{}    columns:\n      \"Server Name\":\n        name: \"Servidor\"\n      cpu:\n        name: \"CPU%\"\n        format: NUMBER\n",
        history_line
    );
    parse_layout_str(&yaml)
        .unwrap()
        .entity("servers")
        .unwrap()
        .clone()
}

fn dataset(servers: &[&str], cpu: &[f64]) -> TabularDataset {
    TabularDataset::with_columns(vec![
        Column::new(
            "Servidor",
            ColumnValue::Text(servers.iter().map(|s| Some(s.to_string())).collect()),
        ),
        Column::new("CPU%", ColumnValue::Number(cpu.iter().map(|c| Some(*c)).collect())),
    ])
}

fn book() -> Spreadsheet<MemorySheets> {
    Spreadsheet::new(MemorySheets::new(), QuotaScheduler::unpaced())
}

#[test]
fn test_first_append_writes_header() {
    let registry = StyleRegistry::standard();
    let mut appender = HistoryAppender::new(&registry);
    let mut book = book();

    let outcome = appender
        .append(&mut book, &layout(true), &dataset(&["S1", "S2"], &[10.0, 20.0]), "t1")
        .unwrap();
    assert_eq!(outcome, HistoryOutcome::Initialized { rows: 2 });

    let sheet = book.api().sheet("Historial").unwrap();
    assert_eq!(sheet.row_values(1), vec!["Servidor", "CPU%"]);
    assert_eq!(sheet.row_values(2), vec!["S1", "10"]);
    assert_eq!(sheet.row_values(3), vec!["S2", "20"]);
    assert_eq!(
        sheet.format("A1").background_color,
        registry.lookup_style(Style::HeaderBlue).background_color
    );
}

#[test]
fn test_runs_accumulate_rows() {
    let registry = StyleRegistry::standard();
    let mut book = book();
    let tab = layout(true);

    // one appender per run, as the pipeline does
    HistoryAppender::new(&registry)
        .append(&mut book, &tab, &dataset(&["S1", "S2"], &[10.0, 20.0]), "t1")
        .unwrap();
    let second = HistoryAppender::new(&registry)
        .append(&mut book, &tab, &dataset(&["S1", "S2"], &[11.0, 21.0]), "t2")
        .unwrap();
    assert_eq!(second, HistoryOutcome::Appended { rows: 2 });

    let sheet = book.api().sheet("Historial").unwrap();
    assert_eq!(sheet.last_row(), 5);
    assert_eq!(sheet.row_values(1), vec!["Servidor", "CPU%"]);
    assert_eq!(sheet.row_values(4), vec!["S1", "11"]);
    assert_eq!(sheet.row_values(5), vec!["S2", "21"]);
}

#[test]
fn test_same_run_is_not_written_twice() {
    let registry = StyleRegistry::standard();
    let mut appender = HistoryAppender::new(&registry);
    let mut book = book();
    let tab = layout(true);
    let rows = dataset(&["S1"], &[10.0]);

    appender.append(&mut book, &tab, &rows, "t1").unwrap();
    book.api_mut().clear_calls();
    let again = appender.append(&mut book, &tab, &rows, "t1").unwrap();

    assert_eq!(again, HistoryOutcome::Duplicate);
    assert!(book.api().calls().is_empty());
    assert_eq!(book.api().sheet("Historial").unwrap().last_row(), 2);
}

#[test]
fn test_skips_without_history_tab_or_rows() {
    let registry = StyleRegistry::standard();
    let mut appender = HistoryAppender::new(&registry);
    let mut book = book();

    let no_tab = appender
        .append(&mut book, &layout(false), &dataset(&["S1"], &[1.0]), "t1")
        .unwrap();
    let no_rows = appender
        .append(&mut book, &layout(true), &TabularDataset::new(), "t1")
        .unwrap();

    assert_eq!(no_tab, HistoryOutcome::Skipped);
    assert_eq!(no_rows, HistoryOutcome::Skipped);
    assert!(book.api().calls().is_empty());
}

#[test]
fn test_existing_header_is_kept() {
    let registry = StyleRegistry::standard();
    let mut memory = MemorySheets::new().with_sheet("Historial", 100, 20);
    memory.seed_values(
        "Historial",
        "A1",
        &[vec![CellInput::text("Servidor"), CellInput::text("CPU%")]],
    );
    let mut book = Spreadsheet::new(memory, QuotaScheduler::unpaced());

    let outcome = HistoryAppender::new(&registry)
        .append(&mut book, &layout(true), &dataset(&["S1"], &[5.0]), "t1")
        .unwrap();

    assert_eq!(outcome, HistoryOutcome::Appended { rows: 1 });
    let sheet = book.api().sheet("Historial").unwrap();
    assert_eq!(sheet.row_values(2), vec!["S1", "5"]);
    // header row untouched: no style was applied
    assert!(sheet.format("A1").is_empty());
}

#[test]
fn test_append_payload_keeps_dates_and_nulls() {
    let registry = StyleRegistry::standard();
    let mut book = book();
    let tab = layout(true);

    HistoryAppender::new(&registry)
        .append(&mut book, &tab, &dataset(&["S1"], &[10.0]), "t1")
        .unwrap();
    let before = book.api().sheet("Historial").unwrap().clone();
    book.api_mut().clear_calls();

    let stamp = NaiveDate::from_ymd_opt(2026, 1, 20)
        .unwrap()
        .and_hms_opt(12, 30, 0)
        .unwrap();
    let rows = TabularDataset::with_columns(vec![
        Column::new(
            "Servidor",
            ColumnValue::Text(vec![Some("S1".to_string()), Some("S2".to_string())]),
        ),
        Column::new("CPU%", ColumnValue::Number(vec![Some(11.0), None])),
        Column::new("Fecha", ColumnValue::Timestamp(vec![Some(stamp), Some(stamp)])),
    ]);
    let outcome = HistoryAppender::new(&registry)
        .append(&mut book, &tab, &rows, "t2")
        .unwrap();
    assert_eq!(outcome, HistoryOutcome::Appended { rows: 2 });

    let append = book
        .api()
        .calls()
        .iter()
        .find(|c| c.operation == "appendValues")
        .unwrap();
    assert_eq!(append.input, Some(ValueInputOption::UserEntered));
    assert_eq!(
        append.rows[1],
        vec![
            CellInput::text("S2"),
            CellInput::Empty,
            CellInput::text("2026-01-20 12:30:00"),
        ]
    );
    assert_eq!(
        serde_json::to_value(&append.rows[1]).unwrap(),
        serde_json::json!(["S2", null, "2026-01-20 12:30:00"])
    );

    let sheet = book.api().sheet("Historial").unwrap();
    assert_eq!(sheet.value("C3"), Some(&StoredValue::DateTime(stamp)));
    assert_eq!(sheet.value("B4"), None);
    assert_eq!(sheet.text("A4"), "S2");
    // rows written by the earlier run are untouched
    assert_eq!(sheet.row_values(1), before.row_values(1));
    assert_eq!(sheet.row_values(2), before.row_values(2));
    assert_eq!(sheet.format("A1"), before.format("A1"));
}
