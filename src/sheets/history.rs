//! Append-only history sheet

use super::api::{SheetsApi, Spreadsheet};
use super::cells::{data_rows, table_rows};
use super::model::{Request, ValueInputOption};
use super::range::to_grid_region;
use super::scheduler::CallClass;
use super::styles::{Style, StyleRegistry};
use crate::config::TabLayout;
use crate::error::SyncResult;
use crate::types::TabularDataset;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const NEW_SHEET_ROWS: u32 = 100;
const NEW_SHEET_COLUMNS: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// Empty dataset or no history sheet configured
    Skipped,
    /// This `(sheet, time)` pair was already written during this run
    Duplicate,
    /// The sheet was empty: header plus `rows` rows written from `A1`
    Initialized { rows: usize },
    /// `rows` rows appended after the existing ones
    Appended { rows: usize },
}

/// Appends one batch of rows per run to each history sheet.
///
/// Keeps the `(sheet, local time)` pairs it has written so a retried step
/// inside the same run cannot duplicate rows. Across runs delivery is
/// at-least-once.
pub struct HistoryAppender<'a> {
    registry: &'a StyleRegistry,
    written: HashSet<(String, String)>,
}

impl<'a> HistoryAppender<'a> {
    pub fn new(registry: &'a StyleRegistry) -> Self {
        Self {
            registry,
            written: HashSet::new(),
        }
    }

    pub fn append<A: SheetsApi>(
        &mut self,
        book: &mut Spreadsheet<A>,
        layout: &TabLayout,
        dataset: &TabularDataset,
        time_local: &str,
    ) -> SyncResult<HistoryOutcome> {
        let Some(tab) = layout.history_tab.as_deref() else {
            return Ok(HistoryOutcome::Skipped);
        };
        if dataset.is_empty() {
            return Ok(HistoryOutcome::Skipped);
        }

        let key = (tab.to_string(), time_local.to_string());
        if self.written.contains(&key) {
            warn!(
                "History '{}' already has the rows of {} from this run, skipping",
                tab, time_local
            );
            return Ok(HistoryOutcome::Duplicate);
        }

        let (mut sheet, _) = book.get_or_create(tab, NEW_SHEET_ROWS, NEW_SHEET_COLUMNS)?;
        let first = book.read(tab, "A1")?;
        let needs_header = first.first().map_or(true, |row| row.is_empty());

        let outcome = if needs_header {
            let rows = dataset.row_count() as u32;
            let cols = dataset.column_count() as u32;
            book.ensure_grid(&mut sheet, rows + 1, cols)?;
            book.write(&sheet, "A1", table_rows(dataset), ValueInputOption::UserEntered)?;
            book.batch(
                CallClass::Format,
                "style history header",
                vec![Request::format(
                    to_grid_region("1:1", sheet.id),
                    self.registry.lookup_style(Style::HeaderBlue),
                )],
            )?;
            debug!("History '{}' initialized with {} columns", tab, cols);
            HistoryOutcome::Initialized {
                rows: rows as usize,
            }
        } else {
            // the existing header is the schema; drift is not checked
            book.append(&sheet, data_rows(dataset))?;
            HistoryOutcome::Appended {
                rows: dataset.row_count(),
            }
        };

        self.written.insert(key);
        info!("🗂️  History '{}': {:?}", tab, outcome);
        Ok(outcome)
    }
}
