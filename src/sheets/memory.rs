//! In-memory spreadsheet backend
//!
//! Behaves like the Sheets API for the subset of calls the publishers issue:
//! values vs. formats are stored separately, `clear` keeps formats, format
//! requests honour their field mask, batches are atomic, writes past the grid
//! are rejected and rule deletion by a missing index is a structural error.
//! Used by the integration tests and by `--dry-run`.

use super::api::SheetsApi;
use super::model::{
    CellFormat, CellInput, ConditionalFormatRule, DataValidationRule, EmbeddedChart, GridRange,
    Reply, Request, SheetMetadata, SheetProperties, ValueInputOption,
};
use super::range::{cell_address, to_grid_region};
use crate::error::{SyncError, SyncResult};
use crate::types::TIMESTAMP_FORMAT;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

/// A stored cell value after input interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Number(f64),
    Text(String),
    Formula(String),
    /// `USER_ENTERED` text recognised as a date-time
    DateTime(NaiveDateTime),
}

impl StoredValue {
    /// Text the API would hand back for this value (formulas unevaluated)
    pub fn display(&self) -> String {
        match self {
            StoredValue::Number(n) => format_number(*n),
            StoredValue::Text(s) => s.clone(),
            StoredValue::Formula(f) => f.clone(),
            StoredValue::DateTime(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemoryCell {
    pub value: Option<StoredValue>,
    pub format: CellFormat,
}

impl MemoryCell {
    fn is_blank(&self) -> bool {
        self.value.is_none() && self.format.is_empty()
    }
}

/// One sheet. Coordinates are zero-based `(row, col)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemorySheet {
    pub properties: SheetProperties,
    pub cells: BTreeMap<(u32, u32), MemoryCell>,
    pub merges: Vec<GridRange>,
    pub conditional_rules: Vec<ConditionalFormatRule>,
    pub validations: BTreeMap<(u32, u32), DataValidationRule>,
    pub charts: Vec<(i64, EmbeddedChart)>,
}

impl MemorySheet {
    pub fn id(&self) -> i64 {
        self.properties.sheet_id.unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.properties.title.as_deref().unwrap_or_default()
    }

    fn grid(&self) -> (u32, u32) {
        (self.properties.row_count(), self.properties.column_count())
    }

    /// Value at a 1-based A1 address
    pub fn value(&self, a1: &str) -> Option<&StoredValue> {
        let (row, col) = zero_based(a1)?;
        self.cells.get(&(row, col))?.value.as_ref()
    }

    /// Displayed text at a 1-based A1 address, empty when blank
    pub fn text(&self, a1: &str) -> String {
        self.value(a1).map(StoredValue::display).unwrap_or_default()
    }

    /// Effective format at a 1-based A1 address
    pub fn format(&self, a1: &str) -> CellFormat {
        zero_based(a1)
            .and_then(|pos| self.cells.get(&pos))
            .map(|c| c.format.clone())
            .unwrap_or_default()
    }

    pub fn validation(&self, a1: &str) -> Option<&DataValidationRule> {
        let pos = zero_based(a1)?;
        self.validations.get(&pos)
    }

    /// 1-based number of the last row holding a value (0 when empty)
    pub fn last_row(&self) -> u32 {
        self.cells
            .iter()
            .filter(|(_, c)| c.value.is_some())
            .map(|((r, _), _)| r + 1)
            .max()
            .unwrap_or(0)
    }

    /// Values of a 1-based row, up to the last non-empty cell
    pub fn row_values(&self, row: u32) -> Vec<String> {
        let r = row.saturating_sub(1);
        let last = self
            .cells
            .range((r, 0)..(r + 1, 0))
            .filter(|(_, c)| c.value.is_some())
            .map(|((_, c), _)| *c)
            .max();
        match last {
            Some(last) => (0..=last)
                .map(|c| {
                    self.cells
                        .get(&(r, c))
                        .and_then(|cell| cell.value.as_ref())
                        .map(StoredValue::display)
                        .unwrap_or_default()
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Cells flagged by the boolean conditional-format rules, as A1
    /// addresses. Custom formulas of the form `=TRIM(X)<>V` are evaluated
    /// against each cell of their range.
    pub fn highlighted_cells(&self) -> Vec<String> {
        let mut hits = BTreeSet::new();
        for rule in &self.conditional_rules {
            let Some(boolean) = &rule.boolean_rule else {
                continue;
            };
            for range in &rule.ranges {
                for (&(row, col), cell) in &self.cells {
                    if !range.contains(row, col) {
                        continue;
                    }
                    if let Some(value) = &cell.value {
                        let values: Vec<&str> = boolean
                            .condition
                            .values
                            .iter()
                            .map(|v| v.user_entered_value.as_str())
                            .collect();
                        if condition_matches(&boolean.condition.kind, &values, value) {
                            hits.insert((row, col));
                        }
                    }
                }
            }
        }
        hits.into_iter()
            .map(|(r, c)| cell_address(r + 1, c + 1))
            .collect()
    }

    fn metadata(&self) -> SheetMetadata {
        SheetMetadata {
            properties: self.properties.clone(),
            conditional_formats: self.conditional_rules.clone(),
            charts: self
                .charts
                .iter()
                .map(|(id, _)| super::model::ChartRef { chart_id: *id })
                .collect(),
            merges: self.merges.clone(),
        }
    }

    /// Cells of `range` clipped to the grid
    fn cells_in(&self, range: &GridRange) -> impl Iterator<Item = (u32, u32)> {
        let (rows, cols) = self.grid();
        let r0 = range.start_row_index.unwrap_or(0);
        let r1 = range.end_row_index.unwrap_or(rows).min(rows);
        let c0 = range.start_column_index.unwrap_or(0);
        let c1 = range.end_column_index.unwrap_or(cols).min(cols);
        (r0..r1).flat_map(move |r| (c0..c1).map(move |c| (r, c)))
    }

    fn prune(&mut self) {
        self.cells.retain(|_, c| !c.is_blank());
    }
}

/// One call against the backend
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub operation: &'static str,
    pub target: String,
    /// Request kinds for batch updates
    pub requests: Vec<&'static str>,
    /// Input option of value writes
    pub input: Option<ValueInputOption>,
    /// Rows sent by value writes
    pub rows: Vec<Vec<CellInput>>,
}

impl CallRecord {
    pub fn is_mutation(&self) -> bool {
        !matches!(self.operation, "fetchMetadata" | "getValues")
    }
}

/// Failure injected into the next batch containing a given request kind
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    RateLimit,
    Api(u16, String),
}

impl InjectedFailure {
    fn to_error(&self) -> SyncError {
        match self {
            InjectedFailure::RateLimit => {
                SyncError::RateLimited("Quota exceeded (injected)".to_string())
            }
            InjectedFailure::Api(status, message) => SyncError::Api {
                status: *status,
                message: message.clone(),
            },
        }
    }
}

/// A whole spreadsheet document held in memory
#[derive(Debug, Default)]
pub struct MemorySheets {
    sheets: Vec<MemorySheet>,
    next_sheet_id: i64,
    next_chart_id: i64,
    calls: Vec<CallRecord>,
    failures: Vec<(&'static str, InjectedFailure)>,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self {
            next_sheet_id: 1000,
            next_chart_id: 5000,
            ..Default::default()
        }
    }

    /// Add an empty sheet directly (test setup, not recorded as a call)
    pub fn with_sheet(mut self, title: &str, rows: u32, cols: u32) -> Self {
        self.create_sheet(title, rows, cols);
        self
    }

    pub fn sheet(&self, title: &str) -> Option<&MemorySheet> {
        self.sheets.iter().find(|s| s.title() == title)
    }

    pub fn sheet_mut(&mut self, title: &str) -> Option<&mut MemorySheet> {
        self.sheets.iter_mut().find(|s| s.title() == title)
    }

    pub fn sheet_titles(&self) -> Vec<&str> {
        self.sheets.iter().map(MemorySheet::title).collect()
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn mutation_count(&self) -> usize {
        self.calls.iter().filter(|c| c.is_mutation()).count()
    }

    /// Mutation calls per sheet title (batch updates are counted under
    /// `"(batch)"` since one batch can touch several sheets)
    pub fn mutations_by_target(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for call in self.calls.iter().filter(|c| c.is_mutation()) {
            *counts.entry(call.target.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Fail the next batch that contains a request of `request_kind`
    pub fn fail_once_on(&mut self, request_kind: &'static str, failure: InjectedFailure) {
        self.failures.push((request_kind, failure));
    }

    /// Write values directly (test setup, not recorded as a call)
    pub fn seed_values(&mut self, title: &str, anchor: &str, rows: &[Vec<CellInput>]) {
        if let Some(sheet) = self.sheet_mut(title) {
            let _ = write_rows(sheet, anchor, rows, ValueInputOption::UserEntered);
        }
    }

    fn create_sheet(&mut self, title: &str, rows: u32, cols: u32) -> SheetProperties {
        let properties = SheetProperties {
            sheet_id: Some(self.next_sheet_id),
            title: Some(title.to_string()),
            index: Some(self.sheets.len() as u32),
            grid_properties: Some(super::model::GridProperties {
                row_count: Some(rows),
                column_count: Some(cols),
                hide_gridlines: None,
            }),
        };
        self.next_sheet_id += 1;
        self.sheets.push(MemorySheet {
            properties: properties.clone(),
            ..Default::default()
        });
        properties
    }

    fn record(&mut self, operation: &'static str, target: &str, requests: Vec<&'static str>) {
        self.calls.push(CallRecord {
            operation,
            target: target.to_string(),
            requests,
            input: None,
            rows: Vec::new(),
        });
    }

    fn record_values(
        &mut self,
        operation: &'static str,
        target: &str,
        rows: &[Vec<CellInput>],
        input: ValueInputOption,
    ) {
        self.calls.push(CallRecord {
            operation,
            target: target.to_string(),
            requests: Vec::new(),
            input: Some(input),
            rows: rows.to_vec(),
        });
    }

    fn sheet_index_by_id(&self, id: i64) -> SyncResult<usize> {
        self.sheets
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| bad_request(format!("No grid with id: {}", id)))
    }

    fn sheet_for_range(&mut self, range: &str) -> SyncResult<(&mut MemorySheet, String)> {
        let (title, local) = split_qualified(range);
        let sheet = self
            .sheets
            .iter_mut()
            .find(|s| s.title() == title)
            .ok_or_else(|| bad_request(format!("Unable to parse range: {}", range)))?;
        Ok((sheet, local))
    }

    fn apply(&mut self, request: &Request) -> SyncResult<Reply> {
        match request {
            Request::AddSheet(add) => {
                let title = add.properties.title.clone().unwrap_or_default();
                if self.sheet(&title).is_some() {
                    return Err(bad_request(format!(
                        "A sheet with the name \"{}\" already exists",
                        title
                    )));
                }
                let grid = add.properties.grid_properties.unwrap_or_default();
                let properties = self.create_sheet(
                    &title,
                    grid.row_count.unwrap_or(1000),
                    grid.column_count.unwrap_or(26),
                );
                Ok(Reply {
                    add_sheet: Some(super::model::AddSheetReply { properties }),
                })
            }
            Request::UpdateSheetProperties(update) => {
                let id = update.properties.sheet_id.unwrap_or_default();
                let idx = self.sheet_index_by_id(id)?;
                let fields = update.fields.as_str();
                let new_grid = update.properties.grid_properties.unwrap_or_default();
                {
                    let sheet = &mut self.sheets[idx];
                    let grid = sheet
                        .properties
                        .grid_properties
                        .get_or_insert_with(Default::default);
                    if fields.contains("rowCount") {
                        grid.row_count = new_grid.row_count.or(grid.row_count);
                    }
                    if fields.contains("columnCount") {
                        grid.column_count = new_grid.column_count.or(grid.column_count);
                    }
                    if fields.contains("hideGridlines") {
                        grid.hide_gridlines = new_grid.hide_gridlines;
                    }
                }
                if fields.split(',').any(|f| f.trim() == "index") {
                    let target = update.properties.index.unwrap_or(0) as usize;
                    let sheet = self.sheets.remove(idx);
                    let target = target.min(self.sheets.len());
                    self.sheets.insert(target, sheet);
                    for (i, s) in self.sheets.iter_mut().enumerate() {
                        s.properties.index = Some(i as u32);
                    }
                }
                Ok(Reply::default())
            }
            Request::MergeCells(merge) => {
                let idx = self.sheet_index_by_id(merge.range.sheet_id)?;
                let sheet = &mut self.sheets[idx];
                sheet.merges.retain(|m| !contained_in(m, &merge.range));
                if sheet.merges.iter().any(|m| m.intersects(&merge.range)) {
                    return Err(bad_request(
                        "You can't merge cells that intersect an existing merge".to_string(),
                    ));
                }
                sheet.merges.push(merge.range);
                Ok(Reply::default())
            }
            Request::UnmergeCells(unmerge) => {
                let idx = self.sheet_index_by_id(unmerge.range.sheet_id)?;
                self.sheets[idx]
                    .merges
                    .retain(|m| !m.intersects(&unmerge.range));
                Ok(Reply::default())
            }
            Request::DeleteConditionalFormatRule(delete) => {
                let idx = self.sheet_index_by_id(delete.sheet_id)?;
                let rules = &mut self.sheets[idx].conditional_rules;
                if (delete.index as usize) >= rules.len() {
                    return Err(bad_request(format!(
                        "No conditional format on sheet: {} at index: {}",
                        delete.sheet_id, delete.index
                    )));
                }
                rules.remove(delete.index as usize);
                Ok(Reply::default())
            }
            Request::AddConditionalFormatRule(add) => {
                let sheet_id = add.rule.ranges.first().map_or(0, |r| r.sheet_id);
                let idx = self.sheet_index_by_id(sheet_id)?;
                let rules = &mut self.sheets[idx].conditional_rules;
                let at = (add.index as usize).min(rules.len());
                rules.insert(at, add.rule.clone());
                Ok(Reply::default())
            }
            Request::RepeatCell(repeat) => {
                let idx = self.sheet_index_by_id(repeat.range.sheet_id)?;
                let sheet = &mut self.sheets[idx];
                let format = &repeat.cell.user_entered_format;
                if repeat.fields == "userEnteredFormat" {
                    let targets: Vec<(u32, u32)> = sheet.cells_in(&repeat.range).collect();
                    for pos in targets {
                        if format.is_empty() {
                            if let Some(cell) = sheet.cells.get_mut(&pos) {
                                cell.format = CellFormat::default();
                            }
                        } else {
                            sheet.cells.entry(pos).or_default().format = format.clone();
                        }
                    }
                } else {
                    let targets: Vec<(u32, u32)> = sheet.cells_in(&repeat.range).collect();
                    for pos in targets {
                        sheet.cells.entry(pos).or_default().format.overlay(format);
                    }
                }
                sheet.prune();
                Ok(Reply::default())
            }
            Request::SetDataValidation(set) => {
                let idx = self.sheet_index_by_id(set.range.sheet_id)?;
                let sheet = &mut self.sheets[idx];
                match &set.rule {
                    None => sheet
                        .validations
                        .retain(|&(r, c), _| !set.range.contains(r, c)),
                    Some(rule) => {
                        let targets: Vec<(u32, u32)> = sheet.cells_in(&set.range).collect();
                        for pos in targets {
                            sheet.validations.insert(pos, rule.clone());
                        }
                    }
                }
                Ok(Reply::default())
            }
            Request::AddChart(add) => {
                let anchor = add.chart.position.overlay_position.anchor_cell.sheet_id;
                let idx = self.sheet_index_by_id(anchor)?;
                let id = self.next_chart_id;
                self.next_chart_id += 1;
                let mut chart = add.chart.clone();
                chart.chart_id = Some(id);
                self.sheets[idx].charts.push((id, chart));
                Ok(Reply::default())
            }
            Request::DeleteEmbeddedObject(delete) => {
                let owner = self
                    .sheets
                    .iter_mut()
                    .find(|s| s.charts.iter().any(|(id, _)| *id == delete.object_id));
                match owner {
                    Some(sheet) => {
                        sheet.charts.retain(|(id, _)| *id != delete.object_id);
                        Ok(Reply::default())
                    }
                    None => Err(bad_request(format!(
                        "No object with id {}",
                        delete.object_id
                    ))),
                }
            }
        }
    }
}

impl SheetsApi for MemorySheets {
    fn fetch_metadata(&mut self) -> SyncResult<Vec<SheetMetadata>> {
        self.record("fetchMetadata", "(spreadsheet)", Vec::new());
        Ok(self.sheets.iter().map(MemorySheet::metadata).collect())
    }

    fn batch_update(&mut self, requests: &[Request]) -> SyncResult<Vec<Reply>> {
        let kinds: Vec<&'static str> = requests.iter().map(Request::kind).collect();
        self.record("batchUpdate", "(batch)", kinds.clone());

        if let Some(pos) = self
            .failures
            .iter()
            .position(|(kind, _)| kinds.contains(kind))
        {
            let (_, failure) = self.failures.remove(pos);
            return Err(failure.to_error());
        }

        // all-or-nothing, like the remote
        let snapshot = (
            self.sheets.clone(),
            self.next_sheet_id,
            self.next_chart_id,
        );
        let mut replies = Vec::with_capacity(requests.len());
        for request in requests {
            match self.apply(request) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    self.sheets = snapshot.0;
                    self.next_sheet_id = snapshot.1;
                    self.next_chart_id = snapshot.2;
                    return Err(err);
                }
            }
        }
        Ok(replies)
    }

    fn clear_values(&mut self, range: &str) -> SyncResult<()> {
        let (title, _) = split_qualified(range);
        self.record("clearValues", &title, Vec::new());
        let (sheet, local) = self.sheet_for_range(range)?;
        let region = to_grid_region(&local, sheet.id());
        for (&(r, c), cell) in sheet.cells.iter_mut() {
            if region.contains(r, c) {
                cell.value = None;
            }
        }
        sheet.prune();
        Ok(())
    }

    fn update_values(
        &mut self,
        range: &str,
        rows: &[Vec<CellInput>],
        input: ValueInputOption,
    ) -> SyncResult<()> {
        let (title, _) = split_qualified(range);
        self.record_values("updateValues", &title, rows, input);
        let (sheet, local) = self.sheet_for_range(range)?;
        let (rows_needed, cols_needed) = extent(&local, rows);
        let (grid_rows, grid_cols) = sheet.grid();
        if rows_needed > grid_rows || cols_needed > grid_cols {
            return Err(bad_request(format!(
                "Range ({}) exceeds grid limits. Max rows: {}, max columns: {}",
                range, grid_rows, grid_cols
            )));
        }
        write_rows(sheet, &local, rows, input)
    }

    fn append_values(
        &mut self,
        range: &str,
        rows: &[Vec<CellInput>],
        input: ValueInputOption,
    ) -> SyncResult<()> {
        let (title, _) = split_qualified(range);
        self.record_values("appendValues", &title, rows, input);
        let (sheet, local) = self.sheet_for_range(range)?;
        let region = to_grid_region(&local, sheet.id());
        let start_col = region.start_column_index.unwrap_or(0) + 1;
        let start_row = sheet.last_row() + 1;

        // INSERT_ROWS: the grid grows to make room
        let needed = start_row - 1 + rows.len() as u32;
        let widest = rows.iter().map(Vec::len).max().unwrap_or(0) as u32;
        if let Some(grid) = sheet.properties.grid_properties.as_mut() {
            grid.row_count = Some(grid.row_count.unwrap_or(0).max(needed));
            let cols = start_col - 1 + widest;
            grid.column_count = Some(grid.column_count.unwrap_or(0).max(cols));
        }
        write_rows(sheet, &cell_address(start_row, start_col), rows, input)
    }

    fn get_values(&mut self, range: &str) -> SyncResult<Vec<Vec<String>>> {
        let (title, _) = split_qualified(range);
        self.record("getValues", &title, Vec::new());
        let (sheet, local) = self.sheet_for_range(range)?;
        let region = to_grid_region(&local, sheet.id());
        let r0 = region.start_row_index.unwrap_or(0);
        let c0 = region.start_column_index.unwrap_or(0);

        let mut rows: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
        for (&(r, c), cell) in &sheet.cells {
            if let Some(value) = &cell.value {
                if region.contains(r, c) {
                    rows.entry(r).or_default().insert(c, value.display());
                }
            }
        }
        let Some(&last) = rows.keys().max() else {
            return Ok(Vec::new());
        };
        Ok((r0..=last)
            .map(|r| match rows.get(&r) {
                Some(cols) => {
                    let max_col = cols.keys().max().copied().unwrap_or(c0);
                    (c0..=max_col)
                        .map(|c| cols.get(&c).cloned().unwrap_or_default())
                        .collect()
                }
                None => Vec::new(),
            })
            .collect())
    }
}

fn bad_request(message: String) -> SyncError {
    SyncError::Api {
        status: 400,
        message,
    }
}

fn contained_in(inner: &GridRange, outer: &GridRange) -> bool {
    inner.start_row_index >= outer.start_row_index
        && inner.end_row_index <= outer.end_row_index
        && inner.start_column_index >= outer.start_column_index
        && inner.end_column_index <= outer.end_column_index
}

fn zero_based(a1: &str) -> Option<(u32, u32)> {
    super::range::parse_cell(a1).map(|(r, c)| (r - 1, c - 1))
}

/// `'Sheet ''x'''!A1` → (`Sheet 'x'`, `A1`)
fn split_qualified(range: &str) -> (String, String) {
    if let Some(rest) = range.strip_prefix('\'') {
        let mut title = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((i, ch)) = chars.next() {
            if ch == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    title.push('\'');
                    chars.next();
                    continue;
                }
                let local = rest[i + 1..].trim_start_matches('!').to_string();
                return (title, local);
            }
            title.push(ch);
        }
        return (title, String::new());
    }
    match range.split_once('!') {
        Some((title, local)) => (title.to_string(), local.to_string()),
        None => (range.to_string(), String::new()),
    }
}

/// 1-based rows/cols reached when `rows` is written at the anchor of `local`
fn extent(local: &str, rows: &[Vec<CellInput>]) -> (u32, u32) {
    let (row, col) = super::range::parse_cell(local.split(':').next().unwrap_or("A1"))
        .unwrap_or((1, 1));
    let height = rows.len() as u32;
    let width = rows.iter().map(Vec::len).max().unwrap_or(0) as u32;
    (row + height.saturating_sub(1), col + width.saturating_sub(1))
}

fn write_rows(
    sheet: &mut MemorySheet,
    anchor: &str,
    rows: &[Vec<CellInput>],
    input: ValueInputOption,
) -> SyncResult<()> {
    let (row, col) = super::range::parse_cell(anchor.split(':').next().unwrap_or("A1"))
        .ok_or_else(|| bad_request(format!("Unable to parse range: {}", anchor)))?;
    for (dr, values) in rows.iter().enumerate() {
        for (dc, value) in values.iter().enumerate() {
            let pos = (row - 1 + dr as u32, col - 1 + dc as u32);
            // null leaves the cell untouched
            if let Some(stored) = interpret(value, input) {
                sheet.cells.entry(pos).or_default().value = Some(stored);
            }
        }
    }
    Ok(())
}

fn interpret(value: &CellInput, input: ValueInputOption) -> Option<StoredValue> {
    match value {
        CellInput::Empty => None,
        CellInput::Number(n) => Some(StoredValue::Number(*n)),
        CellInput::Text(text) => Some(match input {
            ValueInputOption::Raw => StoredValue::Text(text.clone()),
            ValueInputOption::UserEntered => {
                if let Some(literal) = text.strip_prefix('\'') {
                    StoredValue::Text(literal.to_string())
                } else if text.starts_with('=') {
                    StoredValue::Formula(text.clone())
                } else if let Ok(dt) =
                    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
                {
                    StoredValue::DateTime(dt)
                } else if let Ok(n) = text.trim().parse::<f64>() {
                    StoredValue::Number(n)
                } else {
                    StoredValue::Text(text.clone())
                }
            }
        }),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn condition_matches(kind: &str, values: &[&str], cell: &StoredValue) -> bool {
    let number = match cell {
        StoredValue::Number(n) => Some(*n),
        StoredValue::Text(t) => t.trim().parse::<f64>().ok(),
        StoredValue::Formula(_) | StoredValue::DateTime(_) => None,
    };
    let arg = |i: usize| values.get(i).and_then(|v| v.trim().parse::<f64>().ok());
    match kind {
        "NUMBER_GREATER" => matches!((number, arg(0)), (Some(n), Some(v)) if n > v),
        "NUMBER_GREATER_THAN_EQ" => matches!((number, arg(0)), (Some(n), Some(v)) if n >= v),
        "NUMBER_LESS" => matches!((number, arg(0)), (Some(n), Some(v)) if n < v),
        "NUMBER_LESS_THAN_EQ" => matches!((number, arg(0)), (Some(n), Some(v)) if n <= v),
        "NUMBER_BETWEEN" => {
            matches!((number, arg(0), arg(1)), (Some(n), Some(a), Some(b)) if n >= a && n <= b)
        }
        "NUMBER_NOT_BETWEEN" => {
            matches!((number, arg(0), arg(1)), (Some(n), Some(a), Some(b)) if n < a || n > b)
        }
        "TEXT_EQ" => values
            .first()
            .is_some_and(|v| cell.display().trim() == v.trim()),
        "CUSTOM_FORMULA" => values
            .first()
            .and_then(|f| f.split_once(")<>"))
            .is_some_and(|(_, expected)| {
                let actual = cell.display();
                let actual = actual.trim();
                match expected.strip_prefix('"').and_then(|e| e.strip_suffix('"')) {
                    Some(text) => actual != text,
                    None => match (actual.parse::<f64>(), expected.parse::<f64>()) {
                        (Ok(a), Ok(e)) => a != e,
                        _ => actual != expected,
                    },
                }
            }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::model::{
        AddConditionalFormatRuleRequest, BooleanCondition, BooleanRule, ConditionValue,
        DeleteConditionalFormatRuleRequest,
    };

    fn book() -> MemorySheets {
        MemorySheets::new().with_sheet("Data", 10, 5)
    }

    fn id(book: &MemorySheets) -> i64 {
        book.sheet("Data").unwrap().id()
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(
            split_qualified("'Historial Servidores'!A2:A"),
            ("Historial Servidores".to_string(), "A2:A".to_string())
        );
        assert_eq!(
            split_qualified("'Bob''s'!B3"),
            ("Bob's".to_string(), "B3".to_string())
        );
        assert_eq!(
            split_qualified("Data!A1"),
            ("Data".to_string(), "A1".to_string())
        );
    }

    #[test]
    fn test_user_entered_interpretation() {
        let mut book = book();
        book.update_values(
            "'Data'!A1",
            &[vec![
                CellInput::text("=NOW()-B2"),
                CellInput::text("42"),
                CellInput::text("'=literal"),
                CellInput::Empty,
                CellInput::text("S1"),
            ]],
            ValueInputOption::UserEntered,
        )
        .unwrap();
        let sheet = book.sheet("Data").unwrap();
        assert_eq!(
            sheet.value("A1"),
            Some(&StoredValue::Formula("=NOW()-B2".to_string()))
        );
        assert_eq!(sheet.value("B1"), Some(&StoredValue::Number(42.0)));
        assert_eq!(sheet.text("C1"), "=literal");
        assert!(sheet.value("D1").is_none());
        assert_eq!(sheet.text("E1"), "S1");
    }

    #[test]
    fn test_date_text_is_parsed_only_when_user_entered() {
        let mut book = book();
        let stamp = vec![vec![CellInput::text("2026-01-20 12:30:00")]];
        book.update_values("'Data'!A1", &stamp, ValueInputOption::UserEntered)
            .unwrap();
        book.update_values("'Data'!B1", &stamp, ValueInputOption::Raw)
            .unwrap();

        let sheet = book.sheet("Data").unwrap();
        assert!(matches!(sheet.value("A1"), Some(StoredValue::DateTime(_))));
        assert_eq!(sheet.text("A1"), "2026-01-20 12:30:00");
        assert_eq!(
            sheet.value("B1"),
            Some(&StoredValue::Text("2026-01-20 12:30:00".to_string()))
        );
        assert_eq!(book.calls()[1].input, Some(ValueInputOption::Raw));
        assert_eq!(book.calls()[1].rows, stamp);
    }

    #[test]
    fn test_write_past_grid_is_rejected() {
        let mut book = book();
        let rows = vec![vec![CellInput::Number(1.0)]; 11];
        let err = book
            .update_values("'Data'!A1", &rows, ValueInputOption::Raw)
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_clear_keeps_formats() {
        let mut book = book();
        let sheet_id = id(&book);
        book.update_values(
            "'Data'!A1",
            &[vec![CellInput::text("x")]],
            ValueInputOption::Raw,
        )
        .unwrap();
        book.batch_update(&[Request::format(
            GridRange::bounded(sheet_id, (0, 1), (0, 1)),
            &CellFormat::vertical("MIDDLE"),
        )])
        .unwrap();
        book.clear_values("'Data'!A:ZZZ").unwrap();
        let sheet = book.sheet("Data").unwrap();
        assert!(sheet.value("A1").is_none());
        assert_eq!(
            sheet.format("A1").vertical_alignment.as_deref(),
            Some("MIDDLE")
        );
    }

    #[test]
    fn test_delete_missing_rule_is_structural_and_atomic() {
        let mut book = book();
        let sheet_id = id(&book);
        let rule = ConditionalFormatRule {
            ranges: vec![GridRange::bounded(sheet_id, (0, 5), (0, 1))],
            boolean_rule: Some(BooleanRule {
                condition: BooleanCondition {
                    kind: "NUMBER_GREATER".to_string(),
                    values: vec![ConditionValue::new("1")],
                },
                format: CellFormat::default(),
            }),
        };
        book.batch_update(&[Request::AddConditionalFormatRule(
            AddConditionalFormatRuleRequest { rule, index: 0 },
        )])
        .unwrap();

        let delete = Request::DeleteConditionalFormatRule(DeleteConditionalFormatRuleRequest {
            sheet_id,
            index: 0,
        });
        let err = book
            .batch_update(&[delete.clone(), delete.clone()])
            .unwrap_err();
        assert!(err.is_structural());
        // the first deletion was rolled back with the batch
        assert_eq!(book.sheet("Data").unwrap().conditional_rules.len(), 1);
        book.batch_update(&[delete]).unwrap();
        assert!(book.sheet("Data").unwrap().conditional_rules.is_empty());
    }

    #[test]
    fn test_append_goes_after_last_row() {
        let mut book = book();
        book.seed_values(
            "Data",
            "A1",
            &[
                vec![CellInput::text("h1"), CellInput::text("h2")],
                vec![CellInput::text("a"), CellInput::Number(1.0)],
            ],
        );
        book.append_values(
            "'Data'!A1",
            &[
                vec![CellInput::text("b"), CellInput::Empty],
                vec![CellInput::text("c"), CellInput::Number(3.0)],
            ],
            ValueInputOption::UserEntered,
        )
        .unwrap();
        let sheet = book.sheet("Data").unwrap();
        assert_eq!(sheet.last_row(), 4);
        assert_eq!(sheet.row_values(3), vec!["b"]);
        assert_eq!(sheet.row_values(4), vec!["c", "3"]);
    }

    #[test]
    fn test_get_values_trims_trailing() {
        let mut book = book();
        book.seed_values(
            "Data",
            "A2",
            &[vec![CellInput::text("S1")], vec![CellInput::text("S2")]],
        );
        assert_eq!(
            book.get_values("'Data'!A1").unwrap(),
            Vec::<Vec<String>>::new()
        );
        assert_eq!(
            book.get_values("'Data'!A2:A").unwrap(),
            vec![vec!["S1".to_string()], vec!["S2".to_string()]]
        );
    }

    #[test]
    fn test_calls_are_recorded() {
        let mut book = book();
        book.fetch_metadata().unwrap();
        book.clear_values("'Data'!A:ZZZ").unwrap();
        assert_eq!(book.calls().len(), 2);
        assert_eq!(book.mutation_count(), 1);
        assert_eq!(book.mutations_by_target().get("Data"), Some(&1));
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let mut book = book();
        let sheet_id = id(&book);
        book.fail_once_on("mergeCells", InjectedFailure::RateLimit);
        let merge = Request::merge_all(GridRange::bounded(sheet_id, (0, 1), (0, 2)));
        assert!(book
            .batch_update(&[merge.clone()])
            .unwrap_err()
            .is_rate_limit());
        book.batch_update(&[merge]).unwrap();
        assert_eq!(book.sheet("Data").unwrap().merges.len(), 1);
    }

    #[test]
    fn test_condition_matching() {
        let n = StoredValue::Number(95.0);
        assert!(condition_matches("NUMBER_GREATER", &["90"], &n));
        assert!(!condition_matches("NUMBER_LESS", &["90"], &n));
        assert!(condition_matches("NUMBER_BETWEEN", &["90", "100"], &n));
        assert!(!condition_matches("NUMBER_NOT_BETWEEN", &["90", "100"], &n));
        let t = StoredValue::Text("offline".to_string());
        assert!(condition_matches("CUSTOM_FORMULA", &["=TRIM(C7)<>\"online\""], &t));
        assert!(!condition_matches("CUSTOM_FORMULA", &["=TRIM(C7)<>\"offline\""], &t));
        assert!(condition_matches("TEXT_EQ", &["offline"], &t));
    }
}
