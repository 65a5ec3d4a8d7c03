//! Remote spreadsheet seam
//!
//! [`SheetsApi`] is the raw vocabulary of remote calls (implemented over
//! HTTP by `SheetsClient` and in memory by `MemorySheets`). [`Spreadsheet`]
//! pairs an API with the [`QuotaScheduler`] so every call the publishers
//! make is paced, and exposes the higher-level steps they share.

use super::model::{
    CellInput, ChartRef, DeleteConditionalFormatRuleRequest, DeleteEmbeddedObjectRequest,
    GridProperties, GridRange, Reply, Request, SetDataValidationRequest, SheetMetadata,
    SheetProperties, UpdateSheetPropertiesRequest, ValueInputOption,
};
use super::range::qualified;
use super::scheduler::{CallClass, QuotaScheduler};
use crate::error::{SyncError, SyncResult};
use tracing::{debug, warn};

/// Raw remote operations against one spreadsheet document
pub trait SheetsApi {
    /// Properties, conditional rules, chart ids and merges of every sheet
    fn fetch_metadata(&mut self) -> SyncResult<Vec<SheetMetadata>>;

    /// Apply `requests` atomically, in order
    fn batch_update(&mut self, requests: &[Request]) -> SyncResult<Vec<Reply>>;

    /// Clear values (not formats) in `range`
    fn clear_values(&mut self, range: &str) -> SyncResult<()>;

    /// Write `rows` starting at the top-left of `range`
    fn update_values(
        &mut self,
        range: &str,
        rows: &[Vec<CellInput>],
        input: ValueInputOption,
    ) -> SyncResult<()>;

    /// Append `rows` after the last non-empty row of the table at `range`
    fn append_values(
        &mut self,
        range: &str,
        rows: &[Vec<CellInput>],
        input: ValueInputOption,
    ) -> SyncResult<()>;

    /// Formatted values in `range`; trailing empty rows/cells are omitted
    fn get_values(&mut self, range: &str) -> SyncResult<Vec<Vec<String>>>;
}

/// Result of a cleanup call. "Nothing to clean" is success, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    Cleaned,
    NothingToClean,
}

/// Identity and grid size of a resolved sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetHandle {
    pub id: i64,
    pub title: String,
    pub row_count: u32,
    pub column_count: u32,
}

impl SheetHandle {
    fn from_properties(properties: &SheetProperties) -> SyncResult<Self> {
        let id = properties.sheet_id.ok_or_else(|| SyncError::Api {
            status: 0,
            message: "sheet properties without sheetId".to_string(),
        })?;
        Ok(Self {
            id,
            title: properties.title.clone().unwrap_or_default(),
            row_count: properties.row_count(),
            column_count: properties.column_count(),
        })
    }

    /// The whole grid as a bounded region
    pub fn full_region(&self) -> GridRange {
        GridRange::bounded(self.id, (0, self.row_count), (0, self.column_count))
    }

    /// A1 range qualified with this sheet's title
    pub fn range(&self, a1: &str) -> String {
        qualified(&self.title, a1)
    }
}

/// An API plus the scheduler every call goes through
pub struct Spreadsheet<A: SheetsApi> {
    api: A,
    scheduler: QuotaScheduler,
}

impl<A: SheetsApi> Spreadsheet<A> {
    pub fn new(api: A, scheduler: QuotaScheduler) -> Self {
        Self { api, scheduler }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    pub fn scheduler_mut(&mut self) -> &mut QuotaScheduler {
        &mut self.scheduler
    }

    /// Issue one batchUpdate. An empty batch performs no remote call.
    pub fn batch(
        &mut self,
        class: CallClass,
        description: &str,
        requests: Vec<Request>,
    ) -> SyncResult<Vec<Reply>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let api = &mut self.api;
        self.scheduler
            .execute(class, description, || api.batch_update(&requests))
    }

    pub fn find_sheet(&mut self, title: &str) -> SyncResult<Option<SheetMetadata>> {
        let api = &mut self.api;
        let sheets = self
            .scheduler
            .execute(CallClass::Read, "fetch metadata", || api.fetch_metadata())?;
        Ok(sheets.into_iter().find(|s| s.title() == title))
    }

    /// Current metadata of a sheet (rule count, charts, merges)
    pub fn sheet_state(&mut self, sheet: &SheetHandle) -> SyncResult<SheetMetadata> {
        let api = &mut self.api;
        let sheets = self
            .scheduler
            .execute(CallClass::Read, "fetch metadata", || api.fetch_metadata())?;
        Ok(sheets
            .into_iter()
            .find(|s| s.sheet_id() == sheet.id)
            .unwrap_or_default())
    }

    /// Resolve a sheet by title, creating it with a `rows`×`cols` grid if it
    /// does not exist. The flag is `true` when the sheet was just created.
    pub fn get_or_create(
        &mut self,
        title: &str,
        rows: u32,
        cols: u32,
    ) -> SyncResult<(SheetHandle, bool)> {
        if let Some(existing) = self.find_sheet(title)? {
            return Ok((SheetHandle::from_properties(&existing.properties)?, false));
        }

        debug!("Creating sheet '{}' ({}x{})", title, rows, cols);
        let request = Request::AddSheet(super::model::AddSheetRequest {
            properties: SheetProperties {
                title: Some(title.to_string()),
                grid_properties: Some(GridProperties {
                    row_count: Some(rows),
                    column_count: Some(cols),
                    hide_gridlines: None,
                }),
                ..Default::default()
            },
        });
        let replies = self.batch(CallClass::Write, "add sheet", vec![request])?;

        if let Some(added) = replies.into_iter().find_map(|r| r.add_sheet) {
            return Ok((SheetHandle::from_properties(&added.properties)?, true));
        }
        match self.find_sheet(title)? {
            Some(created) => Ok((SheetHandle::from_properties(&created.properties)?, true)),
            None => Err(SyncError::Api {
                status: 0,
                message: format!("sheet '{}' was not created", title),
            }),
        }
    }

    /// Grow the grid so `rows`×`cols` fits. Never shrinks.
    pub fn ensure_grid(&mut self, sheet: &mut SheetHandle, rows: u32, cols: u32) -> SyncResult<()> {
        if rows <= sheet.row_count && cols <= sheet.column_count {
            return Ok(());
        }
        let row_count = rows.max(sheet.row_count);
        let column_count = cols.max(sheet.column_count);
        let request = Request::UpdateSheetProperties(UpdateSheetPropertiesRequest {
            properties: SheetProperties {
                sheet_id: Some(sheet.id),
                grid_properties: Some(GridProperties {
                    row_count: Some(row_count),
                    column_count: Some(column_count),
                    hide_gridlines: None,
                }),
                ..Default::default()
            },
            fields: "gridProperties(rowCount,columnCount)".to_string(),
        });
        self.batch(CallClass::Format, "resize grid", vec![request])?;
        sheet.row_count = row_count;
        sheet.column_count = column_count;
        Ok(())
    }

    /// Clear every value of the sheet
    pub fn clear(&mut self, sheet: &SheetHandle) -> SyncResult<()> {
        let range = qualified(&sheet.title, "A:ZZZ");
        let api = &mut self.api;
        self.scheduler
            .execute(CallClass::Clear, "clear sheet", || api.clear_values(&range))
    }

    /// Drop every user-entered format of the sheet
    pub fn reset_formats(&mut self, sheet: &SheetHandle) -> SyncResult<()> {
        let request = Request::reset_format(sheet.full_region());
        self.batch(CallClass::Format, "reset formats", vec![request])
            .map(|_| ())
    }

    /// Unmerge the given regions
    pub fn unmerge(
        &mut self,
        sheet: &SheetHandle,
        merges: &[GridRange],
    ) -> SyncResult<CleanupOutcome> {
        if merges.is_empty() {
            return Ok(CleanupOutcome::NothingToClean);
        }
        let requests = merges
            .iter()
            .map(|m| Request::unmerge(GridRange { sheet_id: sheet.id, ..*m }))
            .collect();
        absorb_structural(
            "unmerge cells",
            self.batch(CallClass::Format, "unmerge cells", requests),
        )
    }

    /// Delete `count` conditional-format rules. Each deletion shifts the
    /// remaining rules down, so index 0 is deleted `count` times.
    pub fn delete_conditional_rules(
        &mut self,
        sheet: &SheetHandle,
        count: usize,
    ) -> SyncResult<CleanupOutcome> {
        if count == 0 {
            return Ok(CleanupOutcome::NothingToClean);
        }
        let requests = (0..count)
            .map(|_| {
                Request::DeleteConditionalFormatRule(DeleteConditionalFormatRuleRequest {
                    sheet_id: sheet.id,
                    index: 0,
                })
            })
            .collect();
        absorb_structural(
            "delete conditional rules",
            self.batch(CallClass::RuleDeletion, "delete conditional rules", requests),
        )
    }

    /// Delete embedded charts by id and drop data validation in `validation`
    pub fn delete_charts_and_validation(
        &mut self,
        charts: &[ChartRef],
        validation: GridRange,
    ) -> SyncResult<CleanupOutcome> {
        let mut requests: Vec<Request> = charts
            .iter()
            .map(|c| {
                Request::DeleteEmbeddedObject(DeleteEmbeddedObjectRequest {
                    object_id: c.chart_id,
                })
            })
            .collect();
        requests.push(Request::SetDataValidation(SetDataValidationRequest {
            range: validation,
            rule: None,
        }));
        absorb_structural(
            "delete charts and validation",
            self.batch(CallClass::Layout, "delete charts and validation", requests),
        )
    }

    /// Write `rows` with the top-left cell at `anchor`
    pub fn write(
        &mut self,
        sheet: &SheetHandle,
        anchor: &str,
        rows: Vec<Vec<CellInput>>,
        input: ValueInputOption,
    ) -> SyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = sheet.range(anchor);
        let api = &mut self.api;
        self.scheduler.execute(CallClass::Write, "write values", || {
            api.update_values(&range, &rows, input)
        })
    }

    /// Append `rows` after the sheet's last row, interpreting text as typed
    /// values
    pub fn append(&mut self, sheet: &SheetHandle, rows: Vec<Vec<CellInput>>) -> SyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let range = sheet.range("A1");
        let api = &mut self.api;
        self.scheduler.execute(CallClass::Write, "append rows", || {
            api.append_values(&range, &rows, ValueInputOption::UserEntered)
        })
    }

    pub fn read(&mut self, sheet_title: &str, a1: &str) -> SyncResult<Vec<Vec<String>>> {
        let range = qualified(sheet_title, a1);
        let api = &mut self.api;
        self.scheduler
            .execute(CallClass::Read, "read values", || api.get_values(&range))
    }
}

/// Treat "already in the desired state" rejections as success
fn absorb_structural<T>(what: &str, result: SyncResult<T>) -> SyncResult<CleanupOutcome> {
    match result {
        Ok(_) => Ok(CleanupOutcome::Cleaned),
        Err(err) if err.is_structural() => {
            warn!("{}: nothing to clean ({})", what, err);
            Ok(CleanupOutcome::NothingToClean)
        }
        Err(err) => Err(err),
    }
}
