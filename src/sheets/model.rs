//! Wire types for the Google Sheets v4 API
//!
//! Only the subset of the API vocabulary the publishers use is modelled.
//! Everything serializes to the exact JSON the `batchUpdate` and `values`
//! endpoints expect (camelCase, absent optionals omitted).

use serde::{Deserialize, Serialize};

//==============================================================================
// Cell formats
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    #[serde(default)]
    pub red: f64,
    #[serde(default)]
    pub green: f64,
    #[serde(default)]
    pub blue: f64,
}

impl Color {
    pub const fn rgb(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Border {
    pub style: String,
}

impl Border {
    pub fn solid() -> Self {
        Self {
            style: "SOLID".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Borders {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<Border>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<Border>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<Border>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<Border>,
}

impl Borders {
    pub fn solid() -> Self {
        Self {
            top: Some(Border::solid()),
            bottom: Some(Border::solid()),
            left: Some(Border::solid()),
            right: Some(Border::solid()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberFormat {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl NumberFormat {
    pub fn new(kind: &str, pattern: Option<&str>) -> Self {
        Self {
            kind: kind.to_string(),
            pattern: pattern.map(str::to_string),
        }
    }
}

/// `userEnteredFormat` of a cell. Unset fields are left untouched when the
/// format is applied through a field mask.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_format: Option<NumberFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub borders: Option<Borders>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_format: Option<TextFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_alignment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_alignment: Option<String>,
}

impl CellFormat {
    pub fn number(format: NumberFormat) -> Self {
        Self {
            number_format: Some(format),
            ..Default::default()
        }
    }

    pub fn vertical(alignment: &str) -> Self {
        Self {
            vertical_alignment: Some(alignment.to_string()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == CellFormat::default()
    }

    fn set_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.number_format.is_some() {
            fields.push("numberFormat");
        }
        if self.background_color.is_some() {
            fields.push("backgroundColor");
        }
        if self.borders.is_some() {
            fields.push("borders");
        }
        if self.text_format.is_some() {
            fields.push("textFormat");
        }
        if self.horizontal_alignment.is_some() {
            fields.push("horizontalAlignment");
        }
        if self.vertical_alignment.is_some() {
            fields.push("verticalAlignment");
        }
        fields
    }

    /// Field mask for a `repeatCell` request. An empty format resets the
    /// whole `userEnteredFormat`.
    pub fn fields_mask(&self) -> String {
        let fields = self.set_fields();
        if fields.is_empty() {
            "userEnteredFormat".to_string()
        } else {
            format!("userEnteredFormat({})", fields.join(","))
        }
    }

    /// Apply `other` on top of `self`: every field set in `other` replaces
    /// the current one, the rest are kept.
    pub fn overlay(&mut self, other: &CellFormat) {
        if other.number_format.is_some() {
            self.number_format = other.number_format.clone();
        }
        if other.background_color.is_some() {
            self.background_color = other.background_color;
        }
        if other.borders.is_some() {
            self.borders = other.borders.clone();
        }
        if other.text_format.is_some() {
            self.text_format = other.text_format.clone();
        }
        if other.horizontal_alignment.is_some() {
            self.horizontal_alignment = other.horizontal_alignment.clone();
        }
        if other.vertical_alignment.is_some() {
            self.vertical_alignment = other.vertical_alignment.clone();
        }
    }
}

//==============================================================================
// Grid addressing
//==============================================================================

/// Zero-based, half-open rectangle. Missing bounds mean "unbounded".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRange {
    #[serde(default)]
    pub sheet_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_row_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_row_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_column_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column_index: Option<u32>,
}

impl GridRange {
    pub fn bounded(sheet_id: i64, rows: (u32, u32), cols: (u32, u32)) -> Self {
        Self {
            sheet_id,
            start_row_index: Some(rows.0),
            end_row_index: Some(rows.1),
            start_column_index: Some(cols.0),
            end_column_index: Some(cols.1),
        }
    }

    pub fn height(&self) -> Option<u32> {
        Some(self.end_row_index? - self.start_row_index.unwrap_or(0))
    }

    /// Does the zero-based cell (row, col) fall inside this region?
    pub fn contains(&self, row: u32, col: u32) -> bool {
        row >= self.start_row_index.unwrap_or(0)
            && self.end_row_index.map_or(true, |end| row < end)
            && col >= self.start_column_index.unwrap_or(0)
            && self.end_column_index.map_or(true, |end| col < end)
    }

    /// Do two regions share at least one cell?
    pub fn intersects(&self, other: &GridRange) -> bool {
        let rows = ranges_overlap(
            self.start_row_index.unwrap_or(0),
            self.end_row_index,
            other.start_row_index.unwrap_or(0),
            other.end_row_index,
        );
        let cols = ranges_overlap(
            self.start_column_index.unwrap_or(0),
            self.end_column_index,
            other.start_column_index.unwrap_or(0),
            other.end_column_index,
        );
        rows && cols
    }
}

fn ranges_overlap(a_start: u32, a_end: Option<u32>, b_start: u32, b_end: Option<u32>) -> bool {
    a_end.map_or(true, |end| b_start < end) && b_end.map_or(true, |end| a_start < end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCoordinate {
    pub sheet_id: i64,
    pub row_index: u32,
    pub column_index: u32,
}

//==============================================================================
// Sheet properties and metadata
//==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_gridlines: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_properties: Option<GridProperties>,
}

impl SheetProperties {
    pub fn row_count(&self) -> u32 {
        self.grid_properties
            .and_then(|g| g.row_count)
            .unwrap_or(0)
    }

    pub fn column_count(&self) -> u32 {
        self.grid_properties
            .and_then(|g| g.column_count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    pub chart_id: i64,
}

/// One entry of `spreadsheets.get` restricted to what cleanup needs
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetMetadata {
    pub properties: SheetProperties,
    #[serde(default)]
    pub conditional_formats: Vec<ConditionalFormatRule>,
    #[serde(default)]
    pub charts: Vec<ChartRef>,
    #[serde(default)]
    pub merges: Vec<GridRange>,
}

impl SheetMetadata {
    pub fn sheet_id(&self) -> i64 {
        self.properties.sheet_id.unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.properties.title.as_deref().unwrap_or_default()
    }
}

//==============================================================================
// Conditional formats and data validation
//==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionValue {
    pub user_entered_value: String,
}

impl ConditionValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            user_entered_value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanCondition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ConditionValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BooleanRule {
    pub condition: BooleanCondition,
    #[serde(default)]
    pub format: CellFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalFormatRule {
    #[serde(default)]
    pub ranges: Vec<GridRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boolean_rule: Option<BooleanRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValidationRule {
    pub condition: BooleanCondition,
    pub show_custom_ui: bool,
}

//==============================================================================
// Charts
//==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSourceRange {
    pub sources: Vec<GridRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub source_range: ChartSourceRange,
}

impl ChartData {
    pub fn from_range(range: GridRange) -> Self {
        Self {
            source_range: ChartSourceRange {
                sources: vec![range],
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicChartAxis {
    pub position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicChartDomain {
    pub domain: ChartData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicChartSeries {
    pub series: ChartData,
    pub target_axis: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicChartSpec {
    pub chart_type: String,
    pub legend_position: String,
    pub axis: Vec<BasicChartAxis>,
    pub domains: Vec<BasicChartDomain>,
    pub series: Vec<BasicChartSeries>,
    pub header_count: u32,
    pub interpolate_nulls: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    pub title: String,
    pub basic_chart: BasicChartSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayPosition {
    pub anchor_cell: GridCoordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedObjectPosition {
    pub overlay_position: OverlayPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedChart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_id: Option<i64>,
    pub spec: ChartSpec,
    pub position: EmbeddedObjectPosition,
}

//==============================================================================
// batchUpdate requests
//==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddSheetRequest {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateSheetPropertiesRequest {
    pub properties: SheetProperties,
    pub fields: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCellsRequest {
    pub range: GridRange,
    pub merge_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmergeCellsRequest {
    pub range: GridRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteConditionalFormatRuleRequest {
    pub sheet_id: i64,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddConditionalFormatRuleRequest {
    pub rule: ConditionalFormatRule,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellData {
    pub user_entered_format: CellFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatCellRequest {
    pub range: GridRange,
    pub cell: CellData,
    pub fields: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetDataValidationRequest {
    pub range: GridRange,
    /// `None` removes validation from the range
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<DataValidationRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddChartRequest {
    pub chart: EmbeddedChart,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEmbeddedObjectRequest {
    pub object_id: i64,
}

/// One element of a `spreadsheets.batchUpdate` call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Request {
    AddSheet(AddSheetRequest),
    UpdateSheetProperties(UpdateSheetPropertiesRequest),
    MergeCells(MergeCellsRequest),
    UnmergeCells(UnmergeCellsRequest),
    DeleteConditionalFormatRule(DeleteConditionalFormatRuleRequest),
    AddConditionalFormatRule(AddConditionalFormatRuleRequest),
    RepeatCell(RepeatCellRequest),
    SetDataValidation(SetDataValidationRequest),
    AddChart(AddChartRequest),
    DeleteEmbeddedObject(DeleteEmbeddedObjectRequest),
}

impl Request {
    /// `repeatCell` carrying `format` with the matching field mask
    pub fn format(range: GridRange, format: &CellFormat) -> Self {
        Request::RepeatCell(RepeatCellRequest {
            range,
            fields: format.fields_mask(),
            cell: CellData {
                user_entered_format: format.clone(),
            },
        })
    }

    /// Reset every format in `range`
    pub fn reset_format(range: GridRange) -> Self {
        Request::format(range, &CellFormat::default())
    }

    pub fn merge_all(range: GridRange) -> Self {
        Request::MergeCells(MergeCellsRequest {
            range,
            merge_type: "MERGE_ALL".to_string(),
        })
    }

    pub fn unmerge(range: GridRange) -> Self {
        Request::UnmergeCells(UnmergeCellsRequest { range })
    }

    /// Short name used in logs and call records
    pub fn kind(&self) -> &'static str {
        match self {
            Request::AddSheet(_) => "addSheet",
            Request::UpdateSheetProperties(_) => "updateSheetProperties",
            Request::MergeCells(_) => "mergeCells",
            Request::UnmergeCells(_) => "unmergeCells",
            Request::DeleteConditionalFormatRule(_) => "deleteConditionalFormatRule",
            Request::AddConditionalFormatRule(_) => "addConditionalFormatRule",
            Request::RepeatCell(_) => "repeatCell",
            Request::SetDataValidation(_) => "setDataValidation",
            Request::AddChart(_) => "addChart",
            Request::DeleteEmbeddedObject(_) => "deleteEmbeddedObject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AddSheetReply {
    pub properties: SheetProperties,
}

/// One element of the `replies` array of a batchUpdate response
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default)]
    pub add_sheet: Option<AddSheetReply>,
}

//==============================================================================
// Values
//==============================================================================

/// A value written through the `values` endpoints. `Empty` travels as JSON
/// `null`, which the API treats as "no data" (never as 0 or "").
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellInput {
    Number(f64),
    Text(String),
    Empty,
}

impl CellInput {
    pub fn text(value: impl Into<String>) -> Self {
        CellInput::Text(value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInputOption {
    /// Stored exactly as sent
    Raw,
    /// Parsed as if typed into the UI (formulas, dates)
    UserEntered,
}

impl ValueInputOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueInputOption::Raw => "RAW",
            ValueInputOption::UserEntered => "USER_ENTERED",
        }
    }
}
