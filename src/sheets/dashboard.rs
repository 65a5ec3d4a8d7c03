//! Dashboard sheet: per-entity selectors, a live FILTER formula over the
//! history sheet and one line chart per panel
//!
//! Panel `i` occupies:
//! - selector row `3 + 25·i` (label `B`, instance dropdown `C`, label `E`,
//!   metric dropdown `F`)
//! - helper columns starting at `AA + 3·i` (`Fecha | Valor` on row 4, the
//!   formula on row 5)
//! - a chart anchored at `B(6 + 25·i)`

use super::api::{SheetHandle, SheetsApi, Spreadsheet};
use super::cells::escape_text;
use super::model::{
    AddChartRequest, BasicChartAxis, BasicChartDomain, BasicChartSeries, BasicChartSpec,
    BooleanCondition, CellFormat, CellInput, ChartData, ChartSpec, ConditionValue,
    DataValidationRule, EmbeddedChart, EmbeddedObjectPosition, GridCoordinate, GridProperties,
    GridRange, OverlayPosition, Request, SetDataValidationRequest, SheetProperties,
    UpdateSheetPropertiesRequest, ValueInputOption,
};
use super::range::{cell_address, column_letter, qualified, to_grid_region};
use super::scheduler::CallClass;
use super::styles::{Style, StyleRegistry};
use crate::config::{DashboardLayout, Layout, PanelLayout, TabLayout};
use crate::error::SyncResult;
use tracing::{info, info_span, warn};

pub const DASHBOARD_ROWS: u32 = 1000;
pub const DASHBOARD_COLUMNS: u32 = 35;

/// Rows between two panels
pub const PANEL_STRIDE: u32 = 25;
/// 1-based row of the first selector
pub const FIRST_SELECTOR_ROW: u32 = 3;
/// 1-based column of the first helper column (`AA`)
pub const FIRST_HELPER_COLUMN: u32 = 27;
/// 1-based row of the helper header
pub const HELPER_HEADER_ROW: u32 = 4;

/// Region swept for stale dropdowns (`A1:AX1000`)
const VALIDATION_SWEEP: (u32, u32) = (1000, 50);

const HELPER_TIME_PATTERN: &str = "yyyy-mm-dd hh:mm";

/// Cell coordinates of one panel (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelGeometry {
    pub selector_row: u32,
    pub helper_column: u32,
    pub chart_row: u32,
}

impl PanelGeometry {
    pub fn for_index(index: u32) -> Self {
        Self {
            selector_row: FIRST_SELECTOR_ROW + PANEL_STRIDE * index,
            helper_column: FIRST_HELPER_COLUMN + 3 * index,
            chart_row: FIRST_SELECTOR_ROW + 3 + PANEL_STRIDE * index,
        }
    }

    pub fn instance_cell(&self) -> String {
        cell_address(self.selector_row, 3)
    }

    pub fn metric_cell(&self) -> String {
        cell_address(self.selector_row, 6)
    }

    pub fn value_column(&self) -> u32 {
        self.helper_column + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardReport {
    pub sheet: String,
    pub panels: usize,
    pub skipped: Vec<String>,
}

/// A panel with everything it needs resolved
struct ResolvedPanel<'l> {
    panel: &'l PanelLayout,
    history_tab: &'l str,
    tab: &'l TabLayout,
    geometry: PanelGeometry,
}

/// Rebuilds the dashboard sheet from scratch
pub struct DashboardBuilder<'a> {
    registry: &'a StyleRegistry,
    layout: &'a Layout,
}

impl<'a> DashboardBuilder<'a> {
    pub fn new(registry: &'a StyleRegistry, layout: &'a Layout) -> Self {
        Self { registry, layout }
    }

    /// Build the dashboard. Returns `None` when the layout has no dashboard.
    pub fn build<A: SheetsApi>(
        &self,
        book: &mut Spreadsheet<A>,
    ) -> SyncResult<Option<DashboardReport>> {
        let Some(dashboard) = &self.layout.dashboard else {
            return Ok(None);
        };
        let _span = info_span!("dashboard", sheet = %dashboard.tab_name).entered();

        let (panels, skipped) = self.resolve_panels(dashboard);

        book.scheduler_mut().cool_down();

        let last_helper = panels
            .last()
            .map_or(0, |p| p.geometry.value_column());
        let sheet = self.prepare_sheet(book, dashboard, last_helper.max(DASHBOARD_COLUMNS))?;

        book.batch(
            CallClass::Layout,
            "dashboard layout",
            self.layout_requests(sheet.id, &panels),
        )?;
        self.write_values(book, &sheet, dashboard, &panels)?;
        book.batch(
            CallClass::Layout,
            "dashboard selectors",
            selector_requests(sheet.id, &panels),
        )?;
        book.batch(
            CallClass::Format,
            "format helper columns",
            helper_format_requests(sheet.id, &panels),
        )?;
        book.batch(
            CallClass::Chart,
            "add dashboard charts",
            chart_requests(sheet.id, &panels),
        )?;

        info!("📊 Dashboard '{}': {} panels", sheet.title, panels.len());
        Ok(Some(DashboardReport {
            sheet: sheet.title,
            panels: panels.len(),
            skipped,
        }))
    }

    fn resolve_panels<'l>(
        &'l self,
        dashboard: &'l DashboardLayout,
    ) -> (Vec<ResolvedPanel<'l>>, Vec<String>) {
        let mut resolved = Vec::new();
        let mut skipped = Vec::new();
        for panel in &dashboard.panels {
            let tab = self.layout.entity(&panel.entity);
            match tab.and_then(|t| t.history_tab.as_deref().map(|h| (t, h))) {
                Some((tab, history_tab)) => {
                    let geometry = PanelGeometry::for_index(resolved.len() as u32);
                    resolved.push(ResolvedPanel {
                        panel,
                        history_tab,
                        tab,
                        geometry,
                    });
                }
                None => {
                    warn!(
                        "Dashboard panel '{}' skipped: entity has no history sheet",
                        panel.entity
                    );
                    skipped.push(panel.entity.clone());
                }
            }
        }
        (resolved, skipped)
    }

    /// Resolve or create the sheet and bring it back to a blank state
    fn prepare_sheet<A: SheetsApi>(
        &self,
        book: &mut Spreadsheet<A>,
        dashboard: &DashboardLayout,
        columns: u32,
    ) -> SyncResult<SheetHandle> {
        let (mut sheet, created) =
            book.get_or_create(&dashboard.tab_name, DASHBOARD_ROWS, columns)?;
        book.ensure_grid(&mut sheet, DASHBOARD_ROWS, columns)?;

        if !created {
            book.clear(&sheet)?;
            book.reset_formats(&sheet)?;
            let state = book.sheet_state(&sheet)?;
            book.unmerge(&sheet, &state.merges)?;
            let sweep = GridRange::bounded(
                sheet.id,
                (0, VALIDATION_SWEEP.0.min(sheet.row_count)),
                (0, VALIDATION_SWEEP.1.min(sheet.column_count)),
            );
            book.delete_charts_and_validation(&state.charts, sweep)?;
        }

        let request = Request::UpdateSheetProperties(UpdateSheetPropertiesRequest {
            properties: SheetProperties {
                sheet_id: Some(sheet.id),
                index: Some(0),
                grid_properties: Some(GridProperties {
                    hide_gridlines: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            fields: "index,gridProperties.hideGridlines".to_string(),
        });
        book.batch(CallClass::Format, "move dashboard first", vec![request])?;
        Ok(sheet)
    }

    fn layout_requests(&self, sheet_id: i64, panels: &[ResolvedPanel]) -> Vec<Request> {
        let region = |a1: &str| to_grid_region(a1, sheet_id);
        let label = self.registry.lookup_style(Style::LabelBold);
        let mut requests = vec![
            Request::merge_all(region("A1:Z1")),
            Request::format(
                region("A1"),
                self.registry.lookup_style(Style::HeaderDashboard),
            ),
            Request::format(
                region("A2:Z100"),
                self.registry.lookup_style(Style::DashboardBackground),
            ),
        ];
        for p in panels {
            let row = p.geometry.selector_row;
            requests.push(Request::format(region(&cell_address(row, 2)), label));
            requests.push(Request::format(region(&cell_address(row, 5)), label));
        }
        requests
    }

    fn write_values<A: SheetsApi>(
        &self,
        book: &mut Spreadsheet<A>,
        sheet: &SheetHandle,
        dashboard: &DashboardLayout,
        panels: &[ResolvedPanel],
    ) -> SyncResult<()> {
        book.write(
            sheet,
            "A1",
            vec![vec![CellInput::Text(escape_text(&dashboard.title))]],
            ValueInputOption::UserEntered,
        )?;

        for p in panels {
            let instance = default_instance(book, p)?;
            let metric = p.tab.numeric_metrics().first().map(|m| escape_text(m));
            let text = |s: &str| CellInput::Text(escape_text(s));
            book.write(
                sheet,
                &cell_address(p.geometry.selector_row, 2),
                vec![vec![
                    text(&p.panel.instance_label),
                    instance.map_or(CellInput::Empty, CellInput::Text),
                    CellInput::Empty,
                    text(&p.panel.metric_label),
                    metric.map_or(CellInput::Empty, CellInput::Text),
                ]],
                ValueInputOption::UserEntered,
            )?;
            book.write(
                sheet,
                &cell_address(HELPER_HEADER_ROW, p.geometry.helper_column),
                vec![
                    vec![CellInput::text("Fecha"), CellInput::text("Valor")],
                    vec![CellInput::Text(helper_formula(p)), CellInput::Empty],
                ],
                ValueInputOption::UserEntered,
            )?;
        }
        Ok(())
    }
}

/// First value of the instance column of the history sheet (row 2 on).
/// A history sheet that does not exist yet just means "no default".
fn default_instance<A: SheetsApi>(
    book: &mut Spreadsheet<A>,
    p: &ResolvedPanel,
) -> SyncResult<Option<String>> {
    let col = column_letter(p.panel.instance_column);
    match book.read(p.history_tab, &format!("{}2:{}", col, col)) {
        Ok(rows) => Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|v| escape_text(v.trim()))
            .find(|v| !v.is_empty())),
        Err(err) if err.is_structural() => {
            warn!("No default instance from '{}': {}", p.history_tab, err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// `=IFERROR(SORT(FILTER(HSTACK(<time col>, <metric col>), <instance col> = C<r>), 1, TRUE), "")`
///
/// Columns are picked by header text on row 1 of the history sheet, so the
/// formula follows whatever metric is selected in `F<r>`.
pub fn helper_formula_for(
    history_tab: &str,
    history_width: usize,
    timestamp_column: &str,
    instance_column: u32,
    selector_row: u32,
) -> String {
    let last = column_letter((history_width as u32).max(26));
    let table = qualified(history_tab, &format!("A:{}", last));
    let header = qualified(history_tab, "1:1");
    let inst = column_letter(instance_column);
    let instances = qualified(history_tab, &format!("{}:{}", inst, inst));
    format!(
        "=IFERROR(SORT(FILTER(HSTACK(CHOOSECOLS({table}, XMATCH(\"{ts}\", {header})), \
         CHOOSECOLS({table}, XMATCH(F{row}, {header}))), {instances} = C{row}), 1, TRUE), \"\")",
        table = table,
        ts = timestamp_column.replace('"', "\"\""),
        header = header,
        row = selector_row,
        instances = instances,
    )
}

fn helper_formula(p: &ResolvedPanel) -> String {
    helper_formula_for(
        p.history_tab,
        p.tab.columns.len(),
        &p.panel.timestamp_column,
        p.panel.instance_column,
        p.geometry.selector_row,
    )
}

fn selector_requests(sheet_id: i64, panels: &[ResolvedPanel]) -> Vec<Request> {
    let mut requests = Vec::new();
    for p in panels {
        let col = column_letter(p.panel.instance_column);
        requests.push(Request::SetDataValidation(SetDataValidationRequest {
            range: to_grid_region(&p.geometry.instance_cell(), sheet_id),
            rule: Some(DataValidationRule {
                condition: BooleanCondition {
                    kind: "ONE_OF_RANGE".to_string(),
                    values: vec![ConditionValue::new(format!(
                        "={}",
                        qualified(p.history_tab, &format!("{}2:{}", col, col))
                    ))],
                },
                show_custom_ui: true,
            }),
        }));

        let metrics = p.tab.numeric_metrics();
        if metrics.is_empty() {
            warn!(
                "Dashboard panel '{}': no numeric columns to offer as metrics",
                p.panel.entity
            );
            continue;
        }
        requests.push(Request::SetDataValidation(SetDataValidationRequest {
            range: to_grid_region(&p.geometry.metric_cell(), sheet_id),
            rule: Some(DataValidationRule {
                condition: BooleanCondition {
                    kind: "ONE_OF_LIST".to_string(),
                    values: metrics.into_iter().map(ConditionValue::new).collect(),
                },
                show_custom_ui: true,
            }),
        }));
    }
    requests
}

fn helper_format_requests(sheet_id: i64, panels: &[ResolvedPanel]) -> Vec<Request> {
    let format = CellFormat::number(super::model::NumberFormat::new(
        "DATE_TIME",
        Some(HELPER_TIME_PATTERN),
    ));
    panels
        .iter()
        .map(|p| {
            let col = p.geometry.helper_column - 1;
            Request::format(
                GridRange::bounded(sheet_id, (HELPER_HEADER_ROW, DASHBOARD_ROWS), (col, col + 1)),
                &format,
            )
        })
        .collect()
}

fn chart_requests(sheet_id: i64, panels: &[ResolvedPanel]) -> Vec<Request> {
    // source ranges start at the helper header so it becomes the legend
    let source = |col: u32| {
        GridRange::bounded(
            sheet_id,
            (HELPER_HEADER_ROW - 1, DASHBOARD_ROWS),
            (col - 1, col),
        )
    };
    panels
        .iter()
        .map(|p| {
            Request::AddChart(AddChartRequest {
                chart: EmbeddedChart {
                    chart_id: None,
                    spec: ChartSpec {
                        title: p.panel.chart_title.clone(),
                        basic_chart: BasicChartSpec {
                            chart_type: "LINE".to_string(),
                            legend_position: "BOTTOM_LEGEND".to_string(),
                            axis: vec![
                                BasicChartAxis {
                                    position: "BOTTOM_AXIS".to_string(),
                                    title: Some("Fecha".to_string()),
                                },
                                BasicChartAxis {
                                    position: "LEFT_AXIS".to_string(),
                                    title: None,
                                },
                            ],
                            domains: vec![BasicChartDomain {
                                domain: ChartData::from_range(source(p.geometry.helper_column)),
                            }],
                            series: vec![BasicChartSeries {
                                series: ChartData::from_range(source(p.geometry.value_column())),
                                target_axis: "LEFT_AXIS".to_string(),
                            }],
                            header_count: 1,
                            interpolate_nulls: true,
                        },
                    },
                    position: EmbeddedObjectPosition {
                        overlay_position: OverlayPosition {
                            anchor_cell: GridCoordinate {
                                sheet_id,
                                row_index: p.geometry.chart_row - 1,
                                column_index: 1,
                            },
                        },
                    },
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_geometry() {
        let first = PanelGeometry::for_index(0);
        assert_eq!(first.instance_cell(), "C3");
        assert_eq!(first.metric_cell(), "F3");
        assert_eq!(column_letter(first.helper_column), "AA");
        assert_eq!(first.chart_row, 6);

        let second = PanelGeometry::for_index(1);
        assert_eq!(second.instance_cell(), "C28");
        assert_eq!(column_letter(second.helper_column), "AD");
        assert_eq!(column_letter(second.value_column()), "AE");
        assert_eq!(second.chart_row, 31);
    }

    #[test]
    fn test_helper_formula() {
        let formula = helper_formula_for("Historial Servidores", 8, "Fecha consulta", 1, 3);
        assert_eq!(
            formula,
            "=IFERROR(SORT(FILTER(HSTACK(\
             CHOOSECOLS('Historial Servidores'!A:Z, XMATCH(\"Fecha consulta\", 'Historial Servidores'!1:1)), \
             CHOOSECOLS('Historial Servidores'!A:Z, XMATCH(F3, 'Historial Servidores'!1:1))), \
             'Historial Servidores'!A:A = C3), 1, TRUE), \"\")"
        );
    }

    #[test]
    fn test_helper_formula_wide_history_and_second_column() {
        let formula = helper_formula_for("H", 30, "Fecha - hora consulta", 2, 28);
        assert!(formula.contains("'H'!A:AD"));
        assert!(formula.contains("'H'!B:B = C28"));
        assert!(formula.contains("XMATCH(F28, 'H'!1:1)"));
    }
}
