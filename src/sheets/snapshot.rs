//! Live snapshot sheet: fully rewritten on every publish
//!
//! Sheet layout:
//!
//! ```text
//! row 1   A1:B1 merged title
//! row 2   Última actualización (Chile) | <local time>
//! row 3   Tiempo transcurrido:         | =NOW()-B2
//! row 6   header (display names)
//! row 7+  data
//! ```

use super::api::{CleanupOutcome, SheetsApi, Spreadsheet};
use super::cells::{escape_text, table_rows};
use super::model::{
    AddConditionalFormatRuleRequest, BooleanCondition, BooleanRule, CellFormat, CellInput,
    ConditionValue, ConditionalFormatRule, GridRange, Request, ValueInputOption,
};
use super::range::{cell_address, column_letter, to_grid_region};
use super::scheduler::CallClass;
use super::styles::{ConditionType, Style, StyleRegistry, DEFAULT_FORMAT_KIND};
use crate::config::{TabLayout, ThresholdRule};
use crate::error::SyncResult;
use crate::types::{Scalar, TabularDataset};
use tracing::{debug, info, info_span};

/// Grid of a newly created snapshot sheet
pub const NEW_SHEET_ROWS: u32 = 100;
pub const NEW_SHEET_COLUMNS: u32 = 20;

/// 1-based row of the table header
pub const HEADER_ROW: u32 = 6;

pub const LABEL_LAST_UPDATE: &str = "Última actualización (Chile)";
pub const LABEL_ELAPSED: &str = "Tiempo transcurrido:";

/// What one publish did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReport {
    pub sheet: String,
    pub rows: usize,
    pub merges_removed: CleanupOutcome,
    pub rules_removed: CleanupOutcome,
    pub rules_added: usize,
    pub merged_runs: usize,
}

/// Rewrites a snapshot sheet from a dataset
pub struct SnapshotPublisher<'a> {
    registry: &'a StyleRegistry,
}

impl<'a> SnapshotPublisher<'a> {
    pub fn new(registry: &'a StyleRegistry) -> Self {
        Self { registry }
    }

    /// Publish `dataset` into the layout's snapshot sheet.
    ///
    /// Returns `None` for an empty dataset, in which case no remote call is
    /// made at all.
    pub fn publish<A: SheetsApi>(
        &self,
        book: &mut Spreadsheet<A>,
        layout: &TabLayout,
        dataset: &TabularDataset,
        time_local: &str,
        time_utc: &str,
    ) -> SyncResult<Option<SnapshotReport>> {
        if dataset.is_empty() {
            debug!("Snapshot '{}': empty dataset, nothing to publish", layout.tab_name);
            return Ok(None);
        }

        let _span = info_span!("snapshot", sheet = %layout.tab_name, time_utc).entered();

        let (mut sheet, _) =
            book.get_or_create(&layout.tab_name, NEW_SHEET_ROWS, NEW_SHEET_COLUMNS)?;

        // reset to a blank sheet
        book.clear(&sheet)?;
        book.reset_formats(&sheet)?;
        let state = book.sheet_state(&sheet)?;
        let merges_removed = book.unmerge(&sheet, &state.merges)?;
        let rules_removed =
            book.delete_conditional_rules(&sheet, state.conditional_formats.len())?;

        let rows = dataset.row_count() as u32;
        let cols = dataset.column_count() as u32;
        book.ensure_grid(&mut sheet, HEADER_ROW + rows, cols.max(2))?;

        // metadata block
        book.write(
            &sheet,
            "A1",
            vec![
                vec![CellInput::Text(escape_text(&layout.title)), CellInput::Empty],
                vec![CellInput::text(LABEL_LAST_UPDATE), CellInput::text(time_local)],
                vec![CellInput::text(LABEL_ELAPSED), CellInput::text("=NOW()-B2")],
            ],
            ValueInputOption::UserEntered,
        )?;
        book.batch(
            CallClass::Format,
            "format metadata block",
            self.metadata_requests(sheet.id),
        )?;

        // table
        book.write(
            &sheet,
            &cell_address(HEADER_ROW, 1),
            table_rows(dataset),
            ValueInputOption::UserEntered,
        )?;

        book.batch(
            CallClass::Format,
            "apply number formats",
            self.number_format_requests(sheet.id, layout, dataset),
        )?;
        book.batch(
            CallClass::Format,
            "apply table styles",
            self.table_style_requests(sheet.id, rows, cols),
        )?;

        let rules = self.conditional_rule_requests(sheet.id, layout, dataset);
        let rules_added = rules.len();
        book.batch(CallClass::Format, "add conditional rules", rules)?;

        let merges = merge_requests(sheet.id, layout, dataset);
        let merged_runs = merges.len() / 2;
        book.batch(CallClass::Format, "merge repeated values", merges)?;

        info!(
            "📄 Snapshot '{}': {} rows, {} rules, {} merged runs",
            sheet.title, rows, rules_added, merged_runs
        );

        Ok(Some(SnapshotReport {
            sheet: sheet.title,
            rows: rows as usize,
            merges_removed,
            rules_removed,
            rules_added,
            merged_runs,
        }))
    }

    fn metadata_requests(&self, sheet_id: i64) -> Vec<Request> {
        let region = |a1: &str| to_grid_region(a1, sheet_id);
        let mut requests = vec![
            Request::merge_all(region("A1:B1")),
            Request::format(region("A1"), self.registry.lookup_style(Style::HeaderMain)),
            Request::format(
                region("A2:A3"),
                self.registry.lookup_style(Style::MetadataLabel),
            ),
            Request::format(
                region("B2:B3"),
                self.registry.lookup_style(Style::MetadataValue),
            ),
        ];
        for (cell, kind) in [("B2", "DATE_TIME"), ("B3", "DURATION")] {
            if let Some(fmt) = self.registry.lookup_format(kind) {
                requests.push(Request::format(region(cell), &CellFormat::number(fmt.clone())));
            }
        }
        requests
    }

    /// Number format per configured column, over the data rows only
    fn number_format_requests(
        &self,
        sheet_id: i64,
        layout: &TabLayout,
        dataset: &TabularDataset,
    ) -> Vec<Request> {
        let rows = dataset.row_count() as u32;
        dataset
            .column_names()
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                let spec = layout.column(name)?;
                let fmt = self.registry.lookup_format(&spec.format)?;
                Some(Request::format(
                    data_region(sheet_id, i as u32, rows),
                    &CellFormat::number(fmt.clone()),
                ))
            })
            .collect()
    }

    /// Base style over header and data, then the header style on top. The
    /// order matters: the header keeps the base borders but wins everywhere
    /// else.
    fn table_style_requests(&self, sheet_id: i64, rows: u32, cols: u32) -> Vec<Request> {
        let header = HEADER_ROW - 1;
        vec![
            Request::format(
                GridRange::bounded(sheet_id, (header, header + 1 + rows), (0, cols)),
                self.registry.lookup_style(Style::TableBase),
            ),
            Request::format(
                GridRange::bounded(sheet_id, (header, header + 1), (0, cols)),
                self.registry.lookup_style(Style::HeaderBlue),
            ),
        ]
    }

    fn conditional_rule_requests(
        &self,
        sheet_id: i64,
        layout: &TabLayout,
        dataset: &TabularDataset,
    ) -> Vec<Request> {
        let rows = dataset.row_count() as u32;
        let alert = self.registry.lookup_style(Style::AlertRed);
        let mut requests = Vec::new();

        for (i, name) in dataset.column_names().iter().enumerate() {
            let Some(spec) = layout.column(name) else {
                continue;
            };
            let Some(threshold) = &spec.threshold else {
                continue;
            };
            let first_cell = cell_address(HEADER_ROW + 1, i as u32 + 1);
            let Some(condition) =
                threshold_condition(self.registry, threshold, &spec.format, &first_cell)
            else {
                debug!(
                    "Column '{}': operator '{}' has no conditional rule",
                    name, threshold.operator
                );
                continue;
            };
            requests.push(Request::AddConditionalFormatRule(
                AddConditionalFormatRuleRequest {
                    rule: ConditionalFormatRule {
                        ranges: vec![data_region(sheet_id, i as u32, rows)],
                        boolean_rule: Some(BooleanRule {
                            condition,
                            format: alert.clone(),
                        }),
                    },
                    index: 0,
                },
            ));
        }
        requests
    }
}

/// Data rows of one zero-based column
fn data_region(sheet_id: i64, col: u32, rows: u32) -> GridRange {
    GridRange::bounded(sheet_id, (HEADER_ROW, HEADER_ROW + rows), (col, col + 1))
}

/// Condition for a threshold, or `None` when the operator is unsupported.
///
/// `!=` becomes a custom formula on the column's first data cell, with the
/// value quoted for text columns:
/// `=TRIM(C7)<>"online"`.
pub fn threshold_condition(
    registry: &StyleRegistry,
    rule: &ThresholdRule,
    column_format: &str,
    first_cell: &str,
) -> Option<BooleanCondition> {
    if rule.operator == "!=" {
        let value = rule.value.as_ref()?.render();
        let operand = if column_format == DEFAULT_FORMAT_KIND {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value
        };
        return Some(BooleanCondition {
            kind: ConditionType::CustomFormula.as_str().to_string(),
            values: vec![ConditionValue::new(format!(
                "=TRIM({})<>{}",
                first_cell, operand
            ))],
        });
    }

    let kind = registry.lookup_condition(&rule.operator)?;
    let values = if kind.arity() == 2 {
        vec![
            ConditionValue::new(render_bound(rule.min?)),
            ConditionValue::new(render_bound(rule.max?)),
        ]
    } else {
        vec![ConditionValue::new(rule.value.as_ref()?.render())]
    };
    Some(BooleanCondition {
        kind: kind.as_str().to_string(),
        values,
    })
}

fn render_bound(n: f64) -> String {
    crate::config::ThresholdValue::Number(n).render()
}

/// Maximal runs (start, length) of equal adjacent values; nulls never merge
pub fn repeated_runs(values: &[Scalar]) -> Vec<(usize, usize)> {
    let key = |s: &Scalar| match s {
        Scalar::Text(t) => Some(t.trim().to_string()),
        Scalar::Number(n) => Some(n.to_string()),
        Scalar::Timestamp(ts) => Some(ts.to_string()),
        Scalar::Null => None,
    };

    let mut runs = Vec::new();
    let mut start = 0;
    while start < values.len() {
        let current = key(&values[start]);
        let mut end = start + 1;
        if current.is_some() {
            while end < values.len() && key(&values[end]) == current {
                end += 1;
            }
        }
        if end - start >= 2 {
            runs.push((start, end - start));
        }
        start = end;
    }
    runs
}

/// Merge + vertical centering for every repeated run of the merge column
fn merge_requests(sheet_id: i64, layout: &TabLayout, dataset: &TabularDataset) -> Vec<Request> {
    let Some(merge_column) = layout.merge_column.as_deref() else {
        return Vec::new();
    };
    let Some(col) = dataset.position(merge_column) else {
        debug!("Merge column '{}' is not in the dataset", merge_column);
        return Vec::new();
    };
    let values: Vec<Scalar> = (0..dataset.row_count())
        .map(|i| dataset.columns[col].values.get(i))
        .collect();

    let col = col as u32;
    let middle = CellFormat::vertical("MIDDLE");
    let mut requests = Vec::new();
    for (start, len) in repeated_runs(&values) {
        let first = HEADER_ROW + start as u32;
        let range = GridRange::bounded(sheet_id, (first, first + len as u32), (col, col + 1));
        debug!(
            "Merging {}{}:{}{}",
            column_letter(col + 1),
            first + 1,
            column_letter(col + 1),
            first + len as u32
        );
        requests.push(Request::merge_all(range));
        requests.push(Request::format(range, &middle));
    }
    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThresholdValue;

    fn rule(operator: &str, value: Option<ThresholdValue>) -> ThresholdRule {
        ThresholdRule {
            operator: operator.to_string(),
            value,
            min: None,
            max: None,
        }
    }

    #[test]
    fn test_not_equal_on_text_is_quoted_formula() {
        let registry = StyleRegistry::standard();
        let cond = threshold_condition(
            &registry,
            &rule("!=", Some(ThresholdValue::Text("online".to_string()))),
            "TEXT",
            "C7",
        )
        .unwrap();
        assert_eq!(cond.kind, "CUSTOM_FORMULA");
        assert_eq!(cond.values[0].user_entered_value, "=TRIM(C7)<>\"online\"");
    }

    #[test]
    fn test_not_equal_on_number_is_bare() {
        let registry = StyleRegistry::standard();
        let cond = threshold_condition(
            &registry,
            &rule("!=", Some(ThresholdValue::Number(0.0))),
            "INTEGER",
            "D7",
        )
        .unwrap();
        assert_eq!(cond.values[0].user_entered_value, "=TRIM(D7)<>0");
    }

    #[test]
    fn test_between_has_two_values() {
        let registry = StyleRegistry::standard();
        let between = ThresholdRule {
            operator: "between".to_string(),
            value: None,
            min: Some(10.0),
            max: Some(70.5),
        };
        let cond = threshold_condition(&registry, &between, "NUMBER", "B7").unwrap();
        assert_eq!(cond.kind, "NUMBER_BETWEEN");
        let values: Vec<&str> = cond
            .values
            .iter()
            .map(|v| v.user_entered_value.as_str())
            .collect();
        assert_eq!(values, vec!["10", "70.5"]);
    }

    #[test]
    fn test_unsupported_operator_has_no_condition() {
        let registry = StyleRegistry::standard();
        assert!(threshold_condition(
            &registry,
            &rule("~=", Some(ThresholdValue::Number(1.0))),
            "NUMBER",
            "B7"
        )
        .is_none());
    }

    #[test]
    fn test_repeated_runs() {
        let t = |s: &str| Scalar::Text(s.to_string());
        let values = vec![t("S1"), t("S1 "), t("S2"), t("S3"), t("S3"), t("S3")];
        assert_eq!(repeated_runs(&values), vec![(0, 2), (3, 3)]);
        assert!(repeated_runs(&[t("a"), t("b")]).is_empty());
        assert!(repeated_runs(&[Scalar::Null, Scalar::Null]).is_empty());
        assert!(repeated_runs(&[]).is_empty());
    }
}
