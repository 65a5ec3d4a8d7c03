//! Number formats, cell styles and threshold conditions
//!
//! The registry is built once (`StyleRegistry::standard`) and shared by
//! reference with the publishers. Lookups never fail: an unknown format kind
//! or operator simply means "nothing to apply".

use super::model::{Borders, CellFormat, Color, NumberFormat, TextFormat};
use std::collections::HashMap;

/// Format kind used when a column does not declare one
pub const DEFAULT_FORMAT_KIND: &str = "TEXT";

/// Format kinds offered as dashboard metrics
pub const NUMERIC_FORMAT_KINDS: [&str; 3] = ["NUMBER", "INTEGER", "PERCENT"];

const BLUE: Color = Color::rgb(0.258, 0.52, 0.956);
const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);

/// Named cell styles used by the snapshot, history and dashboard sheets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    HeaderMain,
    MetadataLabel,
    HeaderBlue,
    TableBase,
    MetadataValue,
    AlertRed,
    HeaderDashboard,
    DashboardBackground,
    LabelBold,
}

/// Remote conditional-format condition types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionType {
    NumberGreater,
    NumberGreaterThanEq,
    NumberLess,
    NumberLessThanEq,
    TextEq,
    NumberBetween,
    NumberNotBetween,
    CustomFormula,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::NumberGreater => "NUMBER_GREATER",
            ConditionType::NumberGreaterThanEq => "NUMBER_GREATER_THAN_EQ",
            ConditionType::NumberLess => "NUMBER_LESS",
            ConditionType::NumberLessThanEq => "NUMBER_LESS_THAN_EQ",
            ConditionType::TextEq => "TEXT_EQ",
            ConditionType::NumberBetween => "NUMBER_BETWEEN",
            ConditionType::NumberNotBetween => "NUMBER_NOT_BETWEEN",
            ConditionType::CustomFormula => "CUSTOM_FORMULA",
        }
    }

    /// Number of comparison values the condition takes
    pub fn arity(&self) -> usize {
        match self {
            ConditionType::NumberBetween | ConditionType::NumberNotBetween => 2,
            _ => 1,
        }
    }
}

/// Immutable lookup tables for formats, styles and conditions
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    formats: HashMap<&'static str, NumberFormat>,
    styles: HashMap<Style, CellFormat>,
    conditions: HashMap<&'static str, ConditionType>,
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl StyleRegistry {
    /// The fixed catalogue used by every sheet this tool writes
    pub fn standard() -> Self {
        let formats = HashMap::from([
            ("NUMBER", NumberFormat::new("NUMBER", Some("0.0"))),
            ("INTEGER", NumberFormat::new("NUMBER", Some("0"))),
            ("PERCENT", NumberFormat::new("PERCENT", Some("0.0%"))),
            (
                "DATE_TIME",
                NumberFormat::new("DATE_TIME", Some("yyyy-mm-dd hh:mm:ss")),
            ),
            ("TEXT", NumberFormat::new("TEXT", None)),
            ("DURATION", NumberFormat::new("TIME", Some("[h]:mm:ss"))),
        ]);

        let styles = HashMap::from([
            (
                Style::HeaderMain,
                CellFormat {
                    background_color: Some(BLUE),
                    text_format: Some(text(WHITE, true, Some(12))),
                    horizontal_alignment: Some("CENTER".to_string()),
                    vertical_alignment: Some("MIDDLE".to_string()),
                    ..Default::default()
                },
            ),
            (
                Style::MetadataLabel,
                CellFormat {
                    background_color: Some(BLUE),
                    text_format: Some(text(WHITE, true, Some(10))),
                    horizontal_alignment: Some("RIGHT".to_string()),
                    ..Default::default()
                },
            ),
            (
                Style::HeaderBlue,
                CellFormat {
                    background_color: Some(BLUE),
                    text_format: Some(text(WHITE, true, Some(10))),
                    horizontal_alignment: Some("CENTER".to_string()),
                    ..Default::default()
                },
            ),
            (
                Style::TableBase,
                CellFormat {
                    borders: Some(Borders::solid()),
                    text_format: Some(TextFormat {
                        foreground_color: Some(BLACK),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ),
            (
                Style::MetadataValue,
                CellFormat {
                    background_color: Some(WHITE),
                    borders: Some(Borders::solid()),
                    text_format: Some(TextFormat {
                        foreground_color: Some(BLACK),
                        ..Default::default()
                    }),
                    horizontal_alignment: Some("CENTER".to_string()),
                    ..Default::default()
                },
            ),
            (
                Style::AlertRed,
                CellFormat {
                    background_color: Some(Color::rgb(1.0, 0.8, 0.8)),
                    text_format: Some(text(Color::rgb(0.8, 0.0, 0.0), true, None)),
                    ..Default::default()
                },
            ),
            (
                Style::HeaderDashboard,
                CellFormat {
                    background_color: Some(Color::rgb(0.15, 0.2, 0.3)),
                    text_format: Some(text(WHITE, true, Some(16))),
                    horizontal_alignment: Some("CENTER".to_string()),
                    vertical_alignment: Some("MIDDLE".to_string()),
                    ..Default::default()
                },
            ),
            (
                Style::DashboardBackground,
                CellFormat {
                    background_color: Some(Color::rgb(0.95, 0.95, 0.95)),
                    ..Default::default()
                },
            ),
            (
                Style::LabelBold,
                CellFormat {
                    text_format: Some(text(BLACK, true, Some(11))),
                    horizontal_alignment: Some("RIGHT".to_string()),
                    ..Default::default()
                },
            ),
        ]);

        let conditions = HashMap::from([
            (">", ConditionType::NumberGreater),
            (">=", ConditionType::NumberGreaterThanEq),
            ("<", ConditionType::NumberLess),
            ("<=", ConditionType::NumberLessThanEq),
            ("==", ConditionType::TextEq),
            ("between", ConditionType::NumberBetween),
            ("not_between", ConditionType::NumberNotBetween),
        ]);

        Self {
            formats,
            styles,
            conditions,
        }
    }

    pub fn lookup_format(&self, kind: &str) -> Option<&NumberFormat> {
        self.formats.get(kind)
    }

    pub fn lookup_style(&self, style: Style) -> &CellFormat {
        // every variant is registered in `standard`
        &self.styles[&style]
    }

    /// `!=` is deliberately absent: it is rendered as a custom formula
    pub fn lookup_condition(&self, operator: &str) -> Option<ConditionType> {
        self.conditions.get(operator).copied()
    }

    pub fn is_numeric_kind(kind: &str) -> bool {
        NUMERIC_FORMAT_KINDS.contains(&kind)
    }
}

fn text(color: Color, bold: bool, size: Option<u32>) -> TextFormat {
    TextFormat {
        foreground_color: Some(color),
        bold: Some(bold),
        font_size: size,
    }
}
