use crate::error::{SyncError, SyncResult};
use crate::sheets::scheduler::QuotaPolicy;
use crate::sheets::styles::{StyleRegistry, DEFAULT_FORMAT_KIND};
use jsonschema::JSONSchema;
use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Header label used when an entity declares no `title`
pub const DEFAULT_TITLE: &str = "Reporte";

const KNOWN_OPERATORS: [&str; 8] = [">", ">=", "<", "<=", "==", "!=", "between", "not_between"];

//==============================================================================
// Layout types
//==============================================================================

/// Comparison value of a threshold
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdValue {
    Number(f64),
    Text(String),
}

impl ThresholdValue {
    /// Text sent as the condition value (`90`, not `90.0`)
    pub fn render(&self) -> String {
        match self {
            ThresholdValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            ThresholdValue::Number(n) => n.to_string(),
            ThresholdValue::Text(s) => s.clone(),
        }
    }
}

/// Alert threshold attached to a column
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    pub operator: String,
    pub value: Option<ThresholdValue>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ThresholdRule {
    pub fn is_range(&self) -> bool {
        matches!(self.operator.as_str(), "between" | "not_between")
    }

    pub fn is_supported(&self) -> bool {
        KNOWN_OPERATORS.contains(&self.operator.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Field key in the flattened record
    pub key: String,
    /// Header shown in the sheet
    pub name: String,
    pub format: String,
    pub threshold: Option<ThresholdRule>,
}

/// Snapshot/history layout of one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct TabLayout {
    pub entity: String,
    pub tab_name: String,
    pub title: String,
    pub history_tab: Option<String>,
    pub columns: Vec<ColumnSpec>,
    /// Display name of the column whose repeated values are merged
    pub merge_column: Option<String>,
}

impl TabLayout {
    pub fn column(&self, display_name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == display_name)
    }

    pub fn column_by_key(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Display names of the columns offered as dashboard metrics
    pub fn numeric_metrics(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| StyleRegistry::is_numeric_kind(&c.format))
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// One selector + chart block of the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct PanelLayout {
    pub entity: String,
    pub instance_label: String,
    pub metric_label: String,
    /// 1-based column of the history sheet holding the instance names
    pub instance_column: u32,
    /// Display name of the history column used as the time axis
    pub timestamp_column: String,
    pub chart_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardLayout {
    pub tab_name: String,
    pub title: String,
    pub panels: Vec<PanelLayout>,
}

/// Optional overrides of the default call pacing
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PacingOverrides {
    pub clear: Option<Duration>,
    pub rule_deletion: Option<Duration>,
    pub layout: Option<Duration>,
    pub chart: Option<Duration>,
    pub chart_retries: Option<u32>,
    pub chart_retry: Option<Duration>,
    pub cooldown: Option<Duration>,
}

impl PacingOverrides {
    pub fn apply(&self, mut policy: QuotaPolicy) -> QuotaPolicy {
        if let Some(d) = self.clear {
            policy.clear.pre_delay = d;
        }
        if let Some(d) = self.rule_deletion {
            policy.rule_deletion.pre_delay = d;
        }
        if let Some(d) = self.layout {
            policy.layout.pre_delay = d;
        }
        if let Some(d) = self.chart {
            policy.chart.pre_delay = d;
        }
        if let Some(n) = self.chart_retries {
            policy.chart.max_retries = n;
        }
        if let Some(d) = self.chart_retry {
            policy.chart.backoff = d;
        }
        if let Some(d) = self.cooldown {
            policy.cooldown = d;
        }
        policy
    }
}

/// The whole layout file
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Entity layouts in file order
    pub entities: Vec<TabLayout>,
    pub dashboard: Option<DashboardLayout>,
    pub pacing: PacingOverrides,
}

impl Layout {
    pub fn entity(&self, name: &str) -> Option<&TabLayout> {
        self.entities.iter().find(|e| e.entity == name)
    }

    /// Default pacing with the file's overrides applied
    pub fn quota_policy(&self) -> QuotaPolicy {
        self.pacing.apply(QuotaPolicy::default())
    }
}

//==============================================================================
// Parsing
//==============================================================================

/// Parse and validate a layout file.
///
/// The YAML is checked against the embedded JSON schema first, then
/// semantically: threshold shapes, unique display names per entity, merge
/// columns and dashboard panels that refer to real columns.
pub fn parse_layout(path: &Path) -> SyncResult<Layout> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SyncError::Config(format!("Cannot read layout '{}': {}", path.display(), e))
    })?;
    parse_layout_str(&content)
}

pub fn parse_layout_str(content: &str) -> SyncResult<Layout> {
    let yaml: Value = serde_yaml::from_str(content)?;
    validate_against_schema(&yaml)?;

    let root = yaml
        .as_mapping()
        .ok_or_else(|| SyncError::Config("Layout must be a mapping".to_string()))?;

    let mut entities = Vec::new();
    if let Some(Value::Mapping(map)) = root.get("entities") {
        for (key, value) in map {
            let entity = key
                .as_str()
                .ok_or_else(|| SyncError::Config("Entity name must be a string".to_string()))?;
            entities.push(parse_tab(entity, value)?);
        }
    }

    let dashboard = match root.get("dashboard") {
        Some(value) => Some(parse_dashboard(value, &entities)?),
        None => None,
    };

    check_unique_sheets(&entities, dashboard.as_ref())?;

    let pacing = match root.get("pacing") {
        Some(Value::Mapping(map)) => parse_pacing(map)?,
        _ => PacingOverrides::default(),
    };

    Ok(Layout {
        entities,
        dashboard,
        pacing,
    })
}

/// Every sheet is written by exactly one publisher, so no two of the
/// snapshot, history and dashboard titles may name the same sheet
/// (titles compare case-insensitively, as the Sheets API does)
fn check_unique_sheets(
    entities: &[TabLayout],
    dashboard: Option<&DashboardLayout>,
) -> SyncResult<()> {
    let mut owners: Vec<(String, String)> = Vec::new();
    let mut claim = |title: &str, owner: String| -> SyncResult<()> {
        let folded = title.trim().to_lowercase();
        if let Some((_, first)) = owners.iter().find(|(t, _)| *t == folded) {
            return Err(SyncError::Config(format!(
                "Sheet '{}' is used by both {} and {}",
                title, first, owner
            )));
        }
        owners.push((folded, owner));
        Ok(())
    };

    for tab in entities {
        claim(&tab.tab_name, format!("'{}' tab_name", tab.entity))?;
        if let Some(history) = &tab.history_tab {
            claim(history, format!("'{}' history_tab", tab.entity))?;
        }
    }
    if let Some(dashboard) = dashboard {
        claim(&dashboard.tab_name, "the dashboard".to_string())?;
    }
    Ok(())
}

/// Validate YAML against the layout JSON Schema
fn validate_against_schema(yaml: &Value) -> SyncResult<()> {
    let schema_str = include_str!("../../schema/layout.schema.json");
    let schema_value: serde_json::Value = serde_json::from_str(schema_str)
        .map_err(|e| SyncError::Validation(format!("Failed to parse schema: {}", e)))?;

    let compiled_schema = JSONSchema::compile(&schema_value)
        .map_err(|e| SyncError::Validation(format!("Failed to compile schema: {}", e)))?;

    let json_value: serde_json::Value = serde_json::to_value(yaml)
        .map_err(|e| SyncError::Config(format!("Failed to convert YAML to JSON: {}", e)))?;

    if let Err(errors) = compiled_schema.validate(&json_value) {
        let error_messages: Vec<String> = errors
            .map(|e| format!("  - {} (at {})", e, e.instance_path))
            .collect();
        return Err(SyncError::Config(format!(
            "Layout does not match the schema:\n{}",
            error_messages.join("\n")
        )));
    }

    Ok(())
}

fn get_str<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn get_f64(map: &Mapping, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}

fn parse_tab(entity: &str, value: &Value) -> SyncResult<TabLayout> {
    let map = value
        .as_mapping()
        .ok_or_else(|| SyncError::Config(format!("Entity '{}' must be a mapping", entity)))?;

    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    if let Some(Value::Mapping(cols)) = map.get("columns") {
        for (key, spec) in cols {
            let key = key.as_str().ok_or_else(|| {
                SyncError::Config(format!("Entity '{}': column keys must be strings", entity))
            })?;
            let column = parse_column(entity, key, spec)?;
            if !seen.insert(column.name.clone()) {
                return Err(SyncError::Config(format!(
                    "Entity '{}': display name '{}' is used by more than one column",
                    entity, column.name
                )));
            }
            columns.push(column);
        }
    }

    let mut layout = TabLayout {
        entity: entity.to_string(),
        tab_name: get_str(map, "tab_name").unwrap_or(entity).to_string(),
        title: get_str(map, "title").unwrap_or(DEFAULT_TITLE).to_string(),
        history_tab: get_str(map, "history_tab").map(str::to_string),
        columns,
        merge_column: None,
    };

    // a raw key is accepted and resolved to its display name
    if let Some(merge) = get_str(map, "merge_column") {
        let resolved = layout
            .column(merge)
            .or_else(|| layout.column_by_key(merge))
            .map(|c| c.name.clone())
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "Entity '{}': merge_column '{}' is not a configured column",
                    entity, merge
                ))
            })?;
        layout.merge_column = Some(resolved);
    }

    Ok(layout)
}

fn parse_column(entity: &str, key: &str, value: &Value) -> SyncResult<ColumnSpec> {
    let map = value.as_mapping().ok_or_else(|| {
        SyncError::Config(format!("Entity '{}': column '{}' must be a mapping", entity, key))
    })?;
    let name = get_str(map, "name").unwrap_or(key).to_string();
    let format = get_str(map, "format")
        .unwrap_or(DEFAULT_FORMAT_KIND)
        .to_string();
    let threshold = match map.get("threshold") {
        Some(Value::Mapping(t)) => Some(parse_threshold(entity, &name, t)?),
        _ => None,
    };
    Ok(ColumnSpec {
        key: key.to_string(),
        name,
        format,
        threshold,
    })
}

fn parse_threshold(entity: &str, column: &str, map: &Mapping) -> SyncResult<ThresholdRule> {
    let operator = get_str(map, "operator").unwrap_or_default().to_string();
    let value = match map.get("value") {
        Some(Value::Number(n)) => n.as_f64().map(ThresholdValue::Number),
        Some(Value::String(s)) => Some(ThresholdValue::Text(s.clone())),
        Some(Value::Bool(b)) => Some(ThresholdValue::Text(
            if *b { "TRUE" } else { "FALSE" }.to_string(),
        )),
        _ => None,
    };
    let rule = ThresholdRule {
        operator,
        value,
        min: get_f64(map, "min"),
        max: get_f64(map, "max"),
    };

    if !rule.is_supported() {
        warn!(
            "Entity '{}', column '{}': unsupported threshold operator '{}', no rule will be applied",
            entity, column, rule.operator
        );
    } else if rule.is_range() {
        if rule.min.is_none() || rule.max.is_none() {
            return Err(SyncError::Config(format!(
                "Entity '{}', column '{}': '{}' needs both min and max",
                entity, column, rule.operator
            )));
        }
    } else if rule.value.is_none() {
        return Err(SyncError::Config(format!(
            "Entity '{}', column '{}': '{}' needs a value",
            entity, column, rule.operator
        )));
    }
    Ok(rule)
}

fn parse_dashboard(value: &Value, entities: &[TabLayout]) -> SyncResult<DashboardLayout> {
    let map = value
        .as_mapping()
        .ok_or_else(|| SyncError::Config("dashboard must be a mapping".to_string()))?;

    let mut panels = Vec::new();
    if let Some(Value::Sequence(items)) = map.get("panels") {
        for item in items {
            let Some(panel) = item.as_mapping() else {
                continue;
            };
            panels.push(parse_panel(panel, entities)?);
        }
    }

    Ok(DashboardLayout {
        tab_name: get_str(map, "tab_name").unwrap_or("Dashboard").to_string(),
        title: get_str(map, "title")
            .unwrap_or("DASHBOARD OPERATIVO")
            .to_string(),
        panels,
    })
}

fn parse_panel(map: &Mapping, entities: &[TabLayout]) -> SyncResult<PanelLayout> {
    let entity = get_str(map, "entity").unwrap_or_default().to_string();
    let tab = entities
        .iter()
        .find(|e| e.entity == entity)
        .ok_or_else(|| {
            SyncError::Config(format!("Dashboard panel refers to unknown entity '{}'", entity))
        })?;

    let timestamp_column = get_str(map, "timestamp_column")
        .unwrap_or_default()
        .to_string();
    if tab.column(&timestamp_column).is_none() {
        return Err(SyncError::Config(format!(
            "Dashboard panel '{}': timestamp_column '{}' is not a display column",
            entity, timestamp_column
        )));
    }

    let instance_column = map
        .get("instance_column")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;
    if instance_column == 0 || instance_column as usize > tab.columns.len() {
        return Err(SyncError::Config(format!(
            "Dashboard panel '{}': instance_column {} is outside 1..={}",
            entity,
            instance_column,
            tab.columns.len()
        )));
    }

    Ok(PanelLayout {
        instance_label: get_str(map, "instance_label")
            .unwrap_or("Instancia:")
            .to_string(),
        metric_label: get_str(map, "metric_label")
            .unwrap_or("Métrica:")
            .to_string(),
        instance_column,
        timestamp_column,
        chart_title: get_str(map, "chart_title")
            .map(str::to_string)
            .unwrap_or_else(|| format!("Evolución Temporal ({})", entity)),
        entity,
    })
}

fn parse_pacing(map: &Mapping) -> SyncResult<PacingOverrides> {
    let seconds = |key: &str| -> SyncResult<Option<Duration>> {
        match get_f64(map, key) {
            None => Ok(None),
            Some(s) => Duration::try_from_secs_f64(s).map(Some).map_err(|e| {
                SyncError::Config(format!("pacing.{}: {} is not a usable duration ({})", key, s, e))
            }),
        }
    };
    Ok(PacingOverrides {
        clear: seconds("clear_seconds")?,
        rule_deletion: seconds("rule_deletion_seconds")?,
        layout: seconds("layout_seconds")?,
        chart: seconds("chart_seconds")?,
        chart_retries: map
            .get("chart_retries")
            .and_then(Value::as_u64)
            .map(|n| n.min(u64::from(u32::MAX)) as u32),
        chart_retry: seconds("chart_retry_seconds")?,
        cooldown: seconds("cooldown_seconds")?,
    })
}
