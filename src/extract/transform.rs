//! Flattening server documents into server rows and camera rows
//!
//! Each document yields one server row and one camera row per entry of its
//! `cameras_status` map. Timestamp-like fields are converted to naive local
//! time; the configured columns are then picked, renamed and typed per
//! entity layout.

use super::Document;
use crate::config::{Layout, TabLayout};
use crate::types::{Column, ColumnValue, TabularDataset, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

pub const SERVERS_ENTITY: &str = "servers";
pub const CAMERAS_ENTITY: &str = "cameras";

const SERVER_NAME_KEY: &str = "Server Name";
const CAMERA_NAME_KEY: &str = "camera_name";
const CAMERAS_KEY: &str = "cameras_status";
const STATS_KEY: &str = "server_stats";
const QUERY_TIME_KEY: &str = "timestamp_query_dt";

/// One flattened field
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Json(Value),
    Timestamp(NaiveDateTime),
}

pub type Row = BTreeMap<String, Field>;

/// Server and camera rows before column selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRows {
    pub servers: Vec<Row>,
    pub cameras: Vec<Row>,
}

impl FlatRows {
    pub fn for_entity(&self, entity: &str) -> Option<&[Row]> {
        match entity {
            SERVERS_ENTITY => Some(&self.servers),
            CAMERAS_ENTITY => Some(&self.cameras),
            _ => None,
        }
    }
}

/// Turns documents into one dataset per layout entity
pub struct Transformer {
    timezone: Tz,
}

impl Transformer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Datasets keyed by entity name, for every entity of the layout
    pub fn process(&self, documents: &[Document], layout: &Layout) -> HashMap<String, TabularDataset> {
        let rows = self.flatten(documents);
        layout
            .entities
            .iter()
            .map(|tab| {
                let dataset = match rows.for_entity(&tab.entity) {
                    Some(entity_rows) => select_columns(entity_rows, tab),
                    None => {
                        warn!("No rows are produced for entity '{}'", tab.entity);
                        TabularDataset::new()
                    }
                };
                debug!(
                    "Entity '{}': {} rows x {} columns",
                    tab.entity,
                    dataset.row_count(),
                    dataset.column_count()
                );
                (tab.entity.clone(), dataset)
            })
            .collect()
    }

    pub fn flatten(&self, documents: &[Document]) -> FlatRows {
        let mut rows = FlatRows::default();
        for doc in documents {
            let server = self.server_row(doc);
            let query_time = server.get(QUERY_TIME_KEY).cloned();

            if let Some(Value::Object(cameras)) = doc.data.get(CAMERAS_KEY) {
                for (camera, data) in cameras {
                    let Value::Object(fields) = data else {
                        continue;
                    };
                    let mut row = Row::new();
                    row.insert(SERVER_NAME_KEY.to_string(), text_field(&doc.id));
                    row.insert(CAMERA_NAME_KEY.to_string(), text_field(camera));
                    for (k, v) in fields {
                        row.insert(k.clone(), Field::Json(v.clone()));
                    }
                    let mut row = self.fix_timestamps(row);
                    // cameras inherit the server's query time
                    if let Some(time) = &query_time {
                        row.insert(QUERY_TIME_KEY.to_string(), time.clone());
                    }
                    rows.cameras.push(row);
                }
            }
            rows.servers.push(server);
        }
        rows
    }

    fn server_row(&self, doc: &Document) -> Row {
        let mut row = Row::new();
        row.insert(SERVER_NAME_KEY.to_string(), text_field(&doc.id));
        for (key, value) in &doc.data {
            match (key.as_str(), value) {
                (CAMERAS_KEY, _) => {}
                (STATS_KEY, Value::Object(stats)) => {
                    for (k, v) in stats {
                        row.insert(format!("{}_{}", STATS_KEY, k), Field::Json(v.clone()));
                    }
                }
                _ => {
                    row.insert(key.clone(), Field::Json(value.clone()));
                }
            }
        }
        self.fix_timestamps(row)
    }

    /// Keys mentioning `timestamp` or `utc` get a local naive copy under
    /// `<key>_dt` (in place when the key already has `_dt`). Values that do
    /// not parse are left alone.
    fn fix_timestamps(&self, row: Row) -> Row {
        let mut fixed = row.clone();
        for (key, field) in &row {
            let lower = key.to_lowercase();
            if !lower.contains("timestamp") && !lower.contains("utc") {
                continue;
            }
            let Field::Json(value) = field else {
                continue;
            };
            if let Some(utc) = parse_instant(value) {
                let local = utc.with_timezone(&self.timezone).naive_local();
                let target = if key.contains("_dt") {
                    key.clone()
                } else {
                    format!("{}_dt", key)
                };
                fixed.insert(target, Field::Timestamp(local));
            }
        }
        fixed
    }
}

fn text_field(text: &str) -> Field {
    Field::Json(Value::String(text.to_string()))
}

/// Epoch seconds, RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(whole as i64, nanos)
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

/// Keep the configured keys that appear in any row, in layout order,
/// renamed to their display names
pub fn select_columns(rows: &[Row], tab: &TabLayout) -> TabularDataset {
    let mut dataset = TabularDataset::new();
    if rows.is_empty() {
        return dataset;
    }
    for spec in &tab.columns {
        if !rows.iter().any(|r| r.contains_key(&spec.key)) {
            continue;
        }
        let cells: Vec<Option<&Field>> = rows.iter().map(|r| r.get(&spec.key)).collect();
        dataset.add_column(Column::new(spec.name.clone(), type_column(&cells)));
    }
    dataset
}

fn is_null(field: &Option<&Field>) -> bool {
    matches!(field, None | Some(Field::Json(Value::Null)))
}

/// Timestamps if every present value is one; numbers likewise; text otherwise
fn type_column(cells: &[Option<&Field>]) -> ColumnValue {
    let present: Vec<&Field> = cells
        .iter()
        .filter(|c| !is_null(c))
        .filter_map(|c| *c)
        .collect();

    if !present.is_empty() && present.iter().all(|f| matches!(f, Field::Timestamp(_))) {
        return ColumnValue::Timestamp(
            cells
                .iter()
                .map(|c| match c {
                    Some(Field::Timestamp(ts)) => Some(*ts),
                    _ => None,
                })
                .collect(),
        );
    }

    if !present.is_empty()
        && present
            .iter()
            .all(|f| matches!(f, Field::Json(Value::Number(_))))
    {
        return ColumnValue::Number(
            cells
                .iter()
                .map(|c| match c {
                    Some(Field::Json(Value::Number(n))) => n.as_f64(),
                    _ => None,
                })
                .collect(),
        );
    }

    ColumnValue::Text(
        cells
            .iter()
            .map(|c| if is_null(c) { None } else { c.map(render_text) })
            .collect(),
    )
}

fn render_text(field: &Field) -> String {
    match field {
        Field::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        Field::Json(Value::String(s)) => s.clone(),
        Field::Json(Value::Bool(b)) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Field::Json(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        match data {
            Value::Object(map) => Document::new(id, map),
            _ => panic!("test document must be an object"),
        }
    }

    fn transformer() -> Transformer {
        Transformer::new(chrono_tz::America::Santiago)
    }

    #[test]
    fn test_server_row_flattens_stats() {
        let rows = transformer().flatten(&[doc(
            "srv-01",
            json!({"status": "online", "server_stats": {"cpu_percent": 12.5}, "cameras_status": {}}),
        )]);
        let server = &rows.servers[0];
        assert_eq!(server["Server Name"], Field::Json(json!("srv-01")));
        assert_eq!(server["server_stats_cpu_percent"], Field::Json(json!(12.5)));
        assert!(!server.contains_key("cameras_status"));
        assert!(rows.cameras.is_empty());
    }

    #[test]
    fn test_cameras_inherit_query_time() {
        // 2026-01-20 15:00:00 UTC is 12:00:00 in Santiago (UTC-3 in summer)
        let rows = transformer().flatten(&[doc(
            "srv-01",
            json!({
                "timestamp_query": 1768921200,
                "cameras_status": {
                    "cam-1": {"status": "online"},
                    "cam-2": {"status": "offline", "last_seen_utc": "2026-01-20T14:00:00Z"},
                    "broken": 5
                }
            }),
        )]);
        assert_eq!(rows.cameras.len(), 2);
        let expected = NaiveDate::from_ymd_opt(2026, 1, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        assert_eq!(rows.servers[0]["timestamp_query_dt"], Field::Timestamp(expected));
        for cam in &rows.cameras {
            assert_eq!(cam["timestamp_query_dt"], Field::Timestamp(expected));
            assert_eq!(cam["Server Name"], Field::Json(json!("srv-01")));
        }
        assert_eq!(rows.cameras[1]["camera_name"], Field::Json(json!("cam-2")));
        assert!(rows.cameras[1].contains_key("last_seen_utc_dt"));
    }

    #[test]
    fn test_unparseable_timestamp_is_left_alone() {
        let rows = transformer().flatten(&[doc("s", json!({"timestamp_boot": "yesterday"}))]);
        assert!(!rows.servers[0].contains_key("timestamp_boot_dt"));
        assert_eq!(
            rows.servers[0]["timestamp_boot"],
            Field::Json(json!("yesterday"))
        );
    }

    #[test]
    fn test_dt_key_is_converted_in_place() {
        let rows = transformer().flatten(&[doc(
            "s",
            json!({"timestamp_query_dt": "2026-01-20 15:00:00"}),
        )]);
        assert!(matches!(
            rows.servers[0]["timestamp_query_dt"],
            Field::Timestamp(_)
        ));
        assert!(!rows.servers[0].contains_key("timestamp_query_dt_dt"));
    }

    #[test]
    fn test_parse_instant_forms() {
        assert!(parse_instant(&json!(0)).is_some());
        assert!(parse_instant(&json!(1.5)).is_some());
        assert!(parse_instant(&json!("2026-01-20T15:00:00-03:00")).is_some());
        assert!(parse_instant(&json!("2026-01-20 15:00:00")).is_some());
        assert!(parse_instant(&json!(true)).is_none());
        assert!(parse_instant(&json!("soon")).is_none());
    }

    #[test]
    fn test_type_column() {
        let n = Field::Json(json!(1));
        let s = Field::Json(json!("x"));
        let b = Field::Json(json!(true));
        let null = Field::Json(Value::Null);

        assert_eq!(
            type_column(&[Some(&n), None, Some(&null)]),
            ColumnValue::Number(vec![Some(1.0), None, None])
        );
        assert_eq!(
            type_column(&[Some(&n), Some(&s), Some(&b)]),
            ColumnValue::Text(vec![
                Some("1".to_string()),
                Some("x".to_string()),
                Some("TRUE".to_string())
            ])
        );
        assert_eq!(type_column(&[None]), ColumnValue::Text(vec![None]));
    }
}
