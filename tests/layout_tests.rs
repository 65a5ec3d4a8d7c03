//! Loading layout files from disk

use monitor_sheets::config::{parse_layout, ThresholdValue};
use monitor_sheets::sheets::QuotaPolicy;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_layout(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    fs::write(file.path(), content).unwrap();
    file
}

#[test]
fn test_shipped_layout_loads() {
    let layout = parse_layout(Path::new("config/layout.yaml")).unwrap();

    let names: Vec<&str> = layout.entities.iter().map(|e| e.entity.as_str()).collect();
    assert_eq!(names, vec!["servers", "cameras"]);

    let servers = layout.entity("servers").unwrap();
    assert_eq!(servers.tab_name, "Servidores");
    assert_eq!(servers.history_tab.as_deref(), Some("Historial Servidores"));
    assert_eq!(servers.merge_column.as_deref(), Some("Servidor"));
    let cpu = servers.column("Uso CPU (%)").unwrap();
    assert_eq!(cpu.key, "server_stats_cpu_usage_pct");
    assert_eq!(
        cpu.threshold.as_ref().and_then(|t| t.value.clone()),
        Some(ThresholdValue::Number(90.0))
    );

    // merge column given as a raw key resolves to the display name
    let cameras = layout.entity("cameras").unwrap();
    assert_eq!(cameras.merge_column.as_deref(), Some("Servidor"));

    let dashboard = layout.dashboard.as_ref().unwrap();
    assert_eq!(dashboard.panels.len(), 2);
    assert_eq!(dashboard.panels[1].instance_column, 2);
    assert_eq!(layout.quota_policy(), QuotaPolicy::default());
}

#[test]
fn test_pacing_section_overrides_policy() {
    let file = write_layout(
        r#"
entities:
  servers:
    tab_name: S
    columns:
      a:
        name: A
pacing:
  chart_seconds: 0
  chart_retries: 3
  cooldown_seconds: 0.5
"#,
    );
    let policy = parse_layout(file.path()).unwrap().quota_policy();
    assert_eq!(policy.chart.pre_delay, Duration::ZERO);
    assert_eq!(policy.chart.max_retries, 3);
    assert_eq!(policy.cooldown, Duration::from_millis(500));
    assert_eq!(policy.clear, QuotaPolicy::default().clear);
}

#[test]
fn test_missing_file_is_a_config_error() {
    let err = parse_layout(Path::new("does/not/exist.yaml")).unwrap_err();
    assert!(err.to_string().contains("Cannot read layout"));
}

#[test]
fn test_schema_errors_are_listed() {
    let file = write_layout(
        r#"
entities:
  servers:
    tab_name: S
    colour: blue
    columns:
      a:
        name: A
"#,
    );
    let err = parse_layout(file.path()).unwrap_err().to_string();
    assert!(err.contains("schema"), "{}", err);
}

#[test]
fn test_invalid_yaml_is_rejected() {
    let file = write_layout("entities: [unclosed");
    assert!(parse_layout(file.path()).is_err());
}

#[test]
fn test_panel_timestamp_must_be_display_name() {
    let file = write_layout(
        r#"
entities:
  servers:
    tab_name: S
    history_tab: H
    columns:
      ts:
        name: Fecha
dashboard:
  panels:
    - entity: servers
      timestamp_column: ts
"#,
    );
    let err = parse_layout(file.path()).unwrap_err().to_string();
    assert!(err.contains("timestamp_column"), "{}", err);
}

#[test]
fn test_shared_history_tab_is_rejected() {
    let file = write_layout(
        r#"
entities:
  servers:
    tab_name: Servidores
    history_tab: Historial
    columns:
      a:
        name: A
  cameras:
    tab_name: Cámaras
    history_tab: Historial
    columns:
      b:
        name: B
"#,
    );
    let err = parse_layout(file.path()).unwrap_err().to_string();
    assert!(err.contains("'Historial'"), "{}", err);
    assert!(err.contains("'servers' history_tab"), "{}", err);
    assert!(err.contains("'cameras' history_tab"), "{}", err);
}

#[test]
fn test_snapshot_and_dashboard_titles_must_differ() {
    let snapshot_on_history = write_layout(
        r#"
entities:
  servers:
    tab_name: Servidores
    history_tab: Historial
    columns:
      a:
        name: A
  cameras:
    tab_name: historial
    columns:
      b:
        name: B
"#,
    );
    assert!(parse_layout(snapshot_on_history.path()).is_err());

    let dashboard_on_snapshot = write_layout(
        r#"
entities:
  servers:
    tab_name: Dashboard
    history_tab: Historial
    columns:
      a:
        name: A
dashboard:
  panels:
    - entity: servers
      timestamp_column: A
"#,
    );
    let err = parse_layout(dashboard_on_snapshot.path())
        .unwrap_err()
        .to_string();
    assert!(err.contains("the dashboard"), "{}", err);
}
