use crate::auth::{TokenSource, DATASTORE_SCOPE, SHEETS_SCOPE};
use crate::config::settings::{DEFAULT_LAYOUT_PATH, DEFAULT_TIMEZONE};
use crate::config::{self, Layout, Settings};
use crate::error::{SyncError, SyncResult};
use crate::extract::{DocumentSource, FirestoreSource, JsonFileSource, Transformer};
use crate::pipeline::{self, RunClock, RunOptions, RunSummary};
use crate::sheets::{
    CleanupOutcome, DashboardReport, HistoryOutcome, MemorySheets, NoPacer, QuotaScheduler,
    SheetsClient, Spreadsheet, StyleRegistry, ThreadPacer,
};
use crate::types::{Scalar, TIMESTAMP_FORMAT};
use chrono_tz::Tz;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const SHEETS_SCOPES: &[&str] = &[SHEETS_SCOPE];
const FIRESTORE_SCOPES: &[&str] = &[DATASTORE_SCOPE];

/// Render a number without trailing zeros
fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

fn format_scalar(value: &Scalar) -> String {
    match value {
        Scalar::Number(n) => format_number(*n),
        Scalar::Text(s) => s.clone(),
        Scalar::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
        Scalar::Null => "-".to_string(),
    }
}

fn resolve_layout_path(explicit: Option<PathBuf>, settings: Option<&Settings>) -> PathBuf {
    explicit
        .or_else(|| settings.map(|s| s.layout_path.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LAYOUT_PATH))
}

fn load_layout(path: &Path) -> SyncResult<Layout> {
    println!("   Layout: {}", path.display());
    config::parse_layout(path)
}

fn document_source(
    input: Option<PathBuf>,
    settings: &Settings,
) -> SyncResult<Box<dyn DocumentSource>> {
    match input {
        Some(path) => Ok(Box::new(JsonFileSource::new(path))),
        None => {
            let (project, collection) = settings.require_firestore()?;
            let credentials = settings.require_firestore_credentials()?;
            let tokens = TokenSource::new(credentials, FIRESTORE_SCOPES)?;
            Ok(Box::new(FirestoreSource::new(
                &project,
                collection,
                tokens,
                settings.log_every,
            )))
        }
    }
}

fn memory_book(layout: &Layout) -> Spreadsheet<MemorySheets> {
    Spreadsheet::new(
        MemorySheets::new(),
        QuotaScheduler::new(layout.quota_policy(), Box::new(NoPacer::default())),
    )
}

fn remote_book(layout: &Layout, settings: &Settings) -> SyncResult<Spreadsheet<SheetsClient>> {
    let sheet_id = settings.require_sheet_id()?;
    let tokens = TokenSource::new(settings.require_sheets_credentials()?, SHEETS_SCOPES)?;
    let client = SheetsClient::connect(sheet_id, tokens)?;
    Ok(Spreadsheet::new(
        client,
        QuotaScheduler::new(layout.quota_policy(), Box::new(ThreadPacer)),
    ))
}

/// Execute the run command
pub fn run(
    layout_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    input: Option<PathBuf>,
    limit: Option<usize>,
    no_dashboard: bool,
    dry_run: bool,
) -> SyncResult<()> {
    println!("{}", "📡 Monitor Sheets - Publishing run".bold().green());

    let settings = Settings::from_env(env_file.as_deref())?;
    let layout = load_layout(&resolve_layout_path(layout_path, Some(&settings)))?;
    if dry_run {
        println!(
            "{}",
            "📋 DRY RUN MODE - Publishing into an in-memory spreadsheet\n".yellow()
        );
    } else {
        println!();
    }

    let options = RunOptions {
        limit: limit.or(settings.limit),
        skip_dashboard: no_dashboard,
    };
    let clock = RunClock::now(settings.timezone);
    let mut source = document_source(input, &settings)?;

    if dry_run {
        let mut book = memory_book(&layout);
        let summary = pipeline::run(
            &layout,
            settings.timezone,
            &clock,
            &options,
            source.as_mut(),
            &mut book,
        )?;
        print_summary(&summary);
        print_call_counts(book.api());
    } else {
        let mut book = remote_book(&layout, &settings)?;
        let summary = pipeline::run(
            &layout,
            settings.timezone,
            &clock,
            &options,
            source.as_mut(),
            &mut book,
        )?;
        print_summary(&summary);
    }

    println!("{}", "✅ Run complete".bold().green());
    Ok(())
}

/// Execute the dashboard command
pub fn dashboard(
    layout_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    dry_run: bool,
) -> SyncResult<()> {
    println!("{}", "📊 Monitor Sheets - Rebuilding dashboard".bold().green());

    let settings = Settings::from_env(env_file.as_deref())?;
    let layout = load_layout(&resolve_layout_path(layout_path, Some(&settings)))?;
    println!();

    let registry = StyleRegistry::standard();
    let report = if dry_run {
        println!(
            "{}",
            "📋 DRY RUN MODE - Building into an in-memory spreadsheet\n".yellow()
        );
        let mut book = memory_book(&layout);
        let report = pipeline::rebuild_dashboard(&layout, &registry, &mut book)?;
        print_dashboard(report.as_ref());
        print_call_counts(book.api());
        report
    } else {
        let mut book = remote_book(&layout, &settings)?;
        let report = pipeline::rebuild_dashboard(&layout, &registry, &mut book)?;
        print_dashboard(report.as_ref());
        report
    };

    if report.is_none() {
        println!("{}", "⚠️  Layout has no dashboard section".yellow());
    }
    Ok(())
}

/// Execute the check command
pub fn check(layout_path: Option<PathBuf>) -> SyncResult<()> {
    println!("{}", "✅ Monitor Sheets - Checking layout".bold().green());
    let path = resolve_layout_path(layout_path, None);
    let layout = load_layout(&path)?;
    println!();

    for tab in &layout.entities {
        println!(
            "   📄 {} → {}",
            tab.entity.bright_blue().bold(),
            tab.tab_name.cyan()
        );
        println!("      Columns: {}", tab.columns.len());
        let thresholds = tab.columns.iter().filter(|c| c.threshold.is_some()).count();
        if thresholds > 0 {
            println!("      Thresholds: {}", thresholds);
        }
        if let Some(merge) = &tab.merge_column {
            println!("      Merge column: {}", merge);
        }
        match &tab.history_tab {
            Some(history) => println!("      History: {}", history),
            None => println!("      History: {}", "none".dimmed()),
        }
    }

    if let Some(dashboard) = &layout.dashboard {
        println!(
            "   📊 {} ({} panels)",
            dashboard.tab_name.bright_blue().bold(),
            dashboard.panels.len()
        );
        for panel in &dashboard.panels {
            println!("      • {} by {}", panel.entity, panel.timestamp_column);
        }
    }

    println!();
    println!("{}", "✅ Layout is valid".bold().green());
    Ok(())
}

/// Execute the preview command
pub fn preview(
    input: PathBuf,
    layout_path: Option<PathBuf>,
    timezone: Option<String>,
) -> SyncResult<()> {
    println!("{}", "🔍 Monitor Sheets - Previewing datasets".bold().green());
    let layout = load_layout(&resolve_layout_path(layout_path, None))?;
    let zone_name = timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let zone = Tz::from_str(&zone_name)
        .map_err(|_| SyncError::Config(format!("unknown time zone '{}'", zone_name)))?;
    println!("   Input: {}", input.display());
    println!("   Timezone: {}", zone_name);
    println!();

    let documents = JsonFileSource::new(&input).documents(None)?;
    println!("   Documents: {}", documents.len());
    let datasets = Transformer::new(zone).process(&documents, &layout);

    for tab in &layout.entities {
        let Some(dataset) = datasets.get(&tab.entity) else {
            continue;
        };
        println!();
        println!(
            "   📊 {} ({} rows)",
            tab.entity.bright_blue().bold(),
            dataset.row_count()
        );
        if dataset.is_empty() {
            println!("      {}", "(empty)".dimmed());
            continue;
        }
        println!("      {}", dataset.column_names().join(" | ").cyan());
        for index in 0..dataset.row_count() {
            let cells: Vec<String> = dataset.row(index).iter().map(format_scalar).collect();
            println!("      {}", cells.join(" | "));
        }
    }
    println!();
    Ok(())
}

fn describe_cleanup(outcome: &CleanupOutcome) -> &'static str {
    match outcome {
        CleanupOutcome::Cleaned => "cleaned",
        CleanupOutcome::NothingToClean => "nothing to clean",
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("{}", "✅ Run summary:".bold().green());
    println!("   Run id: {}", summary.run_id.dimmed());
    println!("   Documents: {}", summary.documents);

    for report in &summary.snapshots {
        println!(
            "   📄 {}: {} rows, {} alert rules, {} merged runs",
            report.sheet.bright_blue().bold(),
            report.rows,
            report.rules_added,
            report.merged_runs
        );
        println!(
            "      merges: {}, old rules: {}",
            describe_cleanup(&report.merges_removed),
            describe_cleanup(&report.rules_removed)
        );
    }

    for (entity, outcome) in &summary.histories {
        let text = match outcome {
            HistoryOutcome::Skipped => "skipped".dimmed().to_string(),
            HistoryOutcome::Duplicate => "already written this run".yellow().to_string(),
            HistoryOutcome::Initialized { rows } => format!("initialized with {} rows", rows),
            HistoryOutcome::Appended { rows } => format!("appended {} rows", rows),
        };
        println!("   🕒 {} history: {}", entity.bright_blue(), text);
    }

    print_dashboard(summary.dashboard.as_ref());
    println!();
}

fn print_dashboard(report: Option<&DashboardReport>) {
    if let Some(report) = report {
        println!(
            "   📊 {}: {} panels",
            report.sheet.bright_blue().bold(),
            report.panels
        );
        for skipped in &report.skipped {
            println!("      {} {}", "skipped".yellow(), skipped);
        }
    }
}

fn print_call_counts(book: &MemorySheets) {
    println!("{}", "📋 Calls issued (dry run):".cyan());
    for (target, count) in book.mutations_by_target() {
        println!("   {:<28} {}", target, count);
    }
}
