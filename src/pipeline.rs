//! One sequential run: extract → transform → snapshot → history → dashboard

use crate::config::Layout;
use crate::error::{SyncError, SyncResult};
use crate::extract::{DocumentSource, Transformer};
use crate::sheets::{
    DashboardBuilder, DashboardReport, HistoryAppender, HistoryOutcome, SheetsApi,
    SnapshotPublisher, SnapshotReport, Spreadsheet, StyleRegistry,
};
use crate::types::TIMESTAMP_FORMAT;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Run-wide timestamps, taken once so every sheet shows the same time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunClock {
    /// `YYYY-MM-DD HH:MM:SS` in the reporting timezone
    pub local: String,
    /// `YYYY-MM-DD HH:MM:SS UTC`
    pub utc: String,
}

impl RunClock {
    pub fn now(timezone: Tz) -> Self {
        Self::at(Utc::now(), timezone)
    }

    pub fn at(instant: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            local: instant
                .with_timezone(&timezone)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
            utc: format!("{} UTC", instant.format(TIMESTAMP_FORMAT)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub limit: Option<usize>,
    pub skip_dashboard: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub documents: usize,
    pub snapshots: Vec<SnapshotReport>,
    pub histories: Vec<(String, HistoryOutcome)>,
    pub dashboard: Option<DashboardReport>,
}

/// Execute the whole pipeline against `book`.
///
/// Steps are strictly sequential; the first error aborts the run and is
/// returned as is (nothing is rolled back).
pub fn run<A: SheetsApi>(
    layout: &Layout,
    timezone: Tz,
    clock: &RunClock,
    options: &RunOptions,
    source: &mut dyn DocumentSource,
    book: &mut Spreadsheet<A>,
) -> SyncResult<RunSummary> {
    let run_id = Uuid::new_v4().to_string();
    let _span = info_span!("run", id = %run_id).entered();
    info!(">>> Starting run at {} ({})", clock.local, clock.utc);

    let mut summary = RunSummary {
        run_id: run_id.clone(),
        documents: 0,
        snapshots: Vec::new(),
        histories: Vec::new(),
        dashboard: None,
    };

    info!("Reading documents from {}", source.describe());
    let documents = source.documents(options.limit)?;
    summary.documents = documents.len();
    if documents.is_empty() {
        warn!("No documents available, finishing");
        return Ok(summary);
    }

    info!("Transforming {} documents", documents.len());
    let datasets = Transformer::new(timezone).process(&documents, layout);

    let registry = StyleRegistry::standard();
    let publisher = SnapshotPublisher::new(&registry);
    let mut appender = HistoryAppender::new(&registry);

    for tab in &layout.entities {
        let Some(dataset) = datasets.get(&tab.entity) else {
            continue;
        };
        dataset
            .validate()
            .map_err(|e| SyncError::Validation(format!("{}: {}", tab.entity, e)))?;

        info!("Processing '{}'", tab.entity);
        if let Some(report) = publisher.publish(book, tab, dataset, &clock.local, &clock.utc)? {
            summary.snapshots.push(report);
        }
        let outcome = appender.append(book, tab, dataset, &clock.local)?;
        summary.histories.push((tab.entity.clone(), outcome));
    }

    if options.skip_dashboard {
        info!("Dashboard disabled for this run");
    } else {
        summary.dashboard = rebuild_dashboard(layout, &registry, book)?;
    }

    info!("<<< Run finished");
    Ok(summary)
}

/// Rebuild only the dashboard (no extraction)
pub fn rebuild_dashboard<A: SheetsApi>(
    layout: &Layout,
    registry: &StyleRegistry,
    book: &mut Spreadsheet<A>,
) -> SyncResult<Option<DashboardReport>> {
    if layout.dashboard.is_none() {
        info!("No dashboard configured");
        return Ok(None);
    }
    DashboardBuilder::new(registry, layout).build(book)
}
