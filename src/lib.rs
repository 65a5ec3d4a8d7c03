//! Monitor Sheets - publish monitoring snapshots to Google Sheets
//!
//! Server documents are flattened into one dataset per entity (servers,
//! cameras), then published into a spreadsheet as:
//!
//! - a formatted snapshot sheet per entity, with alert highlighting
//! - an append-only history sheet per entity
//! - an interactive dashboard with selectors and a time-series chart
//!
//! Every remote call goes through a quota-aware scheduler.
//!
//! # Example
//!
//! ```no_run
//! use monitor_sheets::config::parse_layout;
//! use monitor_sheets::extract::JsonFileSource;
//! use monitor_sheets::pipeline::{run, RunClock, RunOptions};
//! use monitor_sheets::sheets::{MemorySheets, QuotaScheduler, Spreadsheet};
//! use std::path::Path;
//!
//! let layout = parse_layout(Path::new("config/layout.yaml"))?;
//! let zone = chrono_tz::America::Santiago;
//! let mut source = JsonFileSource::new("test-data/documents.json");
//! let mut book = Spreadsheet::new(MemorySheets::new(), QuotaScheduler::unpaced());
//!
//! let summary = run(
//!     &layout,
//!     zone,
//!     &RunClock::now(zone),
//!     &RunOptions::default(),
//!     &mut source,
//!     &mut book,
//! )?;
//! println!("Published {} snapshot sheets", summary.snapshots.len());
//! # Ok::<(), monitor_sheets::error::SyncError>(())
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod sheets;
pub mod types;

// Re-export commonly used types
pub use error::{SyncError, SyncResult};
pub use types::{Column, ColumnValue, Scalar, TabularDataset};
