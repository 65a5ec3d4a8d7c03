//! Publishing into a Google spreadsheet
//!
//! The publishers ([`SnapshotPublisher`], [`HistoryAppender`],
//! [`DashboardBuilder`]) turn datasets and layouts into ordered remote calls
//! on a [`Spreadsheet`], which routes every call through the
//! [`QuotaScheduler`].

pub mod api;
pub mod cells;
pub mod client;
pub mod dashboard;
pub mod history;
pub mod memory;
pub mod model;
pub mod range;
pub mod scheduler;
pub mod snapshot;
pub mod styles;

pub use api::{CleanupOutcome, SheetHandle, SheetsApi, Spreadsheet};
pub use client::SheetsClient;
pub use dashboard::{DashboardBuilder, DashboardReport};
pub use history::{HistoryAppender, HistoryOutcome};
pub use memory::MemorySheets;
pub use scheduler::{CallClass, NoPacer, Pacer, QuotaPolicy, QuotaScheduler, ThreadPacer};
pub use snapshot::{SnapshotPublisher, SnapshotReport};
pub use styles::StyleRegistry;
