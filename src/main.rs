use clap::{Parser, Subcommand};
use colored::Colorize;
use monitor_sheets::cli;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "monitor-sheets")]
#[command(about = "Publish server and camera monitoring data to Google Sheets.")]
#[command(long_about = "Monitor Sheets - monitoring snapshots, history and dashboard in Google Sheets

Reads server documents (Firestore or a JSON dump), flattens them into one
table per entity and publishes:
  - a formatted snapshot sheet per entity, with alert highlighting
  - an append-only history sheet per entity
  - a dashboard with instance/metric selectors and a time-series chart

COMMANDS:
  run        - Extract, transform and publish everything
  dashboard  - Rebuild only the dashboard
  check      - Validate a layout file
  preview    - Show the datasets a dump would produce

ENVIRONMENT:
  GOOGLE_SHEET_ID, GOOGLE_SHEETS_CREDENTIALS_PATH, FIREBASE_CREDENTIALS_PATH,
  GOOGLE_ACCESS_TOKEN (overrides both key files), FIRESTORE_PROJECT_ID,
  FIRESTORE_COLLECTION_NAME, TIMEZONE, LIMIT,
  LOG_EVERY, LAYOUT_PATH (a .env file is read when present)

EXAMPLES:
  monitor-sheets check --layout config/layout.yaml
  monitor-sheets preview --input test-data/documents.json
  monitor-sheets run --input test-data/documents.json --dry-run
  monitor-sheets run --limit 50 --no-dashboard")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Run the whole pipeline once.

Steps run strictly in order: read documents, transform, then for every
entity publish its snapshot sheet and append its history, then rebuild
the dashboard. The first failure stops the run.

With --dry-run nothing is sent: the sheets are built in memory, without
quota pauses, and the number of calls per sheet is printed.

EXAMPLES:
  monitor-sheets run
  monitor-sheets run --input dump.json --dry-run
  monitor-sheets run --limit 10 --no-dashboard --verbose")]
    /// Extract, transform and publish snapshots, history and dashboard
    Run {
        /// Layout file (default: LAYOUT_PATH or config/layout.yaml)
        #[arg(short, long)]
        layout: Option<PathBuf>,

        /// Env file to load instead of ./.env
        #[arg(long)]
        env_file: Option<PathBuf>,

        /// Read documents from a JSON dump instead of Firestore
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Read at most N documents
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the dashboard rebuild
        #[arg(long)]
        no_dashboard: bool,

        /// Publish into an in-memory spreadsheet
        #[arg(long)]
        dry_run: bool,

        /// Show debug logs
        #[arg(short, long)]
        verbose: bool,
    },

    #[command(long_about = "Rebuild the dashboard sheet from the history sheets.

The dashboard is recreated from scratch: previous charts, merges, formats
and selectors are removed first. History sheets are only read.")]
    /// Rebuild only the dashboard
    Dashboard {
        /// Layout file (default: LAYOUT_PATH or config/layout.yaml)
        #[arg(short, long)]
        layout: Option<PathBuf>,

        /// Env file to load instead of ./.env
        #[arg(long)]
        env_file: Option<PathBuf>,

        /// Build into an in-memory spreadsheet
        #[arg(long)]
        dry_run: bool,

        /// Show debug logs
        #[arg(short, long)]
        verbose: bool,
    },

    #[command(long_about = "Validate a layout file.

Checks the YAML against the layout schema, then threshold shapes, unique
column names, merge columns and dashboard panels.")]
    /// Validate a layout file
    Check {
        /// Layout file (default: config/layout.yaml)
        #[arg(short, long)]
        layout: Option<PathBuf>,
    },

    #[command(long_about = "Transform a JSON dump and print the resulting datasets.

Nothing is published. Useful to check column selection, renaming and
timestamp conversion before a real run.")]
    /// Show the datasets a dump would produce
    Preview {
        /// JSON dump of server documents
        #[arg(short, long)]
        input: PathBuf,

        /// Layout file (default: config/layout.yaml)
        #[arg(short, long)]
        layout: Option<PathBuf>,

        /// Reporting time zone (default: America/Santiago)
        #[arg(long)]
        timezone: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "monitor_sheets=debug"
    } else {
        "monitor_sheets=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Run { verbose, .. } | Commands::Dashboard { verbose, .. } => *verbose,
        _ => false,
    };
    init_logging(verbose);

    let result = match cli.command {
        Commands::Run {
            layout,
            env_file,
            input,
            limit,
            no_dashboard,
            dry_run,
            verbose: _,
        } => cli::run(layout, env_file, input, limit, no_dashboard, dry_run),

        Commands::Dashboard {
            layout,
            env_file,
            dry_run,
            verbose: _,
        } => cli::dashboard(layout, env_file, dry_run),

        Commands::Check { layout } => cli::check(layout),

        Commands::Preview {
            input,
            layout,
            timezone,
        } => cli::preview(input, layout, timezone),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{} {}", "❌".red(), e.to_string().red());
            ExitCode::FAILURE
        }
    }
}
