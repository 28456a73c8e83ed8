//! Binary entry point for the Arbor record import CLI.
#![forbid(unsafe_code)]

mod config;
mod ui;

use std::error::Error;
use std::io::IsTerminal;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use arbor::fixtures::{apply_fixtures, FixtureSet, FixtureSummary};
use arbor::importer::DEFAULT_COMMIT_EVERY;
use arbor::records::{DEFAULT_EXTENSION, DEFAULT_MARKER};
use arbor::types::NodeKind;
use arbor::{GraphStore, ImportFormat, ImportOptions, ImportSummary, RecordNaming, SqliteStore};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::CliConfig;
use ui::{format_duration, Theme, Ui};

const DEFAULT_SOURCE: &str = "EAD";

#[derive(Parser, Debug)]
#[command(
    name = "arbor",
    version,
    about = "Import hierarchical archival records into a graph store",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "ARBOR_CONFIG",
        value_name = "FILE",
        help = "CLI config file (defaults to <config dir>/arbor/cli.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "ARBOR_DB",
        value_name = "FILE",
        help = "Database file (defaults to [database] default in the config)"
    )]
    db: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for command results"
    )]
    format: OutputFormat,

    #[arg(long, global = true, value_enum, default_value_t = Theme::Auto)]
    theme: Theme,

    #[arg(long, global = true, help = "Plain output and warnings-only logging")]
    quiet: bool,

    #[arg(long, short, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema.
    Init,
    /// Seed repositories and users from a TOML fixture file.
    LoadFixtures {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Import a directory of records in one transaction.
    Import(ImportCmd),
    /// Show node and event counts.
    Stats,
}

#[derive(Args, Debug)]
struct ImportCmd {
    #[arg(value_name = "DATA_DIR")]
    data_dir: PathBuf,

    #[arg(long, value_name = "ID", help = "Repository the records belong to")]
    repository: String,

    #[arg(long, value_name = "ID", help = "User the import is attributed to")]
    user: String,

    #[arg(long, value_name = "NAME", help = "Source name used in the event description")]
    source: Option<String>,

    #[arg(long, value_enum, help = "Directory layout [default: hierarchical]")]
    layout: Option<LayoutArg>,

    #[arg(
        long,
        value_name = "N",
        help = "Checkpoint after this many records [default: 2500]"
    )]
    commit_every: Option<NonZeroU64>,

    #[arg(long, help = "Marker preceding record id digits [default: irn]")]
    marker: Option<String>,

    #[arg(long, help = "Record file extension [default: xml]")]
    extension: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LayoutArg {
    Hierarchical,
    Flat,
}

impl From<LayoutArg> for ImportFormat {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Hierarchical => ImportFormat::Hierarchical,
            LayoutArg::Flat => ImportFormat::Flat,
        }
    }
}

#[derive(Debug, Serialize)]
struct ImportReport {
    database: String,
    repository: String,
    user: String,
    layout: ImportFormat,
    created: u64,
    updated: u64,
    elapsed_ms: u128,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    database: String,
    repositories: u64,
    users: u64,
    documentary_units: u64,
    events: u64,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let config = CliConfig::load(cli.config.clone())?;
    debug!(config = ?config.path(), "cli.config");
    let ui = Ui::new(cli.theme, cli.quiet);
    let db_path = resolve_db_path(cli.db.as_deref(), &config)?;

    match &cli.command {
        Command::Init => {
            SqliteStore::open(&db_path)?;
            emit(cli.format, &StatsReport::collect(&db_path)?, |report| {
                ui.success(&format!("Initialized {}", report.database));
            })?;
        }
        Command::LoadFixtures { file } => {
            let fixtures = FixtureSet::load(file)?;
            let mut store = SqliteStore::open(&db_path)?;
            let summary = apply_fixtures(&mut store, &fixtures)?;
            emit(cli.format, &summary, |summary: &FixtureSummary| {
                ui.success(&format!(
                    "Loaded fixtures: {} created, {} already present",
                    summary.created, summary.existing
                ));
            })?;
        }
        Command::Import(cmd) => {
            let report = run_import(cmd, &config, &db_path, &ui)?;
            emit(cli.format, &report, |report| {
                ui.success(&format!(
                    "Imported {} items, updated {} items",
                    report.created, report.updated
                ));
                ui.section(
                    "Import",
                    [
                        ("database", report.database.clone()),
                        ("repository", report.repository.clone()),
                        ("user", report.user.clone()),
                        ("layout", report.layout.to_string()),
                        ("elapsed", format!("{}ms", report.elapsed_ms)),
                    ],
                );
            })?;
        }
        Command::Stats => {
            let report = StatsReport::collect(&db_path)?;
            emit(cli.format, &report, |report| {
                ui.section(
                    &format!("Stats for {}", report.database),
                    [
                        ("repositories", report.repositories),
                        ("users", report.users),
                        ("documentary units", report.documentary_units),
                        ("events", report.events),
                    ],
                );
            })?;
        }
    }
    Ok(())
}

fn run_import(
    cmd: &ImportCmd,
    config: &CliConfig,
    db_path: &Path,
    ui: &Ui,
) -> Result<ImportReport, Box<dyn Error>> {
    let section = config.import();
    let layout = cmd
        .layout
        .map(ImportFormat::from)
        .or(section.layout)
        .unwrap_or_default();
    let commit_every = match cmd.commit_every {
        Some(n) => n,
        None => {
            let n = section.commit_every.unwrap_or(DEFAULT_COMMIT_EVERY);
            NonZeroU64::new(n).ok_or("config [import] commit_every must be at least 1")?
        }
    };
    let marker = cmd
        .marker
        .as_deref()
        .or(section.marker.as_deref())
        .unwrap_or(DEFAULT_MARKER);
    let extension = cmd
        .extension
        .as_deref()
        .or(section.extension.as_deref())
        .unwrap_or(DEFAULT_EXTENSION);
    let source = cmd
        .source
        .as_deref()
        .or(section.source.as_deref())
        .unwrap_or(DEFAULT_SOURCE);

    let options = ImportOptions {
        commit_every,
        naming: RecordNaming::new(marker, extension)?,
    };
    let importer = layout.importer(source, options);
    let mut store = SqliteStore::open(db_path)?;

    let task = ui.task(format!("Importing {}", cmd.data_dir.display()));
    let summary: ImportSummary =
        importer.import(&mut store, &cmd.data_dir, &cmd.repository, &cmd.user)?;
    let elapsed = task.finish();
    debug!(elapsed = %format_duration(elapsed), "cli.import");

    Ok(ImportReport {
        database: db_path.display().to_string(),
        repository: cmd.repository.clone(),
        user: cmd.user.clone(),
        layout,
        created: summary.created,
        updated: summary.updated,
        elapsed_ms: elapsed.as_millis(),
    })
}

impl StatsReport {
    fn collect(db_path: &Path) -> Result<Self, Box<dyn Error>> {
        let store = SqliteStore::open(db_path)?;
        Ok(Self {
            database: db_path.display().to_string(),
            repositories: store.count_nodes(NodeKind::Repository)?,
            users: store.count_nodes(NodeKind::UserProfile)?,
            documentary_units: store.count_nodes(NodeKind::DocumentaryUnit)?,
            events: store.count_events()?,
        })
    }
}

fn resolve_db_path(flag: Option<&Path>, config: &CliConfig) -> Result<PathBuf, Box<dyn Error>> {
    flag.map(Path::to_path_buf)
        .or_else(|| config.default_db_path().cloned())
        .ok_or_else(|| "no database given; pass --db or set [database] default in the config".into())
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "arbor=debug"
    } else if quiet {
        "arbor=warn"
    } else {
        "arbor=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: FnOnce(&T),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(value),
    }
    Ok(())
}
