//! reportsync CLI - Command line interface for sync operations.
//!
//! This tool runs the synchronization between the Firestore document store
//! and the local SQLite database, and inspects the sync log.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use reportsync_local::{AuditRepository, AuditStatus, SqliteStore, SyncAuditRecord};
use reportsync_remote::FirestoreConnector;
use reportsync_sync::{SyncEngine, SyncMode, SyncScheduler, SyncSettings, SyncSummary};

#[derive(Parser)]
#[command(name = "reportsync")]
#[command(about = "reportsync - Firestore and SQLite report synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: user config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full bidirectional sync and record it in the sync log.
    Sync {
        /// Local user ID recorded as the initiator.
        #[arg(short, long)]
        user_id: Option<i64>,
    },

    /// Import users and reports from the document store.
    Pull,

    /// Publish users and reports to the document store.
    Push,

    /// List sync log entries, newest first.
    Logs {
        /// Only show runs with this outcome.
        #[arg(short, long)]
        status: Option<StatusFilter>,

        /// Maximum number of entries.
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Show a single sync log entry.
    Log {
        /// Sync log ID.
        id: i64,
    },

    /// Show the last sync run.
    Status,

    /// Run full syncs periodically until interrupted.
    Watch {
        /// Seconds between runs (overrides the settings file).
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Write a settings file.
    InitConfig {
        /// Google Cloud project ID.
        #[arg(short, long)]
        project_id: String,

        /// SQLite database path.
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusFilter {
    Success,
    Failed,
}

impl From<StatusFilter> for AuditStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Success => AuditStatus::Success,
            StatusFilter::Failed => AuditStatus::Failed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.clone().unwrap_or_else(SyncSettings::default_path);
    let json = cli.json;

    match cli.command {
        Commands::Sync { user_id } => cmd_sync(&config_path, user_id, json).await,

        Commands::Pull => cmd_pull(&config_path, json).await,

        Commands::Push => cmd_push(&config_path, json).await,

        Commands::Logs { status, limit } => {
            cmd_logs(&config_path, status.map(AuditStatus::from), limit, json)
        }

        Commands::Log { id } => cmd_log(&config_path, id, json),

        Commands::Status => cmd_status(&config_path, json),

        Commands::Watch { interval } => cmd_watch(&config_path, interval).await,

        Commands::InitConfig {
            project_id,
            database,
            force,
        } => cmd_init_config(&config_path, project_id, database, force),

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "reportsync", &mut io::stdout());
            Ok(())
        }
    }
}

/// Load settings from the given file.
fn load_settings(path: &Path) -> Result<SyncSettings> {
    SyncSettings::load(path).with_context(|| {
        format!(
            "Failed to load settings from {} (run `reportsync init-config` first)",
            path.display()
        )
    })
}

/// Open the local database, creating its directory if needed.
fn open_local(settings: &SyncSettings) -> Result<SqliteStore> {
    if let Some(parent) = settings.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }
    SqliteStore::open(&settings.database_path).context("Failed to open local database")
}

/// Build an engine over the local database and Firestore.
fn open_engine(settings: &SyncSettings) -> Result<SyncEngine> {
    let local = open_local(settings)?;
    let firestore = settings
        .firestore_config()
        .context("Invalid Firestore settings")?;

    Ok(SyncEngine::new(
        Arc::new(local),
        Arc::new(FirestoreConnector::new(firestore)),
        settings.sync_config(),
    ))
}

/// Run a full sync.
async fn cmd_sync(config_path: &Path, user_id: Option<i64>, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let engine = open_engine(&settings)?;

    let record = engine.sync_all(user_id).await.context("Failed to record sync")?;
    engine.shutdown().await?;

    print_record(&record, json)?;
    if !record.is_success() {
        anyhow::bail!(
            "Sync failed: {}",
            record.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Pull both collections.
async fn cmd_pull(config_path: &Path, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let engine = open_engine(&settings)?;

    let summary = engine.pull_all().await.context("Pull failed")?;
    engine.shutdown().await?;

    print_summary("Pulled", summary.users_pulled, summary.reports_pulled, &summary, json)
}

/// Push both tables.
async fn cmd_push(config_path: &Path, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let engine = open_engine(&settings)?;

    let summary = engine.push_all().await.context("Push failed")?;
    engine.shutdown().await?;

    print_summary("Pushed", summary.users_pushed, summary.reports_pushed, &summary, json)
}

/// List sync log entries.
fn cmd_logs(config_path: &Path, status: Option<AuditStatus>, limit: usize, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let local = open_local(&settings)?;

    let records: Vec<SyncAuditRecord> = local
        .audits(status)
        .context("Failed to read sync log")?
        .into_iter()
        .take(limit)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No sync runs recorded.");
    } else {
        for record in &records {
            println!(
                "#{:<5} {}  {:<7}  pulled {:<4} pushed {:<4} {}",
                record.id.unwrap_or_default(),
                record.started_at.format("%Y-%m-%d %H:%M:%S"),
                record.status,
                record.records_pulled,
                record.records_pushed,
                record.error_message.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}

/// Show one sync log entry.
fn cmd_log(config_path: &Path, id: i64, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let local = open_local(&settings)?;

    let record = local
        .audit(id)
        .context("Failed to read sync log")?
        .with_context(|| format!("No sync log entry with ID {}", id))?;

    print_record(&record, json)
}

/// Show the last sync run.
fn cmd_status(config_path: &Path, json: bool) -> Result<()> {
    let settings = load_settings(config_path)?;
    let local = open_local(&settings)?;
    let last = local.audits(None).context("Failed to read sync log")?.into_iter().next();

    if json {
        println!("{}", serde_json::to_string_pretty(&last)?);
        return Ok(());
    }

    println!("Sync Status:");
    println!("  Project: {}", settings.remote.project_id);
    println!("  Database: {}", settings.database_path.display());
    match last {
        Some(record) => {
            println!("  Last run: #{} at {}", record.id.unwrap_or_default(), record.started_at);
            println!("  Outcome: {}", record.status);
            if let Some(message) = record.error_message {
                println!("  Error: {}", message);
            }
        }
        None => println!("  Last run: never"),
    }

    Ok(())
}

/// Run periodic syncs until Ctrl-C.
async fn cmd_watch(config_path: &Path, interval: Option<u64>) -> Result<()> {
    let settings = load_settings(config_path)?;
    let mode = match interval {
        Some(secs) if secs > 0 => SyncMode::Periodic {
            interval: Duration::from_secs(secs),
        },
        Some(_) => anyhow::bail!("Interval must be positive"),
        None => settings.sync_mode(),
    };
    if mode == SyncMode::Manual {
        anyhow::bail!("No interval configured; pass --interval or set schedule.interval_secs");
    }

    let engine = Arc::new(open_engine(&settings)?);
    let (scheduler, handle) = SyncScheduler::new(mode.clone());

    let runner = engine.clone();
    let task = tokio::spawn(handle.run(move |initiated_by| {
        let engine = runner.clone();
        async move { engine.sync_all(initiated_by).await }
    }));

    info!("Watching ({:?}); press Ctrl-C to stop", mode);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Stopping scheduler");
    scheduler.shutdown().await;
    task.await.context("Scheduler task panicked")?;
    engine.shutdown().await?;

    Ok(())
}

/// Write a fresh settings file.
fn cmd_init_config(
    config_path: &Path,
    project_id: String,
    database: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let mut settings = SyncSettings::default();
    settings.remote.project_id = project_id;
    if let Some(database) = database {
        settings.database_path = database;
    }
    settings.validate().context("Invalid settings")?;
    settings
        .save(config_path)
        .context("Failed to write settings")?;

    println!("Settings written to {}", config_path.display());
    println!("  Project: {}", settings.remote.project_id);
    println!("  Database: {}", settings.database_path.display());
    println!("Set REPORTSYNC_ACCESS_TOKEN or remote.access_token before syncing.");

    Ok(())
}

fn print_record(record: &SyncAuditRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("Sync #{}", record.id.unwrap_or_default());
    println!("  Kind: {}", record.kind);
    println!("  Started: {}", record.started_at);
    println!("  Status: {}", record.status);
    println!("  Pulled: {}", record.records_pulled);
    println!("  Pushed: {}", record.records_pushed);
    println!("  Conflicts: {}", record.conflicts);
    if let Some(user) = record.initiated_by {
        println!("  Initiated by: user {}", user);
    }
    if let Some(message) = &record.error_message {
        println!("  Error: {}", message);
    }
    Ok(())
}

fn print_summary(
    verb: &str,
    users: u32,
    reports: u32,
    summary: &SyncSummary,
    json: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{} {} new users and {} new reports.", verb, users, reports);
    }
    Ok(())
}
