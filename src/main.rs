//! mission_scrape: supervised, schedulable extraction missions.
//!
//! `serve` runs the supervisor and scheduler until Ctrl-C. `worker` is the
//! process-mode worker the supervisor spawns; its stdout carries the progress
//! line protocol, so all logging goes to stderr. `run` executes one mission
//! in the foreground.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mission_scrape::browser_setup::BrowserSession;
use mission_scrape::config::{ServiceConfig, WorkerMode};
use mission_scrape::extraction::{ExtractionEngine, LineProgress, WorkerInvocation};
use mission_scrape::mission::{
    InProcessLauncher, MissionRequest, MissionSupervisor, ProcessLauncher, WorkerLauncher,
};
use mission_scrape::persistence::{PersistenceGateway, SqliteGateway};
use mission_scrape::scheduler::JobScheduler;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "mission_scrape", version, about)]
struct Cli {
    /// SQLite database file, overrides configuration
    #[arg(long, global = true, env = "MISSION_SCRAPE_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the mission supervisor and scheduler until interrupted
    Serve,
    /// Run one extraction as an opaque worker process
    Worker {
        /// JSON-encoded worker invocation
        #[arg(long)]
        invocation: String,
    },
    /// Run a single mission in the foreground and print its final state
    Run {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        keyword: String,
        #[arg(long)]
        max_records: Option<u64>,
        #[arg(long)]
        daily_quota: Option<u64>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mission_scrape=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match load_config(cli.database) {
        Ok(config) => match cli.command {
            Command::Serve => serve(config).await,
            Command::Worker { invocation } => worker(config, &invocation).await,
            Command::Run {
                owner,
                keyword,
                max_records,
                daily_quota,
            } => run_once(config, owner, keyword, max_records, daily_quota).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(database: Option<PathBuf>) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load()?;
    if database.is_some() {
        config.database_path = database;
    }
    Ok(config)
}

async fn open_store(config: &ServiceConfig) -> Result<Arc<SqliteGateway>> {
    let path = config.database_path();
    let store = SqliteGateway::open(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_supervisor(
    config: &ServiceConfig,
    store: Arc<dyn PersistenceGateway>,
) -> Result<MissionSupervisor> {
    let launcher: Arc<dyn WorkerLauncher> = match config.worker_mode {
        WorkerMode::InProcess => {
            let extraction = Arc::new(config.extraction_config()?);
            Arc::new(InProcessLauncher::chromium(extraction, Arc::clone(&store)))
        }
        WorkerMode::Process => match &config.worker_binary {
            Some(binary) => Arc::new(ProcessLauncher::new(binary.clone())),
            None => Arc::new(ProcessLauncher::current_exe()?),
        },
    };
    Ok(MissionSupervisor::new(
        store,
        launcher,
        config.supervisor.clone(),
    ))
}

async fn serve(config: ServiceConfig) -> Result<()> {
    let store = open_store(&config).await?;
    let gateway: Arc<dyn PersistenceGateway> = store.clone();
    let supervisor = build_supervisor(&config, Arc::clone(&gateway))?;
    supervisor.recover_orphans().await?;

    let scheduler = JobScheduler::new(gateway, supervisor.clone(), config.scheduler.clone());
    scheduler.restore().await?;
    scheduler.start_monitors();

    tracing::info!(
        database = %config.database_path().display(),
        worker_mode = ?config.worker_mode,
        "mission_scrape serving"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    scheduler.shutdown();
    supervisor.shutdown().await;
    store.close().await;
    Ok(())
}

async fn worker(config: ServiceConfig, invocation: &str) -> Result<()> {
    let invocation: WorkerInvocation =
        serde_json::from_str(invocation).context("Invalid --invocation JSON")?;
    let extraction = Arc::new(config.extraction_config()?);
    let store = open_store(&config).await?;

    let session = BrowserSession::open(&extraction).await?;
    let engine = ExtractionEngine::new(Arc::clone(&extraction), store.clone());
    let reporter = LineProgress::stdout();
    let outcome = engine.run(&session, &invocation, &reporter).await;

    session.close().await;
    store.close().await;
    outcome
        .map(|_| ())
        .with_context(|| format!("Mission {} failed", invocation.mission_id))
}

async fn run_once(
    config: ServiceConfig,
    owner: String,
    keyword: String,
    max_records: Option<u64>,
    daily_quota: Option<u64>,
) -> Result<()> {
    let store = open_store(&config).await?;
    let supervisor = build_supervisor(&config, store.clone())?;

    let limits = config.supervisor.limits(max_records, daily_quota);
    let mission = supervisor
        .create(MissionRequest::manual(owner.clone(), keyword, limits))
        .await?;

    tokio::select! {
        status = supervisor.wait(&mission.id) => {
            status?;
        }
        _ = tokio::signal::ctrl_c() => {
            supervisor.stop(&mission.id, &owner).await?;
            supervisor.wait(&mission.id).await?;
        }
    }

    let finished = supervisor.get(&mission.id, &owner).await?;
    println!("{}", serde_json::to_string_pretty(&finished)?);
    store.close().await;
    Ok(())
}
