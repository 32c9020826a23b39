//! Command-line interface for crm-sync
//!
//! # Usage Examples
//!
//! ## Scheduled sync
//! ```bash
//! # Poll every pollIntervalMs after pollStartDelayMs, until Ctrl-C
//! crm-sync run --config crm-sync.toml
//! ```
//!
//! ## Single cycle
//! ```bash
//! # Poll once, wait up to 240s for the job and print its summary
//! crm-sync once --config crm-sync.toml --timeout 240s --poll-interval 500ms
//! ```
//!
//! ## Watermark
//! ```bash
//! crm-sync watermark show --config crm-sync.toml
//! crm-sync watermark set --config crm-sync.toml 2024-01-01T00:00:00.000Z
//! ```
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=crm_sync=debug`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crm_sync::salesforce::JsonlSource;
use crm_sync::siebel::JsonFileTarget;
use crm_sync::watermark::{FilesystemStore, Watermark, WatermarkStore};
use crm_sync::{CycleOutcome, FileConfig, Schedule, Scheduler, SyncEngine};

#[derive(Parser)]
#[command(name = "crm-sync")]
#[command(about = "One-way Account/Contact sync from Salesforce to Siebel")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "crm-sync.toml", env = "CRM_SYNC_CONFIG")]
    config: PathBuf,

    /// Override the flow name from the config file
    #[arg(long, env = "CRM_SYNC_FLOW")]
    flow_name: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on a timer until interrupted
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// How long to wait for a running job after Ctrl-C
        #[arg(long, default_value = "60s", value_parser = parse_duration_arg)]
        shutdown_timeout: Duration,
    },

    /// Run a single poll cycle and wait for its job
    Once {
        #[command(flatten)]
        config: ConfigArgs,

        /// Maximum time to wait for the job to terminate
        #[arg(long, default_value = "240s", value_parser = parse_duration_arg)]
        timeout: Duration,

        /// How often to check the job state while waiting
        #[arg(long, default_value = "500ms", value_parser = parse_duration_arg)]
        poll_interval: Duration,
    },

    /// Inspect or rewind the watermark
    Watermark {
        #[command(subcommand)]
        command: WatermarkCommand,
    },
}

#[derive(Subcommand)]
enum WatermarkCommand {
    /// Print the current watermark
    Show {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Overwrite the watermark, e.g. to replay changes since a point in time
    Set {
        #[command(flatten)]
        config: ConfigArgs,

        /// New watermark, RFC 3339 (e.g. 2024-01-01T00:00:00.000Z)
        value: String,
    },
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    sync_core::parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            shutdown_timeout,
        } => run_scheduled(config, shutdown_timeout).await,
        Commands::Once {
            config,
            timeout,
            poll_interval,
        } => run_single_cycle(config, timeout, poll_interval).await,
        Commands::Watermark { command } => match command {
            WatermarkCommand::Show { config } => {
                let file_config = load_config(&config)?;
                let store = watermark_store(&file_config)?;
                let current = store.get().await?;
                match store.stored().await? {
                    Some(stored) => println!(
                        "{} {} (updated {})",
                        store.flow(),
                        current,
                        stored.updated_at.to_rfc3339()
                    ),
                    None => println!("{} {} (default, never advanced)", store.flow(), current),
                }
                Ok(())
            }
            WatermarkCommand::Set { config, value } => {
                let file_config = load_config(&config)?;
                let store = watermark_store(&file_config)?;
                let watermark = Watermark::from_cli_string(&value)?;
                store.reset(watermark).await?;
                println!("{} {}", store.flow(), watermark);
                Ok(())
            }
        },
    }
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<FileConfig> {
    let mut config = FileConfig::from_file(&args.config)?;
    if let Some(flow_name) = &args.flow_name {
        config.flow_name = flow_name.clone();
    }
    Ok(config)
}

fn watermark_store(config: &FileConfig) -> anyhow::Result<Arc<WatermarkStore>> {
    let default = config
        .sync
        .default_watermark()
        .context("Invalid defaultWatermarkExpression")?;
    let store = WatermarkStore::new(
        Arc::new(FilesystemStore::new(&config.watermark.dir)),
        config.flow_name.clone(),
        &default,
    )?;
    Ok(Arc::new(store))
}

fn build_engine(
    config: &FileConfig,
) -> anyhow::Result<Arc<SyncEngine<JsonlSource, JsonFileTarget>>> {
    let watermarks = watermark_store(config)?;
    tracing::info!(
        "Flow '{}': source {}, target {}, watermarks in {}",
        config.flow_name,
        config.source.path.display(),
        config.target.path.display(),
        config.watermark.dir.display()
    );
    Ok(Arc::new(SyncEngine::new(
        Arc::new(JsonlSource::new(&config.source.path)),
        Arc::new(JsonFileTarget::new(&config.target.path)),
        watermarks,
        config.sync.clone(),
    )))
}

async fn run_scheduled(args: ConfigArgs, shutdown_timeout: Duration) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let engine = build_engine(&config)?;

    let mut scheduler = Scheduler::new();
    scheduler.register(
        config.flow_name.clone(),
        engine.clone(),
        Schedule::from_config(&config.sync),
    )?;
    scheduler.start(&config.flow_name)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    scheduler.stop_all();

    if let Some(job) = engine.last_job().await {
        if !job.is_terminal() {
            tracing::info!("Waiting for job {} to finish", job.job_id());
            let summary = job
                .await_termination(shutdown_timeout, Duration::from_millis(500))
                .await?;
            tracing::info!("Job {} finished {}", summary.job_id, summary.state);
        }
    }
    Ok(())
}

async fn run_single_cycle(
    args: ConfigArgs,
    timeout: Duration,
    poll_interval: Duration,
) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let engine = build_engine(&config)?;

    match engine.run_once().await? {
        CycleOutcome::Dispatched(job) => {
            job.await_termination(timeout, poll_interval).await?;
            let summary = job.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            job.assert_successful()?;
        }
        CycleOutcome::Empty {
            watermark,
            advanced_to,
        } => match advanced_to {
            Some(advanced) => {
                println!("No changes since {watermark}; watermark advanced to {advanced}")
            }
            None => println!("No changes since {watermark}"),
        },
        CycleOutcome::Skipped { .. } => println!("Another cycle is in progress"),
    }
    Ok(())
}
