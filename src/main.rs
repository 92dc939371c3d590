use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use queues_db_hooks::config::{AppConfig, CliConfig, FileConfig, DEFAULT_HOURS};
use queues_db_hooks::{
    JobEventData, JobEventDelegate, JobRecordStore, JobStats, LifecycleRecorder,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[clap(about = "Inspect and maintain a job completions database")]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[clap(long = "db")]
    pub db_path: Option<PathBuf>,

    /// Database engine: sqlite, postgres or mysql.
    #[clap(long)]
    pub engine: Option<String>,

    /// Trailing window in hours used when a command doesn't give one.
    #[clap(long, default_value_t = DEFAULT_HOURS)]
    pub default_hours: i64,

    /// Truncate payloads recorded through `record dispatch` to this many bytes.
    #[clap(long)]
    pub payload_max_bytes: Option<usize>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database or migrate it to the latest schema.
    Migrate,
    /// Drop the job completions table.
    Revert,
    /// Count queued and running jobs.
    Status,
    /// Count jobs completed in the trailing window and their success rate.
    Completed {
        #[clap(long)]
        hours: Option<i64>,
    },
    /// Average run and wait time of jobs completed in the trailing window.
    Timing {
        #[clap(long)]
        hours: Option<i64>,
        #[clap(long)]
        job_name: Option<String>,
    },
    /// Print the record of a single job.
    Show { job_id: String },
    /// Record a lifecycle event by hand.
    #[clap(subcommand)]
    Record(RecordCommand),
}

#[derive(Subcommand, Debug)]
enum RecordCommand {
    Dispatch {
        #[clap(long)]
        job_id: Option<String>,
        #[clap(long)]
        job_name: String,
        #[clap(long, default_value = "default")]
        queue: String,
        #[clap(long, default_value = "{}")]
        payload: String,
        #[clap(long, default_value_t = 0)]
        max_retry_count: i64,
        /// RFC 3339 timestamp before which the job must not run.
        #[clap(long)]
        delay_until: Option<DateTime<Utc>>,
    },
    Dequeue {
        job_id: String,
    },
    Success {
        job_id: String,
    },
    Error {
        job_id: String,
        message: String,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn record(
    config: &AppConfig,
    store: Arc<dyn JobRecordStore>,
    command: RecordCommand,
) -> Result<()> {
    let hook = config.notification_hook(store);
    match command {
        RecordCommand::Dispatch {
            job_id,
            job_name,
            queue,
            payload,
            max_retry_count,
            delay_until,
        } => {
            let id = job_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            hook.dispatched(JobEventData {
                id: id.clone(),
                job_name,
                queue_name: queue,
                payload: payload.into_bytes(),
                max_retry_count,
                delay_until,
                queued_at: Utc::now(),
            })
            .await?;
            println!("{}", id);
        }
        RecordCommand::Dequeue { job_id } => hook.did_dequeue(&job_id).await?,
        RecordCommand::Success { job_id } => hook.success(&job_id).await?,
        RecordCommand::Error { job_id, message } => {
            let error = std::io::Error::new(std::io::ErrorKind::Other, message);
            hook.error(&job_id, &error).await?
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        engine: cli_args.engine.clone(),
        default_hours: cli_args.default_hours,
        payload_max_bytes: cli_args.payload_max_bytes,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening {} database at {:?}...", config.engine, config.db_path);
    let store = Arc::new(
        config
            .open_store()
            .with_context(|| format!("Failed to open database at {:?}", config.db_path))?,
    );

    match cli_args.command {
        Command::Migrate => info!("Database schema is up to date"),
        Command::Revert => {
            store.revert()?;
            info!("Dropped job completions table");
        }
        Command::Status => {
            print_json(&JobStats::new(store)?.get_status_of_current_jobs()?)?;
        }
        Command::Completed { hours } => {
            let hours = hours.unwrap_or(config.default_hours);
            print_json(&JobStats::new(store)?.get_completed_jobs_for_time_period(hours)?)?;
        }
        Command::Timing { hours, job_name } => {
            let hours = hours.unwrap_or(config.default_hours);
            let stats = JobStats::new(store)?;
            print_json(&stats.get_timing_data_for_jobs(hours, job_name.as_deref())?)?;
        }
        Command::Show { job_id } => {
            print_json(&LifecycleRecorder::new(store).get_record(&job_id)?)?;
        }
        Command::Record(command) => record(&config, store, command).await?,
    }

    Ok(())
}
