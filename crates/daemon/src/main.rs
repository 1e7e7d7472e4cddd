//! process-queue - Courier queue worker runner

mod logging;
mod replay;
mod settings;
mod supervisor;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::{info, warn};

use courier_core::application::{register_builtin_workers, shutdown_channel, WorkerRegistry};
use courier_core::domain::{Event, QueueName, WorkerKind};
use courier_core::port::time_provider::SystemTimeProvider;
use courier_core::port::QueueClient;
use courier_core::VERSION;
use courier_infra_sqlite::{create_pool, run_migrations, SqlitePool, SqliteQueueClient};
use courier_infra_system::FileErrorLog;
use settings::Settings;
use supervisor::{select_queues, Supervisor};

/// How long running workers get to finish their current event after Ctrl+C
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "process-queue")]
#[command(about = "Run Courier queue workers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker for one queue, or every non-test worker
    Run {
        /// Queue whose worker to run
        #[arg(long, conflicts_with = "all", required_unless_present = "all")]
        queue_name: Option<String>,

        /// Run all consumer and loop workers
        #[arg(long)]
        all: bool,
    },

    /// List registered queues
    ListQueues {
        /// Only queues of this kind (consumer, loop, test)
        #[arg(long)]
        kind: Option<WorkerKind>,
    },

    /// Publish one event
    Publish {
        #[arg(long)]
        queue_name: String,

        /// Event as a JSON object
        #[arg(long)]
        payload: String,
    },

    /// Republish a queue's failed events and archive its error file
    ReplayErrors {
        #[arg(long)]
        queue_name: String,
    },
}

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    kind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    let _log_guard = logging::init(&settings)?;

    let mut registry = WorkerRegistry::new();
    register_builtin_workers(&mut registry)?;

    match cli.command {
        Commands::Run { queue_name, all } => {
            let queues = select_queues(&registry, queue_name, all)?;

            info!(version = VERSION, queues = queues.len(), "Courier starting");
            let pool = open_pool(&settings).await?;
            let supervisor = Supervisor::new(registry, pool, settings);
            run_until_ctrl_c(&supervisor, queues).await?;
            info!("Shutdown complete");
        }

        Commands::ListQueues { kind } => {
            let rows: Vec<QueueRow> = registry
                .declarations()
                .into_iter()
                .filter(|d| kind.map_or(true, |k| d.kind == k))
                .map(|d| QueueRow {
                    queue: d.queue_name.to_string(),
                    kind: d.kind.to_string(),
                })
                .collect();
            println!("{}", Table::new(rows));
        }

        Commands::Publish {
            queue_name,
            payload,
        } => {
            let queue = QueueName::parse(queue_name)?;
            let event = Event::from_json(&payload).context("Invalid JSON payload")?;
            let client = sqlite_client(&settings).await?;
            client.publish(&queue, &event).await?;
            println!("{}", format!("✓ Event published to {}", queue).green().bold());
        }

        Commands::ReplayErrors { queue_name } => {
            let queue = QueueName::parse(queue_name)?;
            let error_log = FileErrorLog::new(settings.error_dir.clone(), Arc::new(SystemTimeProvider));
            let client = sqlite_client(&settings).await?;
            let report = replay::replay_errors(&error_log, &client, &queue).await?;
            if report.republished == 0 {
                println!("{}", format!("No failed events for {}", queue).yellow());
                return Ok(());
            }

            println!(
                "{}",
                format!("✓ {} event(s) republished to {}", report.republished, queue)
                    .green()
                    .bold()
            );
            if let Some(path) = report.archived {
                println!("  {} {}", "Archived:".bold(), path.display());
            }
        }
    }

    Ok(())
}

async fn open_pool(settings: &Settings) -> Result<SqlitePool> {
    if let Some(parent) = settings.db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    info!(db_path = %settings.db_path.display(), "Initializing database");
    let pool = create_pool(&settings.database_url())
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;
    Ok(pool)
}

async fn sqlite_client(settings: &Settings) -> Result<SqliteQueueClient> {
    let pool = open_pool(settings).await?;
    Ok(SqliteQueueClient::new(pool, Arc::new(SystemTimeProvider)))
}

async fn run_until_ctrl_c(supervisor: &Supervisor, queues: Vec<QueueName>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let run = supervisor.run(queues, shutdown_rx);
    tokio::pin!(run);

    info!("Press Ctrl+C to shutdown");
    tokio::select! {
        result = &mut run => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Shutdown signal received. Stopping workers...");
            shutdown_tx.shutdown();
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Workers did not stop in time");
                    Ok(())
                }
            }
        }
    }
}
