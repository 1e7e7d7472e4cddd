// Worker supervision: one tokio task per queue worker

use crate::settings::Settings;
use anyhow::{bail, Result};
use courier_core::application::{RunnableWorker, ShutdownToken, WorkerContext, WorkerRegistry};
use courier_core::domain::{QueueName, WorkerKind};
use courier_core::port::time_provider::SystemTimeProvider;
use courier_core::port::{TimeProvider, TokioSleeper};
use courier_infra_sqlite::{SqlitePool, SqliteQueueClient};
use courier_infra_system::{
    ConsoleActivityRecorder, ConsoleEmailMirror, ConsoleEmailSender, ConsoleInvitationMailer,
    ConsoleMailingList, ConsoleNotifier, FileErrorLog, JsonLinesTestSink,
};
use std::sync::Arc;
use tracing::{error, info};

/// Queues a `run` invocation covers: the named one, or with `all` every
/// registered worker except `test` ones.
pub fn select_queues(
    registry: &WorkerRegistry,
    queue_name: Option<String>,
    all: bool,
) -> Result<Vec<QueueName>> {
    if all {
        return Ok(registry
            .declarations()
            .into_iter()
            .filter(|d| d.kind != WorkerKind::Test)
            .map(|d| d.queue_name)
            .collect());
    }

    let Some(name) = queue_name else {
        bail!("either --queue-name or --all is required");
    };
    if !registry.contains(&name) {
        bail!("No worker registered for queue '{}'", name);
    }
    Ok(vec![QueueName::parse(name)?])
}

pub struct Supervisor {
    registry: WorkerRegistry,
    pool: SqlitePool,
    settings: Settings,
}

impl Supervisor {
    pub fn new(registry: WorkerRegistry, pool: SqlitePool, settings: Settings) -> Self {
        Self {
            registry,
            pool,
            settings,
        }
    }

    /// Ports for one worker. Every worker gets its own queue client so a
    /// transport only ever delivers to the consumer registered on it.
    fn context(&self) -> WorkerContext {
        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        WorkerContext {
            client: Arc::new(SqliteQueueClient::new(
                self.pool.clone(),
                Arc::clone(&time_provider),
            )),
            error_log: Arc::new(FileErrorLog::new(
                self.settings.error_dir.clone(),
                time_provider,
            )),
            sleeper: Arc::new(TokioSleeper),
            notifier: Arc::new(ConsoleNotifier),
            email_sender: Arc::new(ConsoleEmailSender),
            mailing_list: Arc::new(ConsoleMailingList),
            activity_recorder: Arc::new(ConsoleActivityRecorder),
            invitation_mailer: Arc::new(ConsoleInvitationMailer),
            email_mirror: Arc::new(ConsoleEmailMirror),
            test_sink: Arc::new(JsonLinesTestSink::new(self.settings.test_sink_path.clone())),
        }
    }

    /// Run the workers for `queues` until they stop or shutdown is signalled
    pub async fn run(&self, queues: Vec<QueueName>, shutdown: ShutdownToken) -> Result<()> {
        // Every worker is built before any is spawned.
        let workers = queues
            .into_iter()
            .map(|queue| {
                let worker = self.registry.build(queue.as_str(), &self.context())?;
                Ok((queue, worker))
            })
            .collect::<courier_core::Result<Vec<_>>>()?;

        let mut handles = Vec::with_capacity(workers.len());
        for (queue, worker) in workers {
            let token = shutdown.clone();
            handles.push(tokio::spawn(async move {
                let result = run_worker(worker, token).await;
                (queue, result)
            }));
        }

        info!(workers = handles.len(), "Workers started");

        let mut failed = 0;
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((queue, Err(e))) => {
                    failed += 1;
                    error!(queue = %queue, error = %e, "Worker failed");
                }
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "Worker task panicked");
                }
            }
        }

        if failed > 0 {
            bail!("{} worker(s) stopped with errors", failed);
        }
        Ok(())
    }
}

async fn run_worker(
    mut worker: Box<dyn RunnableWorker>,
    shutdown: ShutdownToken,
) -> courier_core::Result<()> {
    worker.setup().await?;
    worker.start(shutdown).await
}
