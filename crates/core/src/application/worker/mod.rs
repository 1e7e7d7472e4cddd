// Worker - Queue consumption model

pub mod constants;
mod failure;
mod loop_worker;
mod shutdown;

pub use failure::persist_failed_event;
pub use loop_worker::{BatchConsumer, BatchFailure, LoopQueueProcessingWorker};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::domain::{ConsumeError, DeclarationError, Event, QueueName};
use crate::error::{AppError, Result};
use crate::port::{ErrorLog, EventCallback, QueueClient};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Ready,
    Running,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Uninitialized => write!(f, "UNINITIALIZED"),
            WorkerState::Ready => write!(f, "READY"),
            WorkerState::Running => write!(f, "RUNNING"),
            WorkerState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Per-event handler bound to one queue.
///
/// `consume` is the only required behavior. Returning `Err` never stops the
/// worker: the event is reported through `log_problem` and written to the
/// queue's error log, then the next event is consumed.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Queue this consumer is declared for
    fn queue_name(&self) -> &str;

    async fn consume(&self, event: &mut Event) -> std::result::Result<(), ConsumeError>;

    /// How a failed event is reported. Override to customise or silence.
    fn log_problem(&self, queue: &QueueName, event: &Event, error: &ConsumeError) {
        error!(
            queue = %queue,
            event_id = event.id().unwrap_or("-"),
            error = %error,
            "Problem handling data on queue"
        );
    }
}

/// A worker the registry can build and a supervisor can drive
#[async_trait]
pub trait RunnableWorker: Send {
    fn queue_name(&self) -> &QueueName;

    fn state(&self) -> WorkerState;

    /// Connect to the transport. Valid once, before `start`.
    async fn setup(&mut self) -> Result<()>;

    /// Consume until the transport is exhausted or shutdown is signalled
    async fn start(&mut self, shutdown: ShutdownToken) -> Result<()>;
}

pub(crate) fn transition(
    queue: &QueueName,
    state: &mut WorkerState,
    from: WorkerState,
    to: WorkerState,
) -> Result<()> {
    if *state != from {
        return Err(AppError::InvalidState(format!(
            "Worker for queue {} cannot go from {} to {}",
            queue, state, to
        )));
    }
    *state = to;
    Ok(())
}

/// Callback registered with the transport: runs `consume` and takes the
/// failure path when it returns an error. The event is recorded as `consume`
/// left it, so a retry counter written during the attempt is kept.
struct ConsumeCallback {
    queue: QueueName,
    consumer: Arc<dyn QueueConsumer>,
    error_log: Arc<dyn ErrorLog>,
}

#[async_trait]
impl EventCallback for ConsumeCallback {
    async fn on_event(&self, mut event: Event) {
        debug!(queue = %self.queue, event_id = ?event.id(), "Consuming event");

        if let Err(e) = self.consumer.consume(&mut event).await {
            self.consumer.log_problem(&self.queue, &event, &e);
            persist_failed_event(self.error_log.as_ref(), &self.queue, &event).await;
        }
    }
}

/// Standard worker: one `consume` call per delivered event
pub struct QueueProcessingWorker {
    queue: QueueName,
    consumer: Arc<dyn QueueConsumer>,
    client: Arc<dyn QueueClient>,
    error_log: Arc<dyn ErrorLog>,
    state: WorkerState,
}

impl QueueProcessingWorker {
    /// Create a worker for `consumer`.
    ///
    /// # Errors
    /// - `DeclarationError::MissingQueueName` if the consumer declares no queue
    /// - `DeclarationError::InvalidQueueName` if the declared name is invalid
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        client: Arc<dyn QueueClient>,
        error_log: Arc<dyn ErrorLog>,
    ) -> std::result::Result<Self, DeclarationError> {
        let queue = QueueName::parse(consumer.queue_name())?;
        Ok(Self {
            queue,
            consumer,
            client,
            error_log,
            state: WorkerState::Uninitialized,
        })
    }
}

#[async_trait]
impl RunnableWorker for QueueProcessingWorker {
    fn queue_name(&self) -> &QueueName {
        &self.queue
    }

    fn state(&self) -> WorkerState {
        self.state
    }

    async fn setup(&mut self) -> Result<()> {
        transition(
            &self.queue,
            &mut self.state,
            WorkerState::Uninitialized,
            WorkerState::Ready,
        )?;

        let callback = Arc::new(ConsumeCallback {
            queue: self.queue.clone(),
            consumer: Arc::clone(&self.consumer),
            error_log: Arc::clone(&self.error_log),
        });
        self.client.register_consumer(&self.queue, callback);

        info!(queue = %self.queue, "Worker ready");
        Ok(())
    }

    async fn start(&mut self, shutdown: ShutdownToken) -> Result<()> {
        transition(
            &self.queue,
            &mut self.state,
            WorkerState::Ready,
            WorkerState::Running,
        )?;
        info!(queue = %self.queue, "Worker started");

        let result = self.client.start_consuming(shutdown).await;

        self.state = WorkerState::Stopped;
        match &result {
            Ok(()) => info!(queue = %self.queue, "Worker stopped"),
            Err(e) => error!(queue = %self.queue, error = %e, "Worker stopped on transport error"),
        }
        result
    }
}
