// Looping worker - periodic drain-and-sleep batches

use super::{persist_failed_event, transition, RunnableWorker, ShutdownToken, WorkerState};
use crate::domain::{ConsumeError, DeclarationError, Event, QueueName};
use crate::error::Result;
use crate::port::{ErrorLog, QueueClient, Sleeper};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Events whose processing failed inside a batch, with the cause
#[derive(Debug)]
pub struct BatchFailure {
    pub events: Vec<Event>,
    pub error: ConsumeError,
}

impl BatchFailure {
    pub fn new(events: Vec<Event>, error: ConsumeError) -> Self {
        Self { events, error }
    }
}

/// Handler that receives everything drained from its queue in one call
#[async_trait]
pub trait BatchConsumer: Send + Sync {
    fn queue_name(&self) -> &str;

    /// Fixed pause between drain cycles
    fn sleep_delay(&self) -> Duration;

    /// Process one drained batch. Failures are returned rather than raised so
    /// the rest of the batch still gets processed.
    async fn consume_batch(&self, events: Vec<Event>) -> Vec<BatchFailure>;

    fn log_problem(&self, queue: &QueueName, failure: &BatchFailure) {
        error!(
            queue = %queue,
            events = failure.events.len(),
            error = %failure.error,
            "Problem handling batch on queue"
        );
    }
}

/// Worker that drains its queue, hands the batch over, then sleeps
pub struct LoopQueueProcessingWorker {
    queue: QueueName,
    consumer: Arc<dyn BatchConsumer>,
    client: Arc<dyn QueueClient>,
    error_log: Arc<dyn ErrorLog>,
    sleeper: Arc<dyn Sleeper>,
    state: WorkerState,
}

impl LoopQueueProcessingWorker {
    pub fn new(
        consumer: Arc<dyn BatchConsumer>,
        client: Arc<dyn QueueClient>,
        error_log: Arc<dyn ErrorLog>,
        sleeper: Arc<dyn Sleeper>,
    ) -> std::result::Result<Self, DeclarationError> {
        let queue = QueueName::parse(consumer.queue_name())?;
        Ok(Self {
            queue,
            consumer,
            client,
            error_log,
            sleeper,
            state: WorkerState::Uninitialized,
        })
    }

    /// Run one drain cycle; returns the number of events drained
    async fn run_cycle(&self) -> Result<usize> {
        let events = self.client.drain_queue(&self.queue).await?;
        let drained = events.len();
        debug!(queue = %self.queue, drained, "Drained queue");

        for failure in self.consumer.consume_batch(events).await {
            self.consumer.log_problem(&self.queue, &failure);
            for event in &failure.events {
                persist_failed_event(self.error_log.as_ref(), &self.queue, event).await;
            }
        }
        Ok(drained)
    }
}

#[async_trait]
impl RunnableWorker for LoopQueueProcessingWorker {
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
        info!(queue = %self.queue, "Loop worker ready");
        Ok(())
    }

    async fn start(&mut self, mut shutdown: ShutdownToken) -> Result<()> {
        transition(
            &self.queue,
            &mut self.state,
            WorkerState::Ready,
            WorkerState::Running,
        )?;

        let delay = self.consumer.sleep_delay();
        info!(queue = %self.queue, sleep_secs = delay.as_secs(), "Loop worker started");

        let result = loop {
            if shutdown.is_shutdown() {
                break Ok(());
            }

            if let Err(e) = self.run_cycle().await {
                break Err(e);
            }

            if shutdown.is_shutdown() {
                break Ok(());
            }

            tokio::select! {
                _ = self.sleeper.sleep(delay) => {},
                _ = shutdown.wait() => {
                    info!(queue = %self.queue, "Loop worker interrupted during sleep");
                    break Ok(());
                }
            }
        };

        self.state = WorkerState::Stopped;
        match &result {
            Ok(()) => info!(queue = %self.queue, "Loop worker stopped"),
            Err(e) => error!(queue = %self.queue, error = %e, "Loop worker stopped on transport error"),
        }
        result
    }
}
