// Application Layer - Worker model and built-in workers

pub mod registry;
pub mod retry;
pub mod worker;
pub mod workers;

// Re-exports
pub use registry::WorkerRegistry;
pub use retry::{retry_event, RetryDecision, RetryOnFailure};
pub use worker::{
    shutdown_channel, BatchConsumer, BatchFailure, LoopQueueProcessingWorker, QueueConsumer,
    QueueProcessingWorker, RunnableWorker, ShutdownSender, ShutdownToken, WorkerState,
};
pub use workers::{register_builtin_workers, WorkerContext};
