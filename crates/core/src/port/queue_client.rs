// Queue Client Port (transport boundary)

use crate::application::worker::ShutdownToken;
use crate::domain::{Event, QueueName};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Handler invoked by the transport once per delivered event
#[async_trait]
pub trait EventCallback: Send + Sync {
    async fn on_event(&self, event: Event);
}

/// Queue transport interface
///
/// Implementations:
/// - InMemoryQueueClient: buffered queue, consumption stops when the backlog is empty
/// - SqliteQueueClient (infra-sqlite): polls a table until shutdown
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Register the callback that receives events from `queue`
    fn register_consumer(&self, queue: &QueueName, callback: Arc<dyn EventCallback>);

    /// Deliver events to registered callbacks, one at a time, in FIFO order
    /// per queue. Returns when the transport has nothing left to deliver or
    /// shutdown is signalled.
    async fn start_consuming(&self, shutdown: ShutdownToken) -> Result<()>;

    /// Remove and return every event currently buffered for `queue`.
    /// A second drain without an intervening publish returns nothing.
    async fn drain_queue(&self, queue: &QueueName) -> Result<Vec<Event>>;

    /// Enqueue an event
    async fn publish(&self, queue: &QueueName, event: &Event) -> Result<()>;
}

/// Buffered in-process transport.
///
/// Events published while consuming (retries, chained work) are appended to
/// the same backlog and delivered before `start_consuming` returns.
#[derive(Default)]
pub struct InMemoryQueueClient {
    consumers: Mutex<HashMap<QueueName, Arc<dyn EventCallback>>>,
    backlog: Mutex<VecDeque<(QueueName, Event)>>,
    published: Mutex<Vec<(QueueName, Event)>>,
}

impl InMemoryQueueClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backlog without counting it as a publish
    pub fn enqueue(&self, queue: &QueueName, event: Event) {
        self.backlog.lock().push_back((queue.clone(), event));
    }

    /// Number of buffered events for `queue`
    pub fn pending(&self, queue: &QueueName) -> usize {
        self.backlog.lock().iter().filter(|(q, _)| q == queue).count()
    }

    /// Every event that went through `publish`, in order
    pub fn published(&self) -> Vec<(QueueName, Event)> {
        self.published.lock().clone()
    }

    fn next_delivery(&self) -> Option<(QueueName, Event)> {
        self.backlog.lock().pop_front()
    }
}

#[async_trait]
impl QueueClient for InMemoryQueueClient {
    fn register_consumer(&self, queue: &QueueName, callback: Arc<dyn EventCallback>) {
        self.consumers.lock().insert(queue.clone(), callback);
    }

    async fn start_consuming(&self, shutdown: ShutdownToken) -> Result<()> {
        while !shutdown.is_shutdown() {
            let Some((queue, event)) = self.next_delivery() else {
                break;
            };

            // Lock released before the callback runs: it may publish.
            let callback = self.consumers.lock().get(&queue).cloned();
            match callback {
                Some(callback) => callback.on_event(event).await,
                None => {
                    tracing::warn!(queue = %queue, "No consumer registered, dropping event");
                }
            }
        }
        Ok(())
    }

    async fn drain_queue(&self, queue: &QueueName) -> Result<Vec<Event>> {
        let mut backlog = self.backlog.lock();
        let mut drained = Vec::new();
        let mut remaining = VecDeque::with_capacity(backlog.len());

        for (q, event) in backlog.drain(..) {
            if &q == queue {
                drained.push(event);
            } else {
                remaining.push_back((q, event));
            }
        }
        *backlog = remaining;

        Ok(drained)
    }

    async fn publish(&self, queue: &QueueName, event: &Event) -> Result<()> {
        self.published.lock().push((queue.clone(), event.clone()));
        self.backlog.lock().push_back((queue.clone(), event.clone()));
        Ok(())
    }
}
