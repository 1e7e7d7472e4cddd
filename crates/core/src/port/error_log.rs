// Error Log Port
// Durable per-queue record of events whose processing failed.

use crate::domain::{Event, QueueName};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ErrorLog: Send + Sync {
    /// Append one failed event to the queue's error record
    async fn append(&self, queue: &QueueName, event: &Event) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;

    /// Keeps failed events in memory
    #[derive(Default)]
    pub struct InMemoryErrorLog {
        entries: Mutex<Vec<(QueueName, Event)>>,
    }

    impl InMemoryErrorLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn entries(&self) -> Vec<(QueueName, Event)> {
            self.entries.lock().clone()
        }

        pub fn events_for(&self, queue: &str) -> Vec<Event> {
            self.entries
                .lock()
                .iter()
                .filter(|(q, _)| q.as_str() == queue)
                .map(|(_, e)| e.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ErrorLog for InMemoryErrorLog {
        async fn append(&self, queue: &QueueName, event: &Event) -> Result<()> {
            self.entries.lock().push((queue.clone(), event.clone()));
            Ok(())
        }
    }
}
