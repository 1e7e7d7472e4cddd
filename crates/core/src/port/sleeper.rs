// Sleeper Port
// Looping workers sleep through this trait so tests can stop the loop
// without touching a global timer.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::application::worker::ShutdownSender;
    use parking_lot::Mutex;

    /// Records every requested sleep and signals shutdown once `stop_after`
    /// sleeps have been requested. Never actually waits.
    pub struct RecordingSleeper {
        durations: Mutex<Vec<Duration>>,
        stop_after: usize,
        shutdown: ShutdownSender,
    }

    impl RecordingSleeper {
        pub fn new(stop_after: usize, shutdown: ShutdownSender) -> Self {
            Self {
                durations: Mutex::new(Vec::new()),
                stop_after,
                shutdown,
            }
        }

        pub fn durations(&self) -> Vec<Duration> {
            self.durations.lock().clone()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            let mut durations = self.durations.lock();
            durations.push(duration);
            if durations.len() >= self.stop_after {
                self.shutdown.shutdown();
            }
        }
    }
}
