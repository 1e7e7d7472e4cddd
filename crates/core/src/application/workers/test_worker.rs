// Deployment smoke-test worker (`test`)

use crate::application::worker::QueueConsumer;
use crate::domain::{ConsumeError, Event};
use crate::port::TestSink;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const QUEUE: &str = "test";

/// Writes every event it receives to the test sink
pub struct TestWorker {
    sink: Arc<dyn TestSink>,
}

impl TestWorker {
    pub fn new(sink: Arc<dyn TestSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl QueueConsumer for TestWorker {
    fn queue_name(&self) -> &str {
        QUEUE
    }

    async fn consume(&self, event: &mut Event) -> Result<(), ConsumeError> {
        info!(event = %event.to_json(), "TestWorker received event");
        self.sink.write(event).await
    }
}
