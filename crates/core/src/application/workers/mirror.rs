// Inbound email mirror worker (`email_mirror`)

use crate::application::worker::QueueConsumer;
use crate::domain::{ConsumeError, Event};
use crate::port::{EmailMirror, MirroredEmail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const QUEUE: &str = "email_mirror";

pub struct MirrorWorker {
    mirror: Arc<dyn EmailMirror>,
}

impl MirrorWorker {
    pub fn new(mirror: Arc<dyn EmailMirror>) -> Self {
        Self { mirror }
    }
}

#[async_trait]
impl QueueConsumer for MirrorWorker {
    fn queue_name(&self) -> &str {
        QUEUE
    }

    async fn consume(&self, event: &mut Event) -> Result<(), ConsumeError> {
        let email = MirroredEmail {
            message: event.require_str("message")?.to_string(),
            rcpt_to: event.require_str("rcpt_to")?.to_string(),
        };
        debug!(rcpt_to = %email.rcpt_to, bytes = email.message.len(), "Mirroring email");
        self.mirror.mirror(&email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::downstream::mocks::RecordingEmailMirror;

    #[tokio::test]
    async fn test_mirrors_non_ascii_messages_unchanged() {
        let mirror = Arc::new(RecordingEmailMirror::new());
        let worker = MirrorWorker::new(mirror.clone());

        for message in ["\u{f3}test", "test"] {
            let mut event = Event::new()
                .with("message", message)
                .with("time", 1_700_000_000.0)
                .with("rcpt_to", "hamlet@zulip.com");
            worker.consume(&mut event).await.unwrap();
        }

        let messages: Vec<String> = mirror.mirrored().into_iter().map(|m| m.message).collect();
        assert_eq!(messages, vec!["\u{f3}test", "test"]);
    }

    #[tokio::test]
    async fn test_missing_recipient_is_malformed() {
        let mirror = Arc::new(RecordingEmailMirror::new());
        let worker = MirrorWorker::new(mirror.clone());

        let result = worker.consume(&mut Event::new().with("message", "test")).await;

        assert!(matches!(result, Err(ConsumeError::MalformedEvent(_))));
        assert!(mirror.mirrored().is_empty());
    }
}
