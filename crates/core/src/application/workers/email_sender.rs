// Outbound email workers (`email_senders`, `missedmessage_email_senders`)

use crate::application::worker::QueueConsumer;
use crate::domain::{ConsumeError, Event};
use crate::port::{EmailRequest, EmailSender};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub const EMAIL_SENDERS_QUEUE: &str = "email_senders";
pub const MISSED_MESSAGE_EMAIL_SENDERS_QUEUE: &str = "missedmessage_email_senders";

/// Sends the email described by each event.
///
/// Registered wrapped in `RetryOnFailure`, so a dropped mail connection is
/// redelivered up to the retry ceiling instead of going straight to the
/// error log.
pub struct EmailSendingWorker {
    queue: &'static str,
    sender: Arc<dyn EmailSender>,
}

impl EmailSendingWorker {
    pub fn new(queue: &'static str, sender: Arc<dyn EmailSender>) -> Self {
        Self { queue, sender }
    }
}

#[async_trait]
impl QueueConsumer for EmailSendingWorker {
    fn queue_name(&self) -> &str {
        self.queue
    }

    async fn consume(&self, event: &mut Event) -> Result<(), ConsumeError> {
        let email = EmailRequest::from_event(event)?;
        debug!(
            queue = self.queue,
            template = %email.template_prefix,
            recipients = email.to_emails.len(),
            "Sending email"
        );
        self.sender.send_email(&email).await
    }
}
