// Mailing-list signup worker (`signups`)

use crate::application::retry::{retry_event, RetryDecision};
use crate::application::worker::constants::MAX_REQUEST_RETRIES;
use crate::application::worker::QueueConsumer;
use crate::domain::{ConsumeError, DeclarationError, Event, QueueName};
use crate::port::{MailingList, QueueClient, SubscribeOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const QUEUE: &str = "signups";

const SERVICE: &str = "mailing list";

/// Subscribes new users to the mailing list.
///
/// "Already a member" is not an error. Any other refusal is retried through
/// `retry_event`; once the ceiling is reached `RetriesExhausted` is returned
/// so the event lands in the error log.
pub struct SignupWorker {
    queue: QueueName,
    client: Arc<dyn QueueClient>,
    mailing_list: Arc<dyn MailingList>,
}

impl SignupWorker {
    pub fn new(
        client: Arc<dyn QueueClient>,
        mailing_list: Arc<dyn MailingList>,
    ) -> Result<Self, DeclarationError> {
        Ok(Self {
            queue: QueueName::parse(QUEUE)?,
            client,
            mailing_list,
        })
    }
}

#[async_trait]
impl QueueConsumer for SignupWorker {
    fn queue_name(&self) -> &str {
        self.queue.as_str()
    }

    async fn consume(&self, event: &mut Event) -> Result<(), ConsumeError> {
        let user_id = event.require_i64("user_id")?;
        info!(user_id, "Processing signup");

        let reason = match self.mailing_list.subscribe(user_id, event).await? {
            SubscribeOutcome::Subscribed => return Ok(()),
            SubscribeOutcome::AlreadyMember => {
                warn!(user_id, "Attempted to sign up already existing email to list");
                return Ok(());
            }
            SubscribeOutcome::Rejected(reason) => reason,
        };

        let decision = retry_event(
            self.client.as_ref(),
            &self.queue,
            event,
            MAX_REQUEST_RETRIES,
            |failed| {
                error!(
                    user_id,
                    failed_tries = failed.failed_tries(),
                    reason = %reason,
                    "Signup rejected by mailing list, giving up"
                )
            },
        )
        .await
        .map_err(|e| ConsumeError::Republish(e.to_string()))?;

        match decision {
            RetryDecision::Republished(_) => Ok(()),
            RetryDecision::GaveUp(tries) => Err(ConsumeError::retries_exhausted(
                tries,
                ConsumeError::rejected(SERVICE, reason),
            )),
        }
    }
}
