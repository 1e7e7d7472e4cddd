// Missed-message digest worker
//
// Collects `missedmessage_emails` events per recipient over a two minute
// window, then sends each recipient a single notification for everything
// they missed in that window.

use crate::application::worker::constants::MISSED_MESSAGE_SLEEP_DELAY;
use crate::application::worker::{BatchConsumer, BatchFailure};
use crate::domain::{ConsumeError, Event};
use crate::port::MissedMessageNotifier;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const QUEUE: &str = "missedmessage_emails";

const RECIPIENT_FIELD: &str = "user_profile_id";
const MESSAGE_FIELD: &str = "message_id";

/// Everything collected for one recipient since the last flush
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecipientBatch {
    pub message_ids: Vec<i64>,
    pub events: Vec<Event>,
}

/// Per-recipient accumulator, iterated in ascending recipient id order
#[derive(Debug, Default)]
pub struct RecipientAccumulator {
    entries: BTreeMap<i64, RecipientBatch>,
}

impl RecipientAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to its recipient's batch, keeping arrival order
    pub fn absorb(&mut self, event: Event) -> Result<(), ConsumeError> {
        let recipient = event.require_i64(RECIPIENT_FIELD)?;
        let message_id = event.require_i64(MESSAGE_FIELD)?;

        let batch = self.entries.entry(recipient).or_default();
        batch.message_ids.push(message_id);
        batch.events.push(event);
        Ok(())
    }

    /// Remove and return the next recipient's batch
    pub fn pop_first(&mut self) -> Option<(i64, RecipientBatch)> {
        self.entries.pop_first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct MissedMessageWorker {
    notifier: Arc<dyn MissedMessageNotifier>,
}

impl MissedMessageWorker {
    pub fn new(notifier: Arc<dyn MissedMessageNotifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl BatchConsumer for MissedMessageWorker {
    fn queue_name(&self) -> &str {
        QUEUE
    }

    fn sleep_delay(&self) -> Duration {
        MISSED_MESSAGE_SLEEP_DELAY
    }

    async fn consume_batch(&self, events: Vec<Event>) -> Vec<BatchFailure> {
        let mut failures = Vec::new();
        let mut accumulator = RecipientAccumulator::new();

        for event in events {
            debug!(event = %event.to_json(), "Received missedmessage_emails event");
            let copy = event.clone();
            if let Err(e) = accumulator.absorb(event) {
                failures.push(BatchFailure::new(vec![copy], e));
            }
        }

        // Each entry leaves the accumulator before its call, so it is cleared
        // whether or not the notification goes through.
        while let Some((user_profile_id, batch)) = accumulator.pop_first() {
            let count = batch.message_ids.len();
            if count == 0 {
                continue;
            }

            match self
                .notifier
                .notify(user_profile_id, &batch.message_ids, count)
                .await
            {
                Ok(()) => info!(user_profile_id, count, "Sent missed message notification"),
                Err(e) => failures.push(BatchFailure::new(batch.events, e)),
            }
        }

        failures
    }
}
