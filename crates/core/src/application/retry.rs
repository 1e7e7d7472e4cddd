// Retry logic
//
// The retry counter lives in the event (`failed_tries`), so redelivery through
// any at-least-once transport is enough: no side table is kept. Republish is
// immediate; there is no backoff between attempts.

use crate::application::worker::constants::MAX_REQUEST_RETRIES;
use crate::application::worker::QueueConsumer;
use crate::domain::{ConsumeError, DeclarationError, Event, QueueName};
use crate::error::Result;
use crate::port::QueueClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Event was put back on its queue; carries the new `failed_tries`
    Republished(u32),
    /// Retry ceiling reached, terminal hook called; carries the final `failed_tries`
    GaveUp(u32),
}

/// Count one failed attempt on `event` and either republish it or give up.
///
/// `failed_tries` is incremented and written back into the event. While it is
/// within `max_retries` the event is republished on `queue`; past that,
/// `on_failure` is called and nothing is republished.
///
/// # Example
/// ```text
/// match retry_event(client, &queue, &mut event, MAX_REQUEST_RETRIES, |e| log(e)).await? {
///     RetryDecision::Republished(tries) => { /* will be redelivered */ }
///     RetryDecision::GaveUp(tries) => { /* dropped, hook already ran */ }
/// }
/// ```
pub async fn retry_event<F>(
    client: &dyn QueueClient,
    queue: &QueueName,
    event: &mut Event,
    max_retries: u32,
    on_failure: F,
) -> Result<RetryDecision>
where
    F: FnOnce(&Event) + Send,
{
    let tries = event.failed_tries().saturating_add(1);
    event.set_failed_tries(tries);

    if tries > max_retries {
        warn!(
            queue = %queue,
            event_id = event.id().unwrap_or("-"),
            failed_tries = tries,
            max_retries = max_retries,
            "Max retry attempts reached"
        );
        on_failure(event);
        return Ok(RetryDecision::GaveUp(tries));
    }

    client.publish(queue, event).await?;
    info!(
        queue = %queue,
        event_id = event.id().unwrap_or("-"),
        failed_tries = tries,
        "Event republished for retry"
    );
    Ok(RetryDecision::Republished(tries))
}

/// Called once for an event that exhausted its retries
pub type FailureHook = Arc<dyn Fn(&QueueName, &Event) + Send + Sync>;

fn log_terminal_failure(queue: &QueueName, event: &Event) {
    error!(
        queue = %queue,
        event_id = event.id().unwrap_or("-"),
        failed_tries = event.failed_tries(),
        event = %event.to_json(),
        "Event failed after retries, giving up"
    );
}

/// Wraps a consumer so that retryable failures are redelivered instead of
/// reaching the generic failure path.
///
/// Errors matching the predicate (default: `ConsumeError::is_transient`) go
/// through `retry_event` and the wrapper returns `Ok` while the event was
/// republished. Past the ceiling it returns `ConsumeError::RetriesExhausted`,
/// so the worker records the event (with its final `failed_tries`) in the
/// queue's error log. Any other error is returned unchanged.
pub struct RetryOnFailure<C> {
    inner: C,
    queue: QueueName,
    client: Arc<dyn QueueClient>,
    is_retryable: fn(&ConsumeError) -> bool,
    max_retries: u32,
    on_failure: FailureHook,
}

impl<C: QueueConsumer> RetryOnFailure<C> {
    pub fn new(
        inner: C,
        client: Arc<dyn QueueClient>,
    ) -> std::result::Result<Self, DeclarationError> {
        let queue = QueueName::parse(inner.queue_name())?;
        Ok(Self {
            inner,
            queue,
            client,
            is_retryable: ConsumeError::is_transient,
            max_retries: MAX_REQUEST_RETRIES,
            on_failure: Arc::new(log_terminal_failure),
        })
    }

    pub fn with_retry_predicate(mut self, is_retryable: fn(&ConsumeError) -> bool) -> Self {
        self.is_retryable = is_retryable;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn on_failure(mut self, hook: FailureHook) -> Self {
        self.on_failure = hook;
        self
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: QueueConsumer> QueueConsumer for RetryOnFailure<C> {
    fn queue_name(&self) -> &str {
        self.queue.as_str()
    }

    async fn consume(&self, event: &mut Event) -> std::result::Result<(), ConsumeError> {
        match self.inner.consume(event).await {
            Ok(()) => Ok(()),
            Err(e) if (self.is_retryable)(&e) => {
                warn!(queue = %self.queue, error = %e, "Retryable failure");
                let hook = Arc::clone(&self.on_failure);
                let queue = &self.queue;
                let decision = retry_event(
                    self.client.as_ref(),
                    queue,
                    event,
                    self.max_retries,
                    move |failed| hook(queue, failed),
                )
                .await
                .map_err(|e| ConsumeError::Republish(e.to_string()))?;
                match decision {
                    RetryDecision::Republished(_) => Ok(()),
                    RetryDecision::GaveUp(tries) => Err(ConsumeError::retries_exhausted(tries, e)),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn log_problem(&self, queue: &QueueName, event: &Event, error: &ConsumeError) {
        self.inner.log_problem(queue, event, error);
    }
}
