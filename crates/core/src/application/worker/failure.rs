// Generic failure path shared by every worker kind

use crate::domain::{Event, QueueName};
use crate::port::ErrorLog;
use tracing::error;

/// Append a failed event to the queue's error record.
///
/// Never fails: if the record itself cannot be written the event is logged
/// in full instead, and the caller keeps consuming.
pub async fn persist_failed_event(error_log: &dyn ErrorLog, queue: &QueueName, event: &Event) {
    if let Err(e) = error_log.append(queue, event).await {
        error!(
            queue = %queue,
            error = %e,
            event = %event.to_json(),
            "Failed to write event to queue error log"
        );
    }
}
