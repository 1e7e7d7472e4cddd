// Replaying a queue's recorded failures

use anyhow::Result;
use courier_core::domain::{QueueName, FAILED_TRIES_FIELD};
use courier_core::port::QueueClient;
use courier_infra_system::FileErrorLog;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, PartialEq)]
pub struct ReplayReport {
    pub republished: usize,
    /// Where the replayed error file was moved, if there was one
    pub archived: Option<PathBuf>,
}

/// Republish every event recorded for `queue`, then archive its error file.
///
/// `failed_tries` is removed first, so a replayed event gets the full retry
/// budget again.
pub async fn replay_errors(
    error_log: &FileErrorLog,
    client: &dyn QueueClient,
    queue: &QueueName,
) -> Result<ReplayReport> {
    let events = error_log.read_events(queue).await?;
    if events.is_empty() {
        return Ok(ReplayReport {
            republished: 0,
            archived: None,
        });
    }

    for mut event in events.iter().cloned() {
        event.remove(FAILED_TRIES_FIELD);
        client.publish(queue, &event).await?;
    }
    let archived = error_log.archive(queue).await?;

    info!(queue = %queue, events = events.len(), "Replayed failed events");
    Ok(ReplayReport {
        republished: events.len(),
        archived,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::domain::Event;
    use courier_core::port::time_provider::FixedTimeProvider;
    use courier_core::port::{ErrorLog, InMemoryQueueClient};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn error_log(dir: &TempDir) -> FileErrorLog {
        FileErrorLog::new(dir.path(), Arc::new(FixedTimeProvider(1_700_000_000_000)))
    }

    #[tokio::test]
    async fn test_replay_resets_counter_and_archives() {
        let dir = TempDir::new().unwrap();
        let log = error_log(&dir);
        let queue = QueueName::parse("email_senders").unwrap();

        let mut exhausted = Event::new().with("id", "a");
        exhausted.set_failed_tries(4);
        log.append(&queue, &exhausted).await.unwrap();
        log.append(&queue, &Event::new().with("id", "b")).await.unwrap();

        let client = InMemoryQueueClient::new();
        let report = replay_errors(&log, &client, &queue).await.unwrap();

        assert_eq!(report.republished, 2);
        assert_eq!(
            report.archived,
            Some(dir.path().join("email_senders.errors.1700000000000"))
        );
        let published: Vec<Event> = client.published().into_iter().map(|(_, e)| e).collect();
        assert_eq!(
            published,
            vec![Event::new().with("id", "a"), Event::new().with("id", "b")]
        );
        assert_eq!(published[0].failed_tries(), 0);
        assert!(log.read_events(&queue).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replay_without_failures_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let log = error_log(&dir);
        let queue = QueueName::parse("signups").unwrap();
        let client = InMemoryQueueClient::new();

        let report = replay_errors(&log, &client, &queue).await.unwrap();

        assert_eq!(
            report,
            ReplayReport {
                republished: 0,
                archived: None
            }
        );
        assert!(client.published().is_empty());
    }
}
