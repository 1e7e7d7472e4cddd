//! Workers running on the SQLite transport with the file error log.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use courier_core::application::workers::{MirrorWorker, MissedMessageWorker, SignupWorker};
use courier_core::application::{
    shutdown_channel, LoopQueueProcessingWorker, QueueConsumer, QueueProcessingWorker,
    RunnableWorker, ShutdownSender,
};
use courier_core::domain::{ConsumeError, Event, QueueName};
use courier_core::error::Result as AppResult;
use courier_core::port::downstream::mocks::{MockMailingList, RecordingNotifier};
use courier_core::port::sleeper::mocks::RecordingSleeper;
use courier_core::port::time_provider::SystemTimeProvider;
use courier_core::port::{EmailMirror, ErrorLog, MirroredEmail, QueueClient, SubscribeOutcome};
use courier_infra_sqlite::{create_pool, run_migrations, SqliteQueueClient};
use courier_infra_system::FileErrorLog;

async fn sqlite_client() -> Arc<SqliteQueueClient> {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(
        SqliteQueueClient::new(pool, Arc::new(SystemTimeProvider))
            .with_idle_poll(Duration::from_millis(5)),
    )
}

/// Error log that stops the run once it has recorded `stop_after` events
struct StopOnError {
    inner: FileErrorLog,
    recorded: Mutex<usize>,
    stop_after: usize,
    shutdown: ShutdownSender,
}

#[async_trait]
impl ErrorLog for StopOnError {
    async fn append(&self, queue: &QueueName, event: &Event) -> AppResult<()> {
        self.inner.append(queue, event).await?;
        let mut recorded = self.recorded.lock();
        *recorded += 1;
        if *recorded >= self.stop_after {
            self.shutdown.shutdown();
        }
        Ok(())
    }
}

/// Consumes `user_activity` events, failing odd `n`, and stops after `stop_after`
struct OddFails {
    seen: Mutex<Vec<i64>>,
    stop_after: usize,
    shutdown: ShutdownSender,
}

#[async_trait]
impl QueueConsumer for OddFails {
    fn queue_name(&self) -> &str {
        "user_activity"
    }

    async fn consume(&self, event: &mut Event) -> Result<(), ConsumeError> {
        let n = event.require_i64("n")?;
        {
            let mut seen = self.seen.lock();
            seen.push(n);
            if seen.len() >= self.stop_after {
                self.shutdown.shutdown();
            }
        }
        if n % 2 == 1 {
            return Err(ConsumeError::Downstream(format!("odd event {}", n)));
        }
        Ok(())
    }

    fn log_problem(&self, _queue: &QueueName, _event: &Event, _error: &ConsumeError) {}
}

/// Records mirrored messages and stops the run after `stop_after`
struct StoppingMirror {
    messages: Mutex<Vec<String>>,
    stop_after: usize,
    shutdown: ShutdownSender,
}

#[async_trait]
impl EmailMirror for StoppingMirror {
    async fn mirror(&self, email: &MirroredEmail) -> Result<(), ConsumeError> {
        let mut messages = self.messages.lock();
        messages.push(email.message.clone());
        if messages.len() >= self.stop_after {
            self.shutdown.shutdown();
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_consumer_worker_on_sqlite() {
    let client = sqlite_client().await;
    let queue = QueueName::parse("user_activity").unwrap();
    for n in 0..4 {
        client.publish(&queue, &Event::new().with("n", n)).await.unwrap();
    }

    let dir = TempDir::new().unwrap();
    let error_log = Arc::new(FileErrorLog::new(dir.path(), Arc::new(SystemTimeProvider)));
    let (tx, token) = shutdown_channel();
    let consumer = Arc::new(OddFails {
        seen: Mutex::new(Vec::new()),
        stop_after: 4,
        shutdown: tx,
    });

    let mut worker =
        QueueProcessingWorker::new(consumer.clone(), client.clone(), error_log.clone()).unwrap();
    worker.setup().await.unwrap();
    worker.start(token).await.unwrap();

    assert_eq!(*consumer.seen.lock(), vec![0, 1, 2, 3]);
    assert_eq!(client.pending(&queue).await.unwrap(), 0);
    assert_eq!(
        error_log.read_events(&queue).await.unwrap(),
        vec![Event::new().with("n", 1), Event::new().with("n", 3)]
    );
}

#[tokio::test]
async fn test_rejected_signup_retried_then_recorded() {
    let client = sqlite_client().await;
    let queue = QueueName::parse("signups").unwrap();
    client
        .publish(&queue, &Event::new().with("user_id", 7).with("email_address", "foo@bar.baz"))
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let (tx, token) = shutdown_channel();
    let error_log = Arc::new(StopOnError {
        inner: FileErrorLog::new(dir.path(), Arc::new(SystemTimeProvider)),
        recorded: Mutex::new(0),
        stop_after: 1,
        shutdown: tx,
    });
    let mailing_list = Arc::new(MockMailingList::new(SubscribeOutcome::Rejected(
        "Invalid Resource".to_string(),
    )));

    let consumer = SignupWorker::new(client.clone(), mailing_list.clone()).unwrap();
    let mut worker =
        QueueProcessingWorker::new(Arc::new(consumer), client.clone(), error_log.clone()).unwrap();
    worker.setup().await.unwrap();
    worker.start(token).await.unwrap();

    // Four attempts: the original delivery plus three republishes.
    assert_eq!(mailing_list.requests(), vec![7, 7, 7, 7]);
    assert_eq!(client.pending(&queue).await.unwrap(), 0);

    // The recorded event carries the final counter, one past the ceiling.
    let failed = error_log.inner.read_events(&queue).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].failed_tries(), 4);
    assert_eq!(failed[0].require_i64("user_id").unwrap(), 7);
}

#[tokio::test]
async fn test_loop_worker_drains_sqlite_queue() {
    let client = sqlite_client().await;
    let queue = QueueName::parse("missedmessage_emails").unwrap();
    for (user, message) in [(11, 3), (10, 1), (10, 2)] {
        client
            .publish(
                &queue,
                &Event::new()
                    .with("user_profile_id", user)
                    .with("message_id", message),
            )
            .await
            .unwrap();
    }

    let (tx, token) = shutdown_channel();
    let sleeper = Arc::new(RecordingSleeper::new(2, tx));
    let notifier = Arc::new(RecordingNotifier::new());
    let dir = TempDir::new().unwrap();
    let mut worker = LoopQueueProcessingWorker::new(
        Arc::new(MissedMessageWorker::new(notifier.clone())),
        client.clone(),
        Arc::new(FileErrorLog::new(dir.path(), Arc::new(SystemTimeProvider))),
        sleeper.clone(),
    )
    .unwrap();
    worker.setup().await.unwrap();
    worker.start(token).await.unwrap();

    assert_eq!(
        notifier.calls(),
        vec![(10, vec![1, 2], 2), (11, vec![3], 1)]
    );
    assert_eq!(sleeper.durations().len(), 2);
    assert_eq!(client.pending(&queue).await.unwrap(), 0);
    assert!(client.drain_queue(&queue).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mirror_worker_keeps_non_ascii_payloads() {
    let client = sqlite_client().await;
    let queue = QueueName::parse("email_mirror").unwrap();
    for message in ["\u{f3}test", "\u{f3}test", "test"] {
        client
            .publish(
                &queue,
                &Event::new()
                    .with("message", message)
                    .with("time", 1_700_000_000.0)
                    .with("rcpt_to", "hamlet@zulip.com"),
            )
            .await
            .unwrap();
    }

    let (tx, token) = shutdown_channel();
    let mirror = Arc::new(StoppingMirror {
        messages: Mutex::new(Vec::new()),
        stop_after: 3,
        shutdown: tx,
    });
    let dir = TempDir::new().unwrap();
    let error_log = Arc::new(FileErrorLog::new(dir.path(), Arc::new(SystemTimeProvider)));
    let mut worker = QueueProcessingWorker::new(
        Arc::new(MirrorWorker::new(mirror.clone())),
        client.clone(),
        error_log.clone(),
    )
    .unwrap();
    worker.setup().await.unwrap();
    worker.start(token).await.unwrap();

    assert_eq!(*mirror.messages.lock(), vec!["\u{f3}test", "\u{f3}test", "test"]);
    assert_eq!(client.pending(&queue).await.unwrap(), 0);
    assert!(error_log.read_events(&queue).await.unwrap().is_empty());
}
