// Built-in workers

pub mod email_sender;
pub mod invites;
pub mod mirror;
pub mod missed_message;
pub mod signup;
pub mod test_worker;
pub mod user_activity;

pub use email_sender::EmailSendingWorker;
pub use invites::ConfirmationEmailWorker;
pub use mirror::MirrorWorker;
pub use missed_message::MissedMessageWorker;
pub use signup::SignupWorker;
pub use test_worker::TestWorker;
pub use user_activity::UserActivityWorker;

use crate::application::registry::WorkerRegistry;
use crate::application::retry::RetryOnFailure;
use crate::application::worker::{
    LoopQueueProcessingWorker, QueueConsumer, QueueProcessingWorker, RunnableWorker,
};
use crate::domain::{DeclarationError, WorkerKind};
use crate::error::Result;
use crate::port::{
    ActivityRecorder, EmailMirror, EmailSender, ErrorLog, InvitationMailer, MailingList,
    MissedMessageNotifier, QueueClient, Sleeper, TestSink,
};
use std::sync::Arc;

/// Shared ports every worker factory draws from
#[derive(Clone)]
pub struct WorkerContext {
    pub client: Arc<dyn QueueClient>,
    pub error_log: Arc<dyn ErrorLog>,
    pub sleeper: Arc<dyn Sleeper>,
    pub notifier: Arc<dyn MissedMessageNotifier>,
    pub email_sender: Arc<dyn EmailSender>,
    pub mailing_list: Arc<dyn MailingList>,
    pub activity_recorder: Arc<dyn ActivityRecorder>,
    pub invitation_mailer: Arc<dyn InvitationMailer>,
    pub email_mirror: Arc<dyn EmailMirror>,
    pub test_sink: Arc<dyn TestSink>,
}

fn consumer_worker(
    consumer: impl QueueConsumer + 'static,
    context: &WorkerContext,
) -> Result<Box<dyn RunnableWorker>> {
    let worker = QueueProcessingWorker::new(
        Arc::new(consumer),
        Arc::clone(&context.client),
        Arc::clone(&context.error_log),
    )?;
    Ok(Box::new(worker))
}

fn email_worker(queue: &'static str, context: &WorkerContext) -> Result<Box<dyn RunnableWorker>> {
    let sender = EmailSendingWorker::new(queue, Arc::clone(&context.email_sender));
    consumer_worker(
        RetryOnFailure::new(sender, Arc::clone(&context.client))?,
        context,
    )
}

/// Declare every built-in worker on `registry`
pub fn register_builtin_workers(
    registry: &mut WorkerRegistry,
) -> std::result::Result<(), DeclarationError> {
    registry.register(
        email_sender::EMAIL_SENDERS_QUEUE,
        WorkerKind::Consumer,
        |ctx| email_worker(email_sender::EMAIL_SENDERS_QUEUE, ctx),
    )?;

    registry.register(
        email_sender::MISSED_MESSAGE_EMAIL_SENDERS_QUEUE,
        WorkerKind::Consumer,
        |ctx| email_worker(email_sender::MISSED_MESSAGE_EMAIL_SENDERS_QUEUE, ctx),
    )?;

    registry.register(signup::QUEUE, WorkerKind::Consumer, |ctx| {
        let worker = SignupWorker::new(Arc::clone(&ctx.client), Arc::clone(&ctx.mailing_list))?;
        consumer_worker(worker, ctx)
    })?;

    registry.register(user_activity::QUEUE, WorkerKind::Consumer, |ctx| {
        consumer_worker(
            UserActivityWorker::new(Arc::clone(&ctx.activity_recorder)),
            ctx,
        )
    })?;

    registry.register(invites::QUEUE, WorkerKind::Consumer, |ctx| {
        consumer_worker(
            ConfirmationEmailWorker::new(Arc::clone(&ctx.invitation_mailer)),
            ctx,
        )
    })?;

    registry.register(mirror::QUEUE, WorkerKind::Consumer, |ctx| {
        consumer_worker(MirrorWorker::new(Arc::clone(&ctx.email_mirror)), ctx)
    })?;

    registry.register(missed_message::QUEUE, WorkerKind::Loop, |ctx| {
        let worker = LoopQueueProcessingWorker::new(
            Arc::new(MissedMessageWorker::new(Arc::clone(&ctx.notifier))),
            Arc::clone(&ctx.client),
            Arc::clone(&ctx.error_log),
            Arc::clone(&ctx.sleeper),
        )?;
        Ok(Box::new(worker) as Box<dyn RunnableWorker>)
    })?;

    registry.register(test_worker::QUEUE, WorkerKind::Test, |ctx| {
        consumer_worker(TestWorker::new(Arc::clone(&ctx.test_sink)), ctx)
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::{shutdown_channel, ShutdownSender, WorkerState};
    use crate::domain::{Event, QueueName};
    use crate::port::downstream::mocks::{
        MockEmailSender, MockInvitationMailer, MockMailingList, RecordingActivityRecorder,
        RecordingEmailMirror, RecordingNotifier, RecordingTestSink,
    };
    use crate::port::error_log::mocks::InMemoryErrorLog;
    use crate::port::sleeper::mocks::RecordingSleeper;
    use crate::port::{InMemoryQueueClient, Invitee, SubscribeOutcome};
    use std::time::Duration;

    struct Fixture {
        client: Arc<InMemoryQueueClient>,
        error_log: Arc<InMemoryErrorLog>,
        sleeper: Arc<RecordingSleeper>,
        notifier: Arc<RecordingNotifier>,
        email_sender: Arc<MockEmailSender>,
        invitation_mailer: Arc<MockInvitationMailer>,
        test_sink: Arc<RecordingTestSink>,
        context: WorkerContext,
    }

    fn fixture(email_sender: MockEmailSender, stop: ShutdownSender) -> Fixture {
        let client = Arc::new(InMemoryQueueClient::new());
        let error_log = Arc::new(InMemoryErrorLog::new());
        let sleeper = Arc::new(RecordingSleeper::new(1, stop));
        let notifier = Arc::new(RecordingNotifier::new());
        let email_sender = Arc::new(email_sender);
        let invitation_mailer = Arc::new(MockInvitationMailer::with_open([
            Invitee::PreregId(1),
            Invitee::Email("bob@zulip.com".to_string()),
        ]));
        let test_sink = Arc::new(RecordingTestSink::new());

        let context = WorkerContext {
            client: client.clone(),
            error_log: error_log.clone(),
            sleeper: sleeper.clone(),
            notifier: notifier.clone(),
            email_sender: email_sender.clone(),
            mailing_list: Arc::new(MockMailingList::new(SubscribeOutcome::Subscribed)),
            activity_recorder: Arc::new(RecordingActivityRecorder::new()),
            invitation_mailer: invitation_mailer.clone(),
            email_mirror: Arc::new(RecordingEmailMirror::new()),
            test_sink: test_sink.clone(),
        };

        Fixture {
            client,
            error_log,
            sleeper,
            notifier,
            email_sender,
            invitation_mailer,
            test_sink,
            context,
        }
    }

    fn registry() -> WorkerRegistry {
        let mut registry = WorkerRegistry::new();
        register_builtin_workers(&mut registry).unwrap();
        registry
    }

    #[test]
    fn test_builtin_queue_names() {
        let names: Vec<String> = registry()
            .active_queues(Some(WorkerKind::Consumer))
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            names,
            vec![
                "email_mirror",
                "email_senders",
                "invites",
                "missedmessage_email_senders",
                "signups",
                "user_activity"
            ]
        );
    }

    #[tokio::test]
    async fn test_every_builtin_worker_builds() {
        let (tx, _token) = shutdown_channel();
        let f = fixture(MockEmailSender::new_success(), tx);
        let registry = registry();

        for queue in registry.active_queues(None) {
            let worker = registry.build(queue.as_str(), &f.context).unwrap();
            assert_eq!(worker.queue_name(), &queue);
            assert_eq!(worker.state(), WorkerState::Uninitialized);
        }
        assert!(registry.build("no_such_queue", &f.context).is_err());
    }

    #[tokio::test]
    async fn test_missed_message_worker_aggregates_per_recipient() {
        let (tx, token) = shutdown_channel();
        let f = fixture(MockEmailSender::new_success(), tx);
        let queue = QueueName::parse(missed_message::QUEUE).unwrap();
        for (user, message) in [(10, 1), (10, 2), (11, 3)] {
            f.client.enqueue(
                &queue,
                Event::new()
                    .with("user_profile_id", user)
                    .with("message_id", message),
            );
        }

        let mut worker = registry().build(missed_message::QUEUE, &f.context).unwrap();
        worker.setup().await.unwrap();
        worker.start(token).await.unwrap();

        assert_eq!(
            f.notifier.calls(),
            vec![(10, vec![1, 2], 2), (11, vec![3], 1)]
        );
        assert_eq!(f.sleeper.durations(), vec![Duration::from_secs(120)]);
    }

    #[tokio::test]
    async fn test_email_worker_gives_up_after_retries() {
        let (tx, token) = shutdown_channel();
        let f = fixture(MockEmailSender::new_disconnecting(), tx);
        let queue = QueueName::parse(email_sender::MISSED_MESSAGE_EMAIL_SENDERS_QUEUE).unwrap();
        f.client.enqueue(
            &queue,
            Event::new()
                .with("template_prefix", "zerver/emails/missed_message")
                .with("to_emails", vec!["hamlet@zulip.com"]),
        );

        let mut worker = registry()
            .build(email_sender::MISSED_MESSAGE_EMAIL_SENDERS_QUEUE, &f.context)
            .unwrap();
        worker.setup().await.unwrap();
        worker.start(token).await.unwrap();

        assert_eq!(f.email_sender.attempts(), 4);
        assert_eq!(f.client.published().len(), 3);
        // Only the exhausted event is recorded, with its final counter.
        let failed = f.error_log.events_for(email_sender::MISSED_MESSAGE_EMAIL_SENDERS_QUEUE);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failed_tries(), 4);
        assert_eq!(failed[0].require_str("template_prefix").unwrap(), "zerver/emails/missed_message");
    }

    #[tokio::test]
    async fn test_invites_worker_skips_withdrawn_invitation() {
        let (tx, token) = shutdown_channel();
        let f = fixture(MockEmailSender::new_success(), tx);
        let queue = QueueName::parse(invites::QUEUE).unwrap();
        for event in [
            Event::new().with("prereg_id", 1).with("referrer_id", 9),
            Event::new().with("prereg_id", -1).with("referrer_id", 9),
            Event::new()
                .with("email", "bob@zulip.com")
                .with("referrer_id", 9),
        ] {
            f.client.enqueue(&queue, event);
        }

        let mut worker = registry().build(invites::QUEUE, &f.context).unwrap();
        worker.setup().await.unwrap();
        worker.start(token).await.unwrap();

        assert_eq!(f.invitation_mailer.confirmations().len(), 2);
        assert_eq!(f.invitation_mailer.reminders().len(), 2);
        assert!(f.error_log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_test_worker_writes_to_sink() {
        let (tx, token) = shutdown_channel();
        let f = fixture(MockEmailSender::new_success(), tx);
        let queue = QueueName::parse(test_worker::QUEUE).unwrap();
        f.client.enqueue(&queue, Event::new().with("n", 1));

        let mut worker = registry().build(test_worker::QUEUE, &f.context).unwrap();
        worker.setup().await.unwrap();
        worker.start(token).await.unwrap();

        assert_eq!(f.test_sink.events(), vec![Event::new().with("n", 1)]);
    }
}
