// Downstream Ports
// Domain actions the built-in workers trigger. The core calls each at most
// once per logical unit of work per attempt.

use crate::domain::{ConsumeError, Event};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sends one digest per recipient for messages they missed
#[async_trait]
pub trait MissedMessageNotifier: Send + Sync {
    async fn notify(
        &self,
        user_profile_id: i64,
        message_ids: &[i64],
        count: usize,
    ) -> Result<(), ConsumeError>;
}

/// Email payload carried by the `email_senders` queues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub template_prefix: String,
    pub to_emails: Vec<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl EmailRequest {
    pub fn from_event(event: &Event) -> Result<Self, ConsumeError> {
        let mut value = event.clone().into_value();
        if let Some(map) = value.as_object_mut() {
            for field in Event::RESERVED_FIELDS {
                map.remove(field);
            }
        }
        serde_json::from_value(value)
            .map_err(|e| ConsumeError::MalformedEvent(format!("invalid email request: {}", e)))
    }
}

/// Outbound mail transport. A dropped connection must be reported as
/// `ConsumeError::Disconnected` so the event is redelivered.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, email: &EmailRequest) -> Result<(), ConsumeError>;
}

/// Result of a mailing-list subscription request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadyMember,
    /// The list service refused the request; worth trying again
    Rejected(String),
}

/// Newsletter / mailing-list service
#[async_trait]
pub trait MailingList: Send + Sync {
    async fn subscribe(&self, user_id: i64, fields: &Event)
        -> Result<SubscribeOutcome, ConsumeError>;
}

/// One client request seen for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_profile_id: i64,
    pub client: String,
    pub query: String,
    /// Seconds since epoch
    pub time: f64,
}

#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    async fn record(&self, activity: &UserActivity) -> Result<(), ConsumeError>;
}

/// Destination of the deployment smoke-test worker
#[async_trait]
pub trait TestSink: Send + Sync {
    async fn write(&self, event: &Event) -> Result<(), ConsumeError>;
}

/// How an invitation event names its invitee
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Invitee {
    PreregId(i64),
    /// Older producers sent the address instead of the registration id
    Email(String),
}

impl fmt::Display for Invitee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invitee::PreregId(id) => write!(f, "prereg {}", id),
            Invitee::Email(email) => write!(f, "{}", email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationRequest {
    pub invitee: Invitee,
    pub referrer_id: i64,
    /// Custom text from the inviter, if any
    pub email_body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationOutcome {
    Sent,
    /// The invitation no longer exists (revoked or already used)
    Withdrawn,
}

/// Sends invitation confirmation links and their follow-up reminder
#[async_trait]
pub trait InvitationMailer: Send + Sync {
    async fn send_confirmation(
        &self,
        request: &InvitationRequest,
    ) -> Result<InvitationOutcome, ConsumeError>;

    async fn schedule_reminder(
        &self,
        request: &InvitationRequest,
        delay: Duration,
    ) -> Result<(), ConsumeError>;
}

/// An inbound email handed over by the mail server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirroredEmail {
    /// Raw message text
    pub message: String,
    pub rcpt_to: String,
}

/// Delivers inbound email into the recipient's stream
#[async_trait]
pub trait EmailMirror: Send + Sync {
    async fn mirror(&self, email: &MirroredEmail) -> Result<(), ConsumeError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// Records notifier calls; recipients listed in `failing` get an error
    #[derive(Default)]
    pub struct RecordingNotifier {
        calls: Mutex<Vec<(i64, Vec<i64>, usize)>>,
        failing: HashSet<i64>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_for(recipients: impl IntoIterator<Item = i64>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing: recipients.into_iter().collect(),
            }
        }

        pub fn calls(&self) -> Vec<(i64, Vec<i64>, usize)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl MissedMessageNotifier for RecordingNotifier {
        async fn notify(
            &self,
            user_profile_id: i64,
            message_ids: &[i64],
            count: usize,
        ) -> Result<(), ConsumeError> {
            self.calls
                .lock()
                .push((user_profile_id, message_ids.to_vec(), count));
            if self.failing.contains(&user_profile_id) {
                return Err(ConsumeError::Downstream(format!(
                    "notification for {} failed",
                    user_profile_id
                )));
            }
            Ok(())
        }
    }

    /// Mock email sender behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always drop the connection (transient)
        Disconnect,
        /// Always fail with a non-transient error
        Fail(String),
    }

    pub struct MockEmailSender {
        behavior: MockBehavior,
        sent: Mutex<Vec<EmailRequest>>,
        attempts: Mutex<usize>,
    }

    impl MockEmailSender {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                sent: Mutex::new(Vec::new()),
                attempts: Mutex::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_disconnecting() -> Self {
            Self::new(MockBehavior::Disconnect)
        }

        pub fn sent(&self) -> Vec<EmailRequest> {
            self.sent.lock().clone()
        }

        pub fn attempts(&self) -> usize {
            *self.attempts.lock()
        }
    }

    #[async_trait]
    impl EmailSender for MockEmailSender {
        async fn send_email(&self, email: &EmailRequest) -> Result<(), ConsumeError> {
            *self.attempts.lock() += 1;
            match &self.behavior {
                MockBehavior::Success => {
                    self.sent.lock().push(email.clone());
                    Ok(())
                }
                MockBehavior::Disconnect => {
                    Err(ConsumeError::disconnected("smtp", "server disconnected"))
                }
                MockBehavior::Fail(msg) => Err(ConsumeError::Downstream(msg.clone())),
            }
        }
    }

    /// Mailing list returning a fixed outcome
    pub struct MockMailingList {
        outcome: SubscribeOutcome,
        requests: Mutex<Vec<i64>>,
    }

    impl MockMailingList {
        pub fn new(outcome: SubscribeOutcome) -> Self {
            Self {
                outcome,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<i64> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl MailingList for MockMailingList {
        async fn subscribe(
            &self,
            user_id: i64,
            _fields: &Event,
        ) -> Result<SubscribeOutcome, ConsumeError> {
            self.requests.lock().push(user_id);
            Ok(self.outcome.clone())
        }
    }

    #[derive(Default)]
    pub struct RecordingActivityRecorder {
        records: Mutex<Vec<UserActivity>>,
    }

    impl RecordingActivityRecorder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn records(&self) -> Vec<UserActivity> {
            self.records.lock().clone()
        }
    }

    #[async_trait]
    impl ActivityRecorder for RecordingActivityRecorder {
        async fn record(&self, activity: &UserActivity) -> Result<(), ConsumeError> {
            self.records.lock().push(activity.clone());
            Ok(())
        }
    }

    /// Knows a fixed set of open invitations; everything else is withdrawn
    #[derive(Default)]
    pub struct MockInvitationMailer {
        open: HashSet<Invitee>,
        confirmations: Mutex<Vec<InvitationRequest>>,
        reminders: Mutex<Vec<(InvitationRequest, Duration)>>,
    }

    impl MockInvitationMailer {
        pub fn with_open(invitees: impl IntoIterator<Item = Invitee>) -> Self {
            Self {
                open: invitees.into_iter().collect(),
                ..Self::default()
            }
        }

        pub fn confirmations(&self) -> Vec<InvitationRequest> {
            self.confirmations.lock().clone()
        }

        pub fn reminders(&self) -> Vec<(InvitationRequest, Duration)> {
            self.reminders.lock().clone()
        }
    }

    #[async_trait]
    impl InvitationMailer for MockInvitationMailer {
        async fn send_confirmation(
            &self,
            request: &InvitationRequest,
        ) -> Result<InvitationOutcome, ConsumeError> {
            if !self.open.contains(&request.invitee) {
                return Ok(InvitationOutcome::Withdrawn);
            }
            self.confirmations.lock().push(request.clone());
            Ok(InvitationOutcome::Sent)
        }

        async fn schedule_reminder(
            &self,
            request: &InvitationRequest,
            delay: Duration,
        ) -> Result<(), ConsumeError> {
            self.reminders.lock().push((request.clone(), delay));
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingEmailMirror {
        mirrored: Mutex<Vec<MirroredEmail>>,
    }

    impl RecordingEmailMirror {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn mirrored(&self) -> Vec<MirroredEmail> {
            self.mirrored.lock().clone()
        }
    }

    #[async_trait]
    impl EmailMirror for RecordingEmailMirror {
        async fn mirror(&self, email: &MirroredEmail) -> Result<(), ConsumeError> {
            self.mirrored.lock().push(email.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingTestSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingTestSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl TestSink for RecordingTestSink {
        async fn write(&self, event: &Event) -> Result<(), ConsumeError> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_request_ignores_reserved_fields() {
        let event = Event::from_json(
            r#"{"template_prefix": "zerver/emails/missed_message",
                "to_emails": ["hamlet@example.com"],
                "id": "test_missed",
                "failed_tries": 2}"#,
        )
        .unwrap();

        let email = EmailRequest::from_event(&event).unwrap();
        assert_eq!(email.template_prefix, "zerver/emails/missed_message");
        assert_eq!(email.to_emails, vec!["hamlet@example.com".to_string()]);
        assert!(email.context.is_empty());
    }

    #[test]
    fn test_email_request_requires_recipients() {
        let event = Event::new().with("template_prefix", "x");
        assert!(matches!(
            EmailRequest::from_event(&event),
            Err(ConsumeError::MalformedEvent(_))
        ));
    }
}
