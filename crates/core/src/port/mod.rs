// Port Layer - Interfaces for external collaborators

pub mod downstream;
pub mod error_log;
pub mod queue_client;
pub mod sleeper; // Substitutable in tests
pub mod time_provider;

// Re-exports
pub use downstream::{
    ActivityRecorder, EmailMirror, EmailRequest, EmailSender, InvitationMailer,
    InvitationOutcome, InvitationRequest, Invitee, MailingList, MirroredEmail,
    MissedMessageNotifier, SubscribeOutcome, TestSink, UserActivity,
};
pub use error_log::ErrorLog;
pub use queue_client::{EventCallback, InMemoryQueueClient, QueueClient};
pub use sleeper::{Sleeper, TokioSleeper};
pub use time_provider::TimeProvider;
