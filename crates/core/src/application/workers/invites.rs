// Invitation confirmation worker (`invites`)

use crate::application::worker::constants::INVITATION_REMINDER_DELAY;
use crate::application::worker::QueueConsumer;
use crate::domain::{ConsumeError, Event};
use crate::port::{InvitationMailer, InvitationOutcome, InvitationRequest, Invitee};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const QUEUE: &str = "invites";

/// Sends the confirmation link for a new invitation, then schedules the
/// reminder. Invitations withdrawn before the event is consumed are skipped.
pub struct ConfirmationEmailWorker {
    mailer: Arc<dyn InvitationMailer>,
}

impl ConfirmationEmailWorker {
    pub fn new(mailer: Arc<dyn InvitationMailer>) -> Self {
        Self { mailer }
    }
}

fn parse_invitation(event: &Event) -> Result<InvitationRequest, ConsumeError> {
    let invitee = match event.get("email").and_then(|v| v.as_str()) {
        Some(email) => Invitee::Email(email.to_string()),
        None => Invitee::PreregId(event.require_i64("prereg_id")?),
    };
    Ok(InvitationRequest {
        invitee,
        referrer_id: event.require_i64("referrer_id")?,
        email_body: event
            .get("email_body")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    })
}

#[async_trait]
impl QueueConsumer for ConfirmationEmailWorker {
    fn queue_name(&self) -> &str {
        QUEUE
    }

    async fn consume(&self, event: &mut Event) -> Result<(), ConsumeError> {
        let request = parse_invitation(event)?;

        match self.mailer.send_confirmation(&request).await? {
            InvitationOutcome::Withdrawn => {
                info!(invitee = %request.invitee, "Skipping sending email to withdrawn invitation");
                Ok(())
            }
            InvitationOutcome::Sent => {
                info!(
                    invitee = %request.invitee,
                    referrer_id = request.referrer_id,
                    "Sent invitation"
                );
                self.mailer
                    .schedule_reminder(&request, INVITATION_REMINDER_DELAY)
                    .await
            }
        }
    }
}
