// Console adapters for the downstream ports
// Each call is logged instead of reaching an external service. Used for
// local runs and deployments without mail or mailing-list credentials.

use async_trait::async_trait;
use courier_core::domain::{ConsumeError, Event};
use courier_core::port::{
    ActivityRecorder, EmailMirror, EmailRequest, EmailSender, InvitationMailer,
    InvitationOutcome, InvitationRequest, MailingList, MirroredEmail, MissedMessageNotifier,
    SubscribeOutcome, UserActivity,
};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl MissedMessageNotifier for ConsoleNotifier {
    async fn notify(
        &self,
        user_profile_id: i64,
        message_ids: &[i64],
        count: usize,
    ) -> Result<(), ConsumeError> {
        info!(
            user_profile_id,
            count,
            message_ids = ?message_ids,
            "Missed message notification"
        );
        Ok(())
    }
}

/// Prints emails to the log, like a console email backend
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEmailSender;

#[async_trait]
impl EmailSender for ConsoleEmailSender {
    async fn send_email(&self, email: &EmailRequest) -> Result<(), ConsumeError> {
        info!(
            template = %email.template_prefix,
            to = ?email.to_emails,
            from_name = email.from_name.as_deref().unwrap_or("-"),
            from_address = email.from_address.as_deref().unwrap_or("-"),
            context = %serde_json::Value::Object(email.context.clone()),
            "Email"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMailingList;

#[async_trait]
impl MailingList for ConsoleMailingList {
    async fn subscribe(
        &self,
        user_id: i64,
        fields: &Event,
    ) -> Result<SubscribeOutcome, ConsumeError> {
        info!(user_id, fields = %fields.to_json(), "Mailing list subscription");
        Ok(SubscribeOutcome::Subscribed)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleActivityRecorder;

#[async_trait]
impl ActivityRecorder for ConsoleActivityRecorder {
    async fn record(&self, activity: &UserActivity) -> Result<(), ConsumeError> {
        info!(
            user_profile_id = activity.user_profile_id,
            client = %activity.client,
            query = %activity.query,
            time = activity.time,
            "User activity"
        );
        Ok(())
    }
}

/// Has no record of withdrawn invitations, so every invitation is sent
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleInvitationMailer;

#[async_trait]
impl InvitationMailer for ConsoleInvitationMailer {
    async fn send_confirmation(
        &self,
        request: &InvitationRequest,
    ) -> Result<InvitationOutcome, ConsumeError> {
        info!(
            invitee = %request.invitee,
            referrer_id = request.referrer_id,
            custom_body = request.email_body.is_some(),
            "Invitation confirmation"
        );
        Ok(InvitationOutcome::Sent)
    }

    async fn schedule_reminder(
        &self,
        request: &InvitationRequest,
        delay: Duration,
    ) -> Result<(), ConsumeError> {
        info!(
            invitee = %request.invitee,
            delay_secs = delay.as_secs(),
            "Invitation reminder scheduled"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEmailMirror;

#[async_trait]
impl EmailMirror for ConsoleEmailMirror {
    async fn mirror(&self, email: &MirroredEmail) -> Result<(), ConsumeError> {
        info!(rcpt_to = %email.rcpt_to, message = %email.message, "Mirrored email");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::port::Invitee;

    #[tokio::test]
    async fn test_console_adapters_accept_everything() {
        ConsoleNotifier.notify(10, &[1, 2], 2).await.unwrap();

        let email = EmailRequest {
            template_prefix: "zerver/emails/followup_day1".to_string(),
            to_emails: vec!["hamlet@zulip.com".to_string()],
            from_name: None,
            from_address: None,
            context: serde_json::Map::new(),
        };
        ConsoleEmailSender.send_email(&email).await.unwrap();

        assert_eq!(
            ConsoleMailingList
                .subscribe(7, &Event::new().with("email_address", "foo@bar.baz"))
                .await
                .unwrap(),
            SubscribeOutcome::Subscribed
        );

        let activity = UserActivity {
            user_profile_id: 3,
            client: "website".to_string(),
            query: "get_events".to_string(),
            time: 1_700_000_000.0,
        };
        ConsoleActivityRecorder.record(&activity).await.unwrap();

        let invitation = InvitationRequest {
            invitee: Invitee::PreregId(1),
            referrer_id: 5,
            email_body: None,
        };
        assert_eq!(
            ConsoleInvitationMailer
                .send_confirmation(&invitation)
                .await
                .unwrap(),
            InvitationOutcome::Sent
        );
        ConsoleInvitationMailer
            .schedule_reminder(&invitation, Duration::from_secs(60))
            .await
            .unwrap();

        let email = MirroredEmail {
            message: "\u{f3}test".to_string(),
            rcpt_to: "hamlet@zulip.com".to_string(),
        };
        ConsoleEmailMirror.mirror(&email).await.unwrap();
    }
}
