// User activity worker (`user_activity`)

use crate::application::worker::QueueConsumer;
use crate::domain::{ConsumeError, Event};
use crate::port::{ActivityRecorder, UserActivity};
use async_trait::async_trait;
use std::sync::Arc;

pub const QUEUE: &str = "user_activity";

pub struct UserActivityWorker {
    recorder: Arc<dyn ActivityRecorder>,
}

impl UserActivityWorker {
    pub fn new(recorder: Arc<dyn ActivityRecorder>) -> Self {
        Self { recorder }
    }
}

fn parse_activity(event: &Event) -> Result<UserActivity, ConsumeError> {
    Ok(UserActivity {
        user_profile_id: event.require_i64("user_profile_id")?,
        client: event.require_str("client")?.to_string(),
        query: event.require_str("query")?.to_string(),
        time: event.require_f64("time")?,
    })
}

#[async_trait]
impl QueueConsumer for UserActivityWorker {
    fn queue_name(&self) -> &str {
        QUEUE
    }

    async fn consume(&self, event: &mut Event) -> Result<(), ConsumeError> {
        let activity = parse_activity(event)?;
        self.recorder.record(&activity).await
    }
}
