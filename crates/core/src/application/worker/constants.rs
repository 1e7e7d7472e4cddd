// Worker constants (no magic values)
use std::time::Duration;

/// Republishes allowed for a failing event (4 delivery attempts in total)
pub const MAX_REQUEST_RETRIES: u32 = 3;

/// Window over which missed-message notifications are collected (2 minutes)
pub const MISSED_MESSAGE_SLEEP_DELAY: Duration = Duration::from_secs(2 * 60);

/// Poll interval of polling transports when a queue is empty (100ms)
pub const IDLE_POLL_DURATION: Duration = Duration::from_millis(100);

/// Delay before an invitee who has not signed up gets a reminder (2 days)
pub const INVITATION_REMINDER_DELAY: Duration = Duration::from_secs(2 * 24 * 60 * 60);
