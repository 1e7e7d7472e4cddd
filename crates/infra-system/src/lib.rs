// Courier Infrastructure - System Adapters
// Implements: ErrorLog (files), downstream ports (console), TestSink (JSON lines)

pub mod console;
pub mod file_error_log;
pub mod test_sink;

pub use console::{
    ConsoleActivityRecorder, ConsoleEmailMirror, ConsoleEmailSender, ConsoleInvitationMailer,
    ConsoleMailingList, ConsoleNotifier,
};
pub use file_error_log::FileErrorLog;
pub use test_sink::JsonLinesTestSink;
