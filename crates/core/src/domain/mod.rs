// Domain Layer - Events, queue names and worker declarations

pub mod error;
pub mod event;
pub mod queue;

// Re-exports
pub use error::{ConsumeError, DeclarationError};
pub use event::{Event, FAILED_TRIES_FIELD, ID_FIELD};
pub use queue::{QueueName, WorkerDeclaration, WorkerKind};
