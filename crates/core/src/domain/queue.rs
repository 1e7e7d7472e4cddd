// Queue Domain Model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DeclarationError;

/// Maximum queue name length
pub const MAX_QUEUE_NAME_LEN: usize = 64;

/// Validated queue identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    /// Validate a queue name.
    ///
    /// Names are non-empty, at most 64 characters, and limited to ASCII
    /// alphanumerics, `_`, `-` and `.`.
    pub fn parse(name: impl Into<String>) -> Result<Self, DeclarationError> {
        let name = name.into();

        if name.trim().is_empty() {
            return Err(DeclarationError::MissingQueueName);
        }

        if name.len() > MAX_QUEUE_NAME_LEN {
            return Err(DeclarationError::InvalidQueueName {
                reason: format!("too long (max {} characters)", MAX_QUEUE_NAME_LEN),
                name,
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(DeclarationError::InvalidQueueName {
                name,
                reason: "only alphanumeric characters, '_', '-' and '.' are allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueueName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QueueName {
    type Error = DeclarationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// How a worker consumes its queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// One callback per delivered event
    Consumer,
    /// Periodic drain-and-sleep batches
    Loop,
    /// Deployment smoke-test worker
    Test,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Consumer => write!(f, "consumer"),
            WorkerKind::Loop => write!(f, "loop"),
            WorkerKind::Test => write!(f, "test"),
        }
    }
}

impl FromStr for WorkerKind {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consumer" => Ok(WorkerKind::Consumer),
            "loop" => Ok(WorkerKind::Loop),
            "test" => Ok(WorkerKind::Test),
            other => Err(DeclarationError::UnknownWorkerKind(other.to_string())),
        }
    }
}

/// A queue name bound to the kind of worker that owns it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDeclaration {
    pub queue_name: QueueName,
    pub kind: WorkerKind,
}

impl WorkerDeclaration {
    pub fn new(queue_name: &str, kind: WorkerKind) -> Result<Self, DeclarationError> {
        Ok(Self {
            queue_name: QueueName::parse(queue_name)?,
            kind,
        })
    }
}
