// Domain Error Types

use thiserror::Error;

/// Programmer errors in how a worker is declared or registered.
///
/// These surface when a worker is constructed or registered, never while
/// events are being consumed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("Queue worker declared without a queue name")]
    MissingQueueName,

    #[error("Invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("Queue '{0}' already has a registered worker")]
    DuplicateRegistration(String),

    #[error("Unknown worker kind: {0}")]
    UnknownWorkerKind(String),
}

/// Failure raised by a worker while consuming an event.
#[derive(Error, Debug)]
pub enum ConsumeError {
    /// A downstream service dropped the connection. Retryable.
    #[error("{service} disconnected: {reason}")]
    Disconnected { service: String, reason: String },

    /// A downstream service refused the request.
    #[error("{service} rejected request: {reason}")]
    Rejected { service: String, reason: String },

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Downstream failure: {0}")]
    Downstream(String),

    #[error("Republish failed: {0}")]
    Republish(String),

    /// The retry ceiling was reached; `source` is the last attempt's failure.
    #[error("Gave up after {tries} attempts: {source}")]
    RetriesExhausted {
        tries: u32,
        #[source]
        source: Box<ConsumeError>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConsumeError {
    pub fn disconnected(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Disconnected {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn retries_exhausted(tries: u32, source: ConsumeError) -> Self {
        Self::RetriesExhausted {
            tries,
            source: Box::new(source),
        }
    }

    /// Whether the failure is transient and the event worth redelivering.
    pub fn is_transient(&self) -> bool {
        matches!(self, ConsumeError::Disconnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_disconnects_are_transient() {
        assert!(ConsumeError::disconnected("smtp", "closed").is_transient());
        assert!(!ConsumeError::rejected("mailing list", "invalid").is_transient());
        let exhausted =
            ConsumeError::retries_exhausted(4, ConsumeError::disconnected("smtp", "closed"));
        assert!(!exhausted.is_transient());
        assert_eq!(
            exhausted.to_string(),
            "Gave up after 4 attempts: smtp disconnected: closed"
        );
    }
}
