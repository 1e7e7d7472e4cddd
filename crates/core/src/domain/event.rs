// Event Domain Model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ConsumeError;

/// Correlation token field, optional on every event
pub const ID_FIELD: &str = "id";

/// Retry counter written by the retry wrapper
pub const FAILED_TRIES_FIELD: &str = "failed_tries";

/// One unit of work taken from a queue.
///
/// An ordered JSON object. The framework only reads the reserved fields
/// (`id`, `failed_tries`); everything else belongs to the worker. Transports
/// must carry reserved fields through a republish untouched, otherwise retry
/// counting restarts from zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    /// Fields owned by the framework
    pub const RESERVED_FIELDS: [&'static str; 2] = [ID_FIELD, FAILED_TRIES_FIELD];

    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse an event from its JSON text. Only JSON objects are events.
    pub fn from_json(text: &str) -> Result<Self, ConsumeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::try_from(value)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Correlation token, if the producer set one
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Number of failed delivery attempts so far (0 when never retried)
    pub fn failed_tries(&self) -> u32 {
        self.0
            .get(FAILED_TRIES_FIELD)
            .and_then(Value::as_u64)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0)
    }

    pub fn set_failed_tries(&mut self, tries: u32) {
        self.0.insert(FAILED_TRIES_FIELD.to_string(), Value::from(tries));
    }

    pub fn require_str(&self, key: &str) -> Result<&str, ConsumeError> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ConsumeError::MalformedEvent(format!("missing string field '{}'", key)))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64, ConsumeError> {
        self.0
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| ConsumeError::MalformedEvent(format!("missing integer field '{}'", key)))
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, ConsumeError> {
        self.0
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| ConsumeError::MalformedEvent(format!("missing numeric field '{}'", key)))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl TryFrom<Value> for Event {
    type Error = ConsumeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ConsumeError::MalformedEvent(format!(
                "event must be a JSON object, got {}",
                other
            ))),
        }
    }
}

impl From<Map<String, Value>> for Event {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
