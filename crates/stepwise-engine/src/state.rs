use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stepwise_core::error::{Result, StepwiseError};

/// Shared state threaded through every step of one run.
///
/// The state is always a JSON object. Steps read and write it directly, and
/// may also return a partial object that the engine merges in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState {
    data: Map<String, Value>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RunState from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(Self { data }),
            other => Err(StepwiseError::SchemaValidation {
                step: None,
                issues: vec![format!("run state must be a JSON object, got {}", type_name(&other))],
            }),
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Get a value as an i64, if it's an integer.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Deserialize a value into a concrete type.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.data.get(key) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Set a string value.
    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Merge another object into this one (overwrites on conflict).
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (k, v) in other {
            self.data.insert(k, v);
        }
    }

    /// Merge a step's output. Only JSON objects can be merged.
    pub fn merge_output(&mut self, step: &str, output: Value) -> Result<()> {
        match output {
            Value::Object(map) => {
                self.merge(map);
                Ok(())
            }
            other => Err(StepwiseError::SchemaValidation {
                step: Some(step.to_string()),
                issues: vec![format!("step output must be a JSON object, got {}", type_name(&other))],
            }),
        }
    }

    /// Get the underlying data map.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Snapshot of the state as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_operations() {
        let mut state = RunState::new();
        state.set_str("name", "Alice");
        state.set("count", json!(42));

        assert_eq!(state.get_str("name"), Some("Alice"));
        assert_eq!(state.get_i64("count"), Some(42));
        assert_eq!(state.get("missing"), None);
        assert_eq!(state.remove("name"), Some(json!("Alice")));
        assert!(!state.contains_key("name"));
    }

    #[test]
    fn test_from_value_requires_object() {
        let state = RunState::from_value(json!({"topic": "AI"})).unwrap();
        assert_eq!(state.get_str("topic"), Some("AI"));

        let err = RunState::from_value(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("got array"));
    }

    #[test]
    fn test_merge_output_overwrites() {
        let mut state = RunState::from_value(json!({"a": 1, "b": 2})).unwrap();
        state
            .merge_output("s", json!({"b": "overwritten", "c": 3}))
            .unwrap();

        assert_eq!(state.to_value(), json!({"a": 1, "b": "overwritten", "c": 3}));
    }

    #[test]
    fn test_merge_output_rejects_non_object() {
        let mut state = RunState::new();
        let err = state.merge_output("s", json!("text")).unwrap_err();
        assert_eq!(err.step(), Some("s"));
        assert!(state.is_empty());
    }

    #[test]
    fn test_get_as_typed() {
        let state = RunState::from_value(json!({"tags": ["x", "y"]})).unwrap();
        let tags: Vec<String> = state.get_as("tags").unwrap().unwrap();
        assert_eq!(tags, vec!["x", "y"]);
        assert!(state.get_as::<Vec<String>>("nope").unwrap().is_none());
        assert!(state.get_as::<u32>("tags").is_err());
    }
}
