//! The output mapping produced by a successful task action.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output keys and values declared by a task.
///
/// Keys are kept sorted so that snapshots and reports are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskOutput {
    values: BTreeMap<String, serde_json::Value>,
}

impl TaskOutput {
    /// Creates an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Builds an output from any value that serializes to a JSON object.
    ///
    /// Non-object values are stored under the key `value`.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(map) => Ok(Self {
                values: map.into_iter().collect(),
            }),
            other => Ok(Self::new().with("value", other)),
        }
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the output has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the keys and values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }

    /// Consumes the output, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, serde_json::Value> {
        self.values
    }
}

impl FromIterator<(String, serde_json::Value)> for TaskOutput {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let output = TaskOutput::new()
            .with("accuracy", 0.95)
            .with("threshold_passed", true)
            .with("run_id", "abc");

        assert_eq!(output.len(), 3);
        assert_eq!(output.get("accuracy"), Some(&json!(0.95)));
        assert_eq!(output.get("threshold_passed"), Some(&json!(true)));
        assert!(output.get("missing").is_none());
    }

    #[test]
    fn test_from_serializable_object() {
        #[derive(Serialize)]
        struct Split {
            train_samples: u64,
            test_samples: u64,
        }

        let output = TaskOutput::from_serializable(&Split {
            train_samples: 120,
            test_samples: 30,
        })
        .unwrap();

        assert_eq!(output.get("train_samples"), Some(&json!(120)));
        assert_eq!(output.get("test_samples"), Some(&json!(30)));
    }

    #[test]
    fn test_from_serializable_scalar() {
        let output = TaskOutput::from_serializable(&42).unwrap();
        assert_eq!(output.get("value"), Some(&json!(42)));
    }

    #[test]
    fn test_keys_are_ordered() {
        let output = TaskOutput::new().with("b", 1).with("a", 2);
        let keys: Vec<_> = output.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
