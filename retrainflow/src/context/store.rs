//! Thread-safe, write-once context store.

use crate::core::TaskOutput;
use crate::errors::ContextError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type Namespaces = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// A run-scoped mapping from `(task_id, key)` to an opaque value.
///
/// Writing to an existing `(task_id, key)` raises `DuplicateKey`. The store
/// does not check who reads what; access rules are applied by
/// [`TaskContext`](super::TaskContext).
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: RwLock<Namespaces>,
}

impl ContextStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value while building an initial context.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the pair was already seeded.
    pub fn with_value(
        self,
        task_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Self, ContextError> {
        self.write(task_id, key, value)?;
        Ok(self)
    }

    /// Writes a single value.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the pair was already written in this run.
    pub fn write(
        &self,
        task_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), ContextError> {
        let task_id = task_id.into();
        let key = key.into();
        let mut entries = self.entries.write();
        let namespace = entries.entry(task_id.clone()).or_default();

        if namespace.contains_key(&key) {
            return Err(ContextError::duplicate_key(task_id, key));
        }

        namespace.insert(key, value.into());
        Ok(())
    }

    /// Merges a task output under the task's namespace.
    ///
    /// Either every key is written or none is.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` for the first key that was already written.
    pub fn write_output(&self, task_id: &str, output: &TaskOutput) -> Result<(), ContextError> {
        let mut entries = self.entries.write();

        if let Some(namespace) = entries.get(task_id) {
            if let Some((key, _)) = output.iter().find(|(key, _)| namespace.contains_key(*key)) {
                return Err(ContextError::duplicate_key(task_id, key.as_str()));
            }
        }

        let namespace = entries.entry(task_id.to_string()).or_default();
        for (key, value) in output.iter() {
            namespace.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the pair was never written.
    pub fn read(&self, task_id: &str, key: &str) -> Result<serde_json::Value, ContextError> {
        self.get(task_id, key)
            .ok_or_else(|| ContextError::not_found(task_id, key))
    }

    /// Gets a value if present.
    #[must_use]
    pub fn get(&self, task_id: &str, key: &str) -> Option<serde_json::Value> {
        self.entries
            .read()
            .get(task_id)
            .and_then(|namespace| namespace.get(key))
            .cloned()
    }

    /// Checks if a pair was written.
    #[must_use]
    pub fn contains(&self, task_id: &str, key: &str) -> bool {
        self.entries
            .read()
            .get(task_id)
            .is_some_and(|namespace| namespace.contains_key(key))
    }

    /// Returns all namespaces with at least one value.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Returns the total number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an immutable copy of every value.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            entries: self.entries.read().clone(),
        }
    }
}

impl Clone for ContextStore {
    fn clone(&self) -> Self {
        Self {
            entries: RwLock::new(self.entries.read().clone()),
        }
    }
}

/// An immutable copy of a context store, ordered by namespace then key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSnapshot {
    entries: Namespaces,
}

impl ContextSnapshot {
    /// Gets a value.
    #[must_use]
    pub fn get(&self, task_id: &str, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(task_id).and_then(|namespace| namespace.get(key))
    }

    /// Returns every value written by a task.
    #[must_use]
    pub fn namespace(&self, task_id: &str) -> Option<&BTreeMap<String, serde_json::Value>> {
        self.entries.get(task_id)
    }

    /// Returns the total number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Returns true if the snapshot holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
