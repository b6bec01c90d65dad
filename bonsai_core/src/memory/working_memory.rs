use crate::error::BonsaiResult;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared blackboard addressed by slash paths (`/nav/target`).
///
/// Cloning is cheap: all clones see the same storage.
#[derive(Clone, Default)]
pub struct WorkingMemory {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a path to `/a/b` form.
    pub fn normalize_path(path: &str) -> String {
        let trimmed: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        format!("/{}", trimmed.join("/"))
    }

    /// Store a serializable value at `path`, replacing any previous value.
    pub fn write<T: Serialize>(&self, path: &str, value: &T) -> BonsaiResult<()> {
        let value = serde_json::to_value(value)?;
        self.entries
            .write()
            .insert(Self::normalize_path(path), value);
        Ok(())
    }

    /// Read and deserialize the value at `path`.
    ///
    /// Returns `Ok(None)` when nothing is stored there and an error when the
    /// stored value does not match `T`.
    pub fn read<T: DeserializeOwned>(&self, path: &str) -> BonsaiResult<Option<T>> {
        let entries = self.entries.read();
        match entries.get(&Self::normalize_path(path)) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn read_raw(&self, path: &str) -> Option<Value> {
        self.entries.read().get(&Self::normalize_path(path)).cloned()
    }

    pub fn remove(&self, path: &str) -> Option<Value> {
        self.entries.write().remove(&Self::normalize_path(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries
            .read()
            .contains_key(&Self::normalize_path(path))
    }

    /// All paths below `prefix` (inclusive), in sorted order.
    pub fn paths_under(&self, prefix: &str) -> Vec<String> {
        let prefix = Self::normalize_path(prefix);
        let nested = if prefix == "/" {
            prefix.clone()
        } else {
            format!("{}/", prefix)
        };
        self.entries
            .read()
            .keys()
            .filter(|k| **k == prefix || k.starts_with(&nested))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries.read().clone()
    }
}

impl std::fmt::Debug for WorkingMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingMemory")
            .field("entries", &self.len())
            .finish()
    }
}
