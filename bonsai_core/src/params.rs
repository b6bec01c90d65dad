//! Simple runtime parameter system for BONSAI
//!
//! Provides a straightforward key-value store for runtime configuration

use crate::error::{BonsaiError, BonsaiResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

const DEFAULT_PARAMS_FILE: &str = ".bonsai/config/params.yaml";

/// Simple runtime parameter store
pub struct RuntimeParams {
    /// Parameter storage - BTreeMap maintains sorted order
    params: Arc<RwLock<BTreeMap<String, Value>>>,
    /// Optional persistence path
    persist_path: Option<PathBuf>,
}

impl RuntimeParams {
    /// Create new parameter store, loading `.bonsai/config/params.yaml` if present
    pub fn init() -> BonsaiResult<Self> {
        let params_file = PathBuf::from(DEFAULT_PARAMS_FILE);
        let mut initial_params = BTreeMap::new();

        if params_file.exists() {
            let yaml_str = std::fs::read_to_string(&params_file)?;
            initial_params = serde_yaml::from_str::<BTreeMap<String, Value>>(&yaml_str)?;
        }

        let params = Self {
            params: Arc::new(RwLock::new(initial_params)),
            persist_path: Some(params_file),
        };
        if params.list_keys().is_empty() {
            params.set_defaults()?;
        }
        Ok(params)
    }

    /// Create an empty store that is never persisted
    pub fn in_memory() -> Self {
        Self {
            params: Arc::new(RwLock::new(BTreeMap::new())),
            persist_path: None,
        }
    }

    fn set_defaults(&self) -> Result<(), BonsaiError> {
        // Engine defaults
        self.set("publisher_interval_ms", 50)?;
        self.set("stop_timeout_ms", 2000)?;
        self.set("skill_loop_delay_ms", 10)?;

        // Remote defaults
        self.set("daemon_host", "127.0.0.1")?;
        self.set("daemon_port", 8090)?;
        Ok(())
    }

    /// Get a parameter value
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let params = self.params.read().ok()?;
        let value = params.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Get parameter with default
    pub fn get_or<T: for<'de> Deserialize<'de>>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get_or(key, default)
    }

    pub fn get_i32(&self, key: &str, default: i32) -> i32 {
        self.get_or(key, default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_or(key, default)
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get_or(key, default.to_string())
    }

    /// Set a parameter value
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), BonsaiError> {
        let json_value = serde_json::to_value(value)?;
        let mut params = self.params.write()?;
        params.insert(key.to_string(), json_value);
        Ok(())
    }

    pub fn get_all(&self) -> BTreeMap<String, Value> {
        self.params.read().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn list_keys(&self) -> Vec<String> {
        self.params
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.params
            .read()
            .map(|p| p.contains_key(key))
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.params.write().ok()?.remove(key)
    }

    /// Clear all parameters and reset to defaults
    pub fn reset(&self) -> Result<(), BonsaiError> {
        let mut params = self.params.write()?;
        params.clear();
        drop(params);
        self.set_defaults()
    }

    /// Save parameters to YAML file
    pub fn save_to_disk(&self) -> Result<(), BonsaiError> {
        let path = self
            .persist_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PARAMS_FILE));
        self.save_to(&path)
    }

    /// Save parameters to an explicit YAML file
    pub fn save_to(&self, path: &Path) -> Result<(), BonsaiError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let params = self.params.read()?;
        let yaml = serde_yaml::to_string(&*params)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Load parameters from YAML file, replacing the current contents
    pub fn load_from_disk(&self, path: &Path) -> Result<(), BonsaiError> {
        if path.exists() {
            let yaml_str = std::fs::read_to_string(path)?;
            let loaded: BTreeMap<String, Value> = serde_yaml::from_str(&yaml_str)?;

            let mut params = self.params.write()?;
            *params = loaded;
        }
        Ok(())
    }
}

impl Clone for RuntimeParams {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            persist_path: self.persist_path.clone(),
        }
    }
}

impl Default for RuntimeParams {
    fn default() -> Self {
        Self::init().unwrap_or_else(|e| {
            tracing::warn!("Failed to initialize RuntimeParams: {}. Using empty params.", e);
            Self::in_memory()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let params = RuntimeParams::in_memory();
        params.set_defaults().unwrap();

        assert_eq!(params.get_i32("publisher_interval_ms", 0), 50);

        params.set("test_value", 42.5).unwrap();
        assert_eq!(params.get::<f64>("test_value"), Some(42.5));

        params.set("stop_timeout_ms", 500).unwrap();
        assert_eq!(params.get_i32("stop_timeout_ms", 0), 500);
        assert!(params.has("daemon_port"));
        assert!(params.remove("daemon_port").is_some());
        assert!(!params.has("daemon_port"));
    }

    #[test]
    fn test_save_and_load_roundtrip_through_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.yaml");

        let params = RuntimeParams::in_memory();
        params.set("speaker", "robot").unwrap();
        params.save_to(&path).unwrap();

        let loaded = RuntimeParams::in_memory();
        loaded.load_from_disk(&path).unwrap();
        assert_eq!(loaded.get_string("speaker", ""), "robot");
    }
}
