use crate::communication::CoreObjects;
use crate::core::skill::{ExitStatus, ExitToken};
use crate::error::{BonsaiError, BonsaiResult};
use crate::memory::{MemorySlot, SlotMapping, WorkingMemory};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Everything a skill may request besides its own parameters.
#[derive(Clone, Debug, Default)]
pub struct SkillEnvironment {
    pub objects: CoreObjects,
    pub memory: WorkingMemory,
    pub slots: Arc<SlotMapping>,
    /// Unmapped slot keys fall back to `/<key>` instead of failing
    pub default_slots: bool,
}

/// Hands configuration to a skill and records what it asked for.
///
/// Parameters come from the `#_`-prefixed `<data>` entries of the skill's
/// state (prefix stripped). Missing required values, bad types and unknown
/// actuators/sensors are reported as [`BonsaiError::Configuration`].
pub struct SkillConfigurator {
    state_id: String,
    params: BTreeMap<String, Value>,
    env: SkillEnvironment,
    requested_tokens: Vec<ExitToken>,
    consumed: BTreeSet<String>,
    requested_slots: BTreeMap<String, String>,
}

impl SkillConfigurator {
    pub fn new(state_id: &str, params: BTreeMap<String, Value>, env: SkillEnvironment) -> Self {
        Self {
            state_id: state_id.to_string(),
            params,
            env,
            requested_tokens: Vec::new(),
            consumed: BTreeSet::new(),
            requested_slots: BTreeMap::new(),
        }
    }

    pub fn state_id(&self) -> &str {
        &self.state_id
    }

    fn error(&self, key: &str, message: impl Into<String>) -> BonsaiError {
        BonsaiError::configuration(&self.state_id, key, message)
    }

    /// Declare that the skill may end with `status`.
    pub fn request_exit_token(&mut self, status: ExitStatus) -> ExitToken {
        self.register_token(ExitToken::new(status))
    }

    pub fn request_exit_token_with(&mut self, status: ExitStatus, suffix: &str) -> ExitToken {
        self.register_token(ExitToken::new(status).with_suffix(suffix))
    }

    fn register_token(&mut self, token: ExitToken) -> ExitToken {
        if token.is_loop() {
            tracing::warn!(
                "Skill in state '{}' requested a loop exit token; loop tokens need no request",
                self.state_id
            );
        } else if !self.requested_tokens.iter().any(|t| t.same_outcome(&token)) {
            self.requested_tokens.push(token.clone());
        }
        token
    }

    fn lookup(&mut self, key: &str) -> Option<Value> {
        let value = self.params.get(key).cloned()?;
        self.consumed.insert(key.to_string());
        Some(value)
    }

    fn value_to_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn request_value(&mut self, key: &str) -> BonsaiResult<String> {
        self.lookup(key)
            .map(|v| Self::value_to_string(&v))
            .ok_or_else(|| self.error(key, "required value is missing"))
    }

    pub fn request_optional_value(&mut self, key: &str, default: &str) -> String {
        self.lookup(key)
            .map(|v| Self::value_to_string(&v))
            .unwrap_or_else(|| default.to_string())
    }

    fn parse_int(&self, key: &str, value: &Value) -> BonsaiResult<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| self.error(key, format!("{} is not an integer", n))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| self.error(key, format!("'{}' is not an integer", s))),
            other => Err(self.error(key, format!("{} is not an integer", other))),
        }
    }

    fn parse_double(&self, key: &str, value: &Value) -> BonsaiResult<f64> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| self.error(key, format!("{} is not a number", n))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| self.error(key, format!("'{}' is not a number", s))),
            other => Err(self.error(key, format!("{} is not a number", other))),
        }
    }

    fn parse_bool(&self, key: &str, value: &Value) -> BonsaiResult<bool> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(self.error(key, format!("'{}' is not a boolean", s))),
            },
            other => Err(self.error(key, format!("{} is not a boolean", other))),
        }
    }

    pub fn request_int(&mut self, key: &str) -> BonsaiResult<i64> {
        let value = self
            .lookup(key)
            .ok_or_else(|| self.error(key, "required integer is missing"))?;
        self.parse_int(key, &value)
    }

    pub fn request_optional_int(&mut self, key: &str, default: i64) -> BonsaiResult<i64> {
        match self.lookup(key) {
            Some(value) => self.parse_int(key, &value),
            None => Ok(default),
        }
    }

    pub fn request_double(&mut self, key: &str) -> BonsaiResult<f64> {
        let value = self
            .lookup(key)
            .ok_or_else(|| self.error(key, "required number is missing"))?;
        self.parse_double(key, &value)
    }

    pub fn request_optional_double(&mut self, key: &str, default: f64) -> BonsaiResult<f64> {
        match self.lookup(key) {
            Some(value) => self.parse_double(key, &value),
            None => Ok(default),
        }
    }

    pub fn request_bool(&mut self, key: &str) -> BonsaiResult<bool> {
        let value = self
            .lookup(key)
            .ok_or_else(|| self.error(key, "required boolean is missing"))?;
        self.parse_bool(key, &value)
    }

    pub fn request_optional_bool(&mut self, key: &str, default: bool) -> BonsaiResult<bool> {
        match self.lookup(key) {
            Some(value) => self.parse_bool(key, &value),
            None => Ok(default),
        }
    }

    /// Typed working memory slot for `key`, resolved through the `#_SLOTS` mapping.
    pub fn request_slot<T: Serialize + DeserializeOwned>(
        &mut self,
        key: &str,
    ) -> BonsaiResult<MemorySlot<T>> {
        let path = match self.env.slots.resolve(&self.state_id, key) {
            Some(path) => path.to_string(),
            None if self.env.default_slots => WorkingMemory::normalize_path(key),
            None => return Err(self.error(key, "no slot mapping and default slots are disabled")),
        };
        self.requested_slots.insert(key.to_string(), path.clone());
        Ok(MemorySlot::new(self.env.memory.clone(), &path))
    }

    pub fn request_actuator<A: Send + Sync + 'static>(&mut self, key: &str) -> BonsaiResult<Arc<A>> {
        self.env
            .objects
            .actuator(key)
            .map_err(|e| self.error(key, e.to_string()))
    }

    pub fn request_sensor<S: Send + Sync + 'static>(&mut self, key: &str) -> BonsaiResult<Arc<S>> {
        self.env
            .objects
            .sensor(key)
            .map_err(|e| self.error(key, e.to_string()))
    }

    pub fn requested_tokens(&self) -> &[ExitToken] {
        &self.requested_tokens
    }

    /// Slot key -> resolved memory path
    pub fn requested_slots(&self) -> &BTreeMap<String, String> {
        &self.requested_slots
    }

    /// Parameters given in the state but never requested by the skill.
    pub fn unused_params(&self) -> Vec<String> {
        self.params
            .keys()
            .filter(|k| !self.consumed.contains(*k))
            .cloned()
            .collect()
    }

    /// End of configuration: logs and returns the unused parameters.
    pub fn finish(&self) -> Vec<String> {
        let unused = self.unused_params();
        for key in &unused {
            tracing::debug!("State '{}': parameter '{}' is never used", self.state_id, key);
        }
        unused
    }
}
