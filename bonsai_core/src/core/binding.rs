use crate::core::skill::{simple_name, ExitToken};
use serde_json::Value;
use std::collections::BTreeMap;

/// A state bound to a skill class, as established at load time.
#[derive(Debug, Clone, PartialEq)]
pub struct SkillBinding {
    pub state_id: String,
    /// Registered class name, state prefix already applied
    pub class: String,
    /// `#_` parameters of the state, prefix stripped
    pub params: BTreeMap<String, Value>,
    /// Exit tokens requested while configuring in check mode
    pub requested_tokens: Vec<ExitToken>,
}

impl SkillBinding {
    pub fn simple_name(&self) -> &str {
        simple_name(&self.class)
    }

    /// Events this skill may fire
    pub fn event_names(&self) -> Vec<String> {
        self.requested_tokens
            .iter()
            .map(|t| t.event_name(self.simple_name()))
            .collect()
    }
}

/// Skill bindings keyed by state index.
pub type SkillBindings = BTreeMap<usize, SkillBinding>;
