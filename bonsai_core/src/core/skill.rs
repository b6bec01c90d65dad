use crate::core::configurator::SkillConfigurator;
use crate::error::BonsaiResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome category of a skill execution step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitStatus {
    Success,
    Error,
    Fatal,
    /// Not an outcome: execute again
    Loop,
}

impl ExitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Loop => "loop",
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of `Skill::execute` / `Skill::end`.
///
/// Non-loop tokens become events named `<Simple>.<status>[.<suffix>]`, e.g.
/// `Talk.success` or `Drive.error.blocked`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExitToken {
    status: ExitStatus,
    suffix: Option<String>,
    loop_delay: Option<Duration>,
}

impl ExitToken {
    pub fn new(status: ExitStatus) -> Self {
        Self {
            status,
            suffix: None,
            loop_delay: None,
        }
    }

    pub fn success() -> Self {
        Self::new(ExitStatus::Success)
    }

    pub fn error() -> Self {
        Self::new(ExitStatus::Error)
    }

    pub fn fatal() -> Self {
        Self::new(ExitStatus::Fatal)
    }

    /// Execute again after the engine's default loop delay
    pub fn loop_now() -> Self {
        Self::new(ExitStatus::Loop)
    }

    /// Execute again after `delay`
    pub fn loop_with(delay: Duration) -> Self {
        Self {
            status: ExitStatus::Loop,
            suffix: None,
            loop_delay: Some(delay),
        }
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        let suffix = suffix.trim_matches('.');
        self.suffix = if suffix.is_empty() {
            None
        } else {
            Some(suffix.to_string())
        };
        self
    }

    pub fn status(&self) -> ExitStatus {
        self.status
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    pub fn loop_delay(&self) -> Option<Duration> {
        self.loop_delay
    }

    pub fn is_loop(&self) -> bool {
        self.status == ExitStatus::Loop
    }

    /// `success` or `success.limit`
    pub fn full_status(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}.{}", self.status, suffix),
            None => self.status.to_string(),
        }
    }

    pub fn event_name(&self, skill_simple_name: &str) -> String {
        format!("{}.{}", skill_simple_name, self.full_status())
    }

    /// Equal status and suffix, ignoring loop delays
    pub fn same_outcome(&self, other: &ExitToken) -> bool {
        self.status == other.status && self.suffix == other.suffix
    }
}

impl fmt::Display for ExitToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_status())
    }
}

/// A single robot behavior bound to an atomic state.
///
/// Lifecycle, driven by the skill runner:
/// 1. **configure** - request parameters, slots, actuators, sensors and exit tokens
/// 2. **init** - acquire resources; returning `false` ends the skill with `fatal`
/// 3. **execute** - called repeatedly while it returns a loop token
/// 4. **end** - may replace the token produced by `execute`
///
/// `configure` is also run once at load time to check the behavior.
pub trait Skill: Send {
    fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()>;

    fn init(&mut self) -> bool {
        true
    }

    fn execute(&mut self) -> ExitToken;

    fn end(&mut self, current: ExitToken) -> ExitToken {
        current
    }
}

/// Skill class named by a state id: `dialog.Talk#greet` -> `dialog.Talk`.
pub fn skill_class_of(state_id: &str) -> Option<&str> {
    let (class, _) = state_id.split_once('#')?;
    if class.is_empty() {
        None
    } else {
        Some(class)
    }
}

/// Last segment of a class name: `dialog.Talk` -> `Talk`.
pub fn simple_name(class: &str) -> &str {
    class.rsplit('.').next().unwrap_or(class)
}
