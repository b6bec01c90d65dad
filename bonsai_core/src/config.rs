//! Engine, controller and daemon configuration.
//!
//! Configuration files are TOML or YAML, picked by extension:
//!
//! ```toml
//! [controller]
//! publisher_interval_ms = 50
//! stop_timeout_ms = 2000
//!
//! [daemon]
//! port = 8090
//!
//! [include_mappings]
//! SKILLS = "/opt/robot/behaviors"
//! ```

use crate::error::{BonsaiError, BonsaiResult};
use crate::params::RuntimeParams;
use crate::scxml::ParseOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a loaded state machine is checked and driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Polling period of state publishers
    pub publisher_interval_ms: u64,
    /// How long `stop` waits for the control thread and skill runners
    pub stop_timeout_ms: u64,
    /// Delay between `execute` calls for loop tokens without their own delay
    pub skill_loop_delay_ms: u64,
    /// Unhandled skill exit events fail validation instead of warning
    pub missing_transition_is_error: bool,
    /// Parameters a skill never requests fail loading instead of warning
    pub unused_params_are_errors: bool,
    /// Slot keys without a `#_SLOTS` entry map to `/<key>`
    pub enable_default_slots: bool,
    /// Prepended to skill class names before plain lookup
    pub state_prefix: String,
    /// Upper bound of microsteps per macrostep
    pub max_microsteps: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl ControllerConfig {
    pub fn standard() -> Self {
        Self {
            publisher_interval_ms: 50,
            stop_timeout_ms: 2000,
            skill_loop_delay_ms: 10,
            missing_transition_is_error: false,
            unused_params_are_errors: false,
            enable_default_slots: true,
            state_prefix: String::new(),
            max_microsteps: 10_000,
        }
    }

    /// Every load-time warning about skills becomes an error
    pub fn strict() -> Self {
        Self::standard().with_strict_checks()
    }

    /// Keep this configuration but escalate skill warnings to errors.
    pub fn with_strict_checks(self) -> Self {
        Self {
            missing_transition_is_error: true,
            unused_params_are_errors: true,
            ..self
        }
    }

    /// Fast polling and short timeouts for tests
    pub fn testing() -> Self {
        Self {
            publisher_interval_ms: 5,
            stop_timeout_ms: 1000,
            skill_loop_delay_ms: 1,
            ..Self::standard()
        }
    }

    /// Standard preset overridden by the engine keys of `params`.
    pub fn from_params(params: &RuntimeParams) -> Self {
        let base = Self::standard();
        Self {
            publisher_interval_ms: params
                .get_or("publisher_interval_ms", base.publisher_interval_ms),
            stop_timeout_ms: params.get_or("stop_timeout_ms", base.stop_timeout_ms),
            skill_loop_delay_ms: params.get_or("skill_loop_delay_ms", base.skill_loop_delay_ms),
            missing_transition_is_error: params
                .get_bool("missing_transition_is_error", base.missing_transition_is_error),
            unused_params_are_errors: params
                .get_bool("unused_params_are_errors", base.unused_params_are_errors),
            enable_default_slots: params
                .get_bool("enable_default_slots", base.enable_default_slots),
            state_prefix: params.get_string("state_prefix", &base.state_prefix),
            max_microsteps: params.get_or("max_microsteps", base.max_microsteps),
        }
    }

    pub fn publisher_interval(&self) -> Duration {
        Duration::from_millis(self.publisher_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn skill_loop_delay(&self) -> Duration {
        Duration::from_millis(self.skill_loop_delay_ms)
    }

    pub fn validate(&self) -> BonsaiResult<()> {
        if self.publisher_interval_ms == 0 {
            return Err(BonsaiError::config("publisher_interval_ms must be > 0"));
        }
        if self.stop_timeout_ms == 0 {
            return Err(BonsaiError::config("stop_timeout_ms must be > 0"));
        }
        if self.max_microsteps == 0 {
            return Err(BonsaiError::config("max_microsteps must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

impl DaemonConfig {
    /// Defaults overridden by `daemon_host` / `daemon_port`.
    pub fn from_params(params: &RuntimeParams) -> Self {
        let base = Self::default();
        Self {
            host: params.get_string("daemon_host", &base.host),
            port: params.get_or("daemon_port", base.port),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonsaiConfig {
    pub controller: ControllerConfig,
    pub daemon: DaemonConfig,
    /// `${NAME}` -> directory used by `src` includes
    pub include_mappings: BTreeMap<String, PathBuf>,
}

impl BonsaiConfig {
    pub fn from_toml_str(text: &str) -> BonsaiResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.controller.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> BonsaiResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.controller.validate()?;
        Ok(config)
    }

    /// Load a `.toml`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> BonsaiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text)?,
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text)?,
            _ => {
                return Err(BonsaiError::Unsupported(format!(
                    "config file '{}' must end in .toml, .yaml or .yml",
                    path.display()
                )))
            }
        };
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Candidate files in lookup order: working directory, then `~/.bonsai/`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("bonsai.toml"),
            PathBuf::from("bonsai.yaml"),
            PathBuf::from("bonsai.yml"),
        ];
        if let Some(home) = dirs::home_dir() {
            let dir = home.join(".bonsai");
            paths.push(dir.join("config.toml"));
            paths.push(dir.join("config.yaml"));
        }
        paths
    }

    pub fn find() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.is_file())
    }

    /// Configuration built from runtime parameters alone.
    pub fn from_params(params: &RuntimeParams) -> Self {
        Self {
            controller: ControllerConfig::from_params(params),
            daemon: DaemonConfig::from_params(params),
            include_mappings: params.get_or("include_mappings", BTreeMap::new()),
        }
    }

    /// First config file found, or the project's runtime parameters
    /// (`.bonsai/config/params.yaml`, defaults when absent).
    pub fn load() -> BonsaiResult<Self> {
        match Self::find() {
            Some(path) => Self::from_file(path),
            None => Self::load_or(&RuntimeParams::init()?),
        }
    }

    /// First config file found, otherwise `params`.
    pub fn load_or(params: &RuntimeParams) -> BonsaiResult<Self> {
        match Self::find() {
            Some(path) => Self::from_file(path),
            None => {
                tracing::debug!("No configuration file found, using runtime parameters");
                let config = Self::from_params(params);
                config.controller.validate()?;
                Ok(config)
            }
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            include_mappings: self
                .include_mappings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            base_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let strict = ControllerConfig::strict();
        assert!(strict.missing_transition_is_error);
        assert!(strict.unused_params_are_errors);
        assert_eq!(strict.stop_timeout_ms, 2000);

        let testing = ControllerConfig::testing();
        assert!(testing.publisher_interval() < ControllerConfig::standard().publisher_interval());
        assert!(testing.validate().is_ok());
    }

    #[test]
    fn strict_checks_keep_user_settings() {
        let config = ControllerConfig {
            state_prefix: "robot.skills.".to_string(),
            enable_default_slots: false,
            ..ControllerConfig::testing()
        }
        .with_strict_checks();

        assert!(config.missing_transition_is_error);
        assert!(config.unused_params_are_errors);
        assert_eq!(config.state_prefix, "robot.skills.");
        assert!(!config.enable_default_slots);
        assert_eq!(config.publisher_interval_ms, 5);
    }

    #[test]
    fn toml_with_partial_sections() {
        let config = BonsaiConfig::from_toml_str(
            r#"
            [controller]
            publisher_interval_ms = 20
            state_prefix = "robot.skills."

            [daemon]
            port = 9000

            [include_mappings]
            LIB = "/opt/lib"
            "#,
        )
        .unwrap();

        assert_eq!(config.controller.publisher_interval_ms, 20);
        assert_eq!(config.controller.stop_timeout_ms, 2000);
        assert_eq!(config.daemon.addr(), "127.0.0.1:9000");
        assert_eq!(
            config.parse_options().include_mappings.get("LIB"),
            Some(&PathBuf::from("/opt/lib"))
        );
    }

    #[test]
    fn yaml_file_and_rejected_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bonsai.yaml");
        std::fs::write(&path, "controller:\n  skill_loop_delay_ms: 3\n").unwrap();
        let config = BonsaiConfig::from_file(&path).unwrap();
        assert_eq!(config.controller.skill_loop_delay_ms, 3);

        assert!(BonsaiConfig::from_toml_str("[controller]\npublisher_interval_ms = 0").is_err());
        assert!(BonsaiConfig::from_file(dir.path().join("bonsai.ini")).is_err());
    }

    #[test]
    fn params_override_standard_preset() {
        let params = RuntimeParams::in_memory();
        params.set("stop_timeout_ms", 500).unwrap();
        params.set("state_prefix", "demo.").unwrap();

        let config = ControllerConfig::from_params(&params);
        assert_eq!(config.stop_timeout_ms, 500);
        assert_eq!(config.state_prefix, "demo.");
        assert_eq!(config.publisher_interval_ms, 50);
    }

    #[test]
    fn full_config_from_params() {
        let params = RuntimeParams::in_memory();
        params.set("daemon_host", "0.0.0.0").unwrap();
        params.set("daemon_port", 9100).unwrap();
        params.set("max_microsteps", 64).unwrap();
        params
            .set("include_mappings", serde_json::json!({"LIB": "/opt/lib"}))
            .unwrap();

        let config = BonsaiConfig::from_params(&params);
        assert_eq!(config.daemon.addr(), "0.0.0.0:9100");
        assert_eq!(config.controller.max_microsteps, 64);
        assert_eq!(config.include_mappings["LIB"], PathBuf::from("/opt/lib"));

        let defaults = BonsaiConfig::from_params(&RuntimeParams::in_memory());
        assert_eq!(defaults, BonsaiConfig::default());
    }
}
