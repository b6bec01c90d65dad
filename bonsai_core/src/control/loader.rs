use crate::config::ControllerConfig;
use crate::core::{
    skill_class_of, SkillBinding, SkillBindings, SkillConfigurator, SkillEnvironment,
    SkillRegistry,
};
use crate::error::BonsaiResult;
use crate::memory::SlotMapping;
use crate::scxml::{
    parse_file_with, parse_str_with, validate, DataEntry, ParseOptions, StateChart,
    ValidationResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

const KEY_STATE_PREFIX: &str = "STATE_PREFIX";
const KEY_SLOTS: &str = "SLOTS";
const KEY_DEFAULT_SLOTS: &str = "ENABLE_DEFAULT_SLOT_WRITERS";

/// Outcome of loading a behavior; loading succeeded when there are no errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingResults {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LoadingResults {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn merge(&mut self, validation: ValidationResult) {
        self.errors.extend(validation.errors);
        self.warnings.extend(validation.warnings);
    }
}

impl fmt::Display for LoadingResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.errors {
            writeln!(f, "error: {}", e)?;
        }
        for w in &self.warnings {
            writeln!(f, "warning: {}", w)?;
        }
        Ok(())
    }
}

/// Where a behavior comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BehaviorSource {
    File(PathBuf),
    Inline(String),
}

impl BehaviorSource {
    /// Text starting with `<` is an inline document, anything else a path.
    pub fn detect(source: &str) -> Self {
        if source.trim_start().starts_with('<') {
            Self::Inline(source.to_string())
        } else {
            Self::File(PathBuf::from(source.trim()))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline(_) => "<inline>".to_string(),
        }
    }
}

/// A checked behavior, ready to become a state machine.
#[derive(Debug, Clone)]
pub struct LoadedBehavior {
    pub chart: Arc<StateChart>,
    pub bindings: SkillBindings,
    pub env: SkillEnvironment,
}

/// Parse, bind, check-configure and validate a behavior.
///
/// `env` supplies actuators, sensors and working memory; slot mapping and
/// default slot policy are taken from the behavior itself.
pub fn load_behavior(
    source: &BehaviorSource,
    config: &ControllerConfig,
    registry: &SkillRegistry,
    env: &SkillEnvironment,
    options: &ParseOptions,
) -> (LoadingResults, Option<LoadedBehavior>) {
    let mut results = LoadingResults::default();

    let parsed = match source {
        BehaviorSource::File(path) => parse_file_with(path, options),
        BehaviorSource::Inline(xml) => parse_str_with(xml, options),
    };
    let chart = match parsed {
        Ok(chart) => chart,
        Err(e) => {
            results.error(e.to_string());
            return (results, None);
        }
    };

    let env = match chart_environment(&chart, config, env) {
        Ok(env) => env,
        Err(e) => {
            results.error(e.to_string());
            return (results, None);
        }
    };
    let prefix = chart
        .root_config(KEY_STATE_PREFIX)
        .map(|d| value_text(&d.value))
        .unwrap_or_else(|| config.state_prefix.clone());

    let bindings = bind_skills(&chart, &prefix, config, registry, &env, &mut results);
    results.merge(validate(&chart, &bindings, config.missing_transition_is_error));

    for w in &results.warnings {
        tracing::warn!("{}: {}", source.describe(), w);
    }
    if !results.success() {
        for e in &results.errors {
            tracing::error!("{}: {}", source.describe(), e);
        }
        return (results, None);
    }

    tracing::info!(
        "Loaded '{}' with {} states and {} skills",
        source.describe(),
        chart.states.len() - 1,
        bindings.len()
    );
    let behavior = LoadedBehavior {
        chart: Arc::new(chart),
        bindings,
        env,
    };
    (results, Some(behavior))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn chart_environment(
    chart: &StateChart,
    config: &ControllerConfig,
    base: &SkillEnvironment,
) -> BonsaiResult<SkillEnvironment> {
    let slots = match chart.root_config(KEY_SLOTS) {
        Some(DataEntry {
            content: Some(xml), ..
        }) => SlotMapping::from_xml(xml)?,
        _ => SlotMapping::new(),
    };
    let default_slots = match chart.root_config(KEY_DEFAULT_SLOTS).map(|d| &d.value) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => config.enable_default_slots,
    };

    Ok(SkillEnvironment {
        objects: base.objects.clone(),
        memory: base.memory.clone(),
        slots: Arc::new(slots),
        default_slots,
    })
}

fn bind_skills(
    chart: &StateChart,
    prefix: &str,
    config: &ControllerConfig,
    registry: &SkillRegistry,
    env: &SkillEnvironment,
    results: &mut LoadingResults,
) -> SkillBindings {
    let mut bindings = SkillBindings::new();

    for (idx, state) in chart.states.iter().enumerate().skip(1) {
        let Some(class) = skill_class_of(&state.id) else {
            continue;
        };
        let Some(resolved) = registry.resolve(prefix, class) else {
            results.error(format!(
                "No skill registered for class '{}' of state '{}'",
                class, state.id
            ));
            continue;
        };

        let params: BTreeMap<String, Value> = state
            .datamodel
            .iter()
            .filter(|d| d.is_config())
            .map(|d| (d.config_key().to_string(), d.value.clone()))
            .collect();

        let mut configurator = SkillConfigurator::new(&state.id, params.clone(), env.clone());
        let configured = registry
            .create(&resolved)
            .and_then(|mut skill| skill.configure(&mut configurator));
        if let Err(e) = configured {
            results.error(e.to_string());
            continue;
        }

        for key in configurator.finish() {
            let msg = format!("Parameter '{}' of state '{}' is never used", key, state.id);
            if config.unused_params_are_errors {
                results.error(msg);
            } else {
                results.warn(msg);
            }
        }

        bindings.insert(
            idx,
            SkillBinding {
                state_id: state.id.clone(),
                class: resolved,
                params,
                requested_tokens: configurator.requested_tokens().to_vec(),
            },
        );
    }
    bindings
}
