use crate::core::SkillBindings;
use crate::scxml::model::{StateChart, StateIdx, ROOT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Problems found in a behavior before it is run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: String) {
        self.errors.push(msg);
    }

    fn warn(&mut self, msg: String) {
        self.warnings.push(msg);
    }
}

/// Structural and skill checks of a parsed chart.
///
/// With `strict`, skill exit tokens that no transition handles are errors
/// instead of warnings.
pub fn validate(chart: &StateChart, bindings: &SkillBindings, strict: bool) -> ValidationResult {
    let mut result = ValidationResult::default();

    for id in &chart.duplicate_ids {
        result.error(format!("State id '{}' is declared more than once", id));
    }

    check_targets(chart, &mut result);
    check_initials(chart, &mut result);
    check_skill_states(chart, bindings, strict, &mut result);
    check_reachability(chart, &mut result);

    result
}

fn check_targets(chart: &StateChart, result: &mut ValidationResult) {
    for transition in &chart.transitions {
        for target in &transition.target_ids {
            if chart.index_of(target).is_none() {
                result.error(format!(
                    "Transition of state '{}' targets unknown state '{}'",
                    chart.state(transition.source).id,
                    target
                ));
            }
        }
    }
}

fn check_initials(chart: &StateChart, result: &mut ValidationResult) {
    for (idx, state) in chart.states.iter().enumerate() {
        if !state.initial_ids.is_empty() && state.is_atomic() {
            result.warn(format!(
                "State '{}' has an initial attribute but no child states",
                state.id
            ));
            continue;
        }
        for id in &state.initial_ids {
            match chart.index_of(id) {
                None => result.error(format!(
                    "Initial state '{}' of '{}' does not exist",
                    id, state.id
                )),
                Some(initial) if !chart.is_descendant(initial, idx) => result.error(format!(
                    "Initial state '{}' is not a descendant of '{}'",
                    id, state.id
                )),
                Some(_) => {}
            }
        }
    }
    if chart.root().initial.is_empty() {
        result.error("The behavior has no initial state".to_string());
    }
}

fn check_skill_states(
    chart: &StateChart,
    bindings: &SkillBindings,
    strict: bool,
    result: &mut ValidationResult,
) {
    for (&idx, binding) in bindings {
        let state = chart.state(idx);
        if !state.is_atomic() || state.is_final() {
            result.error(format!(
                "Skill state '{}' must be atomic but is {}",
                state.id,
                state.kind.as_str()
            ));
            continue;
        }

        let mut handlers: Vec<StateIdx> = vec![idx];
        handlers.extend(chart.proper_ancestors(idx, None));

        for event in binding.event_names() {
            let handled = handlers.iter().any(|s| {
                chart
                    .state(*s)
                    .transitions
                    .iter()
                    .any(|t| chart.transition(*t).matches(&event))
            });
            if !handled {
                let msg = format!(
                    "Exit event '{}' of skill state '{}' has no transition",
                    event, state.id
                );
                if strict {
                    result.error(msg);
                } else {
                    result.warn(msg);
                }
            }
        }
    }
}

fn check_reachability(chart: &StateChart, result: &mut ValidationResult) {
    let mut reachable: BTreeSet<StateIdx> = BTreeSet::new();
    let mut pending = vec![ROOT];

    while let Some(idx) = pending.pop() {
        if !reachable.insert(idx) {
            continue;
        }
        let state = chart.state(idx);
        let mut next: Vec<StateIdx> = state.initial.clone();
        if state.is_parallel() {
            next.extend(chart.child_states(idx));
        }
        if let Some(parent) = state.parent {
            next.push(parent);
        }
        for t in &state.transitions {
            next.extend(chart.transition(*t).targets.iter().copied());
        }
        pending.extend(next.into_iter().filter(|n| !reachable.contains(n)));
    }

    for (idx, state) in chart.states.iter().enumerate().skip(1) {
        if !reachable.contains(&idx) && !state.is_history() {
            result.warn(format!("State '{}' is unreachable", state.id));
        }
    }

    if !reachable.iter().any(|idx| chart.state(*idx).is_final()) {
        result.warn("No final state is reachable; the behavior only ends when stopped".to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExitToken, SkillBinding};
    use crate::scxml::parse_str;
    use std::collections::BTreeMap;

    fn bind(chart: &StateChart, id: &str, tokens: Vec<ExitToken>) -> SkillBindings {
        let idx = chart.index_of(id).unwrap();
        let class = crate::core::skill_class_of(id).unwrap().to_string();
        BTreeMap::from([(
            idx,
            SkillBinding {
                state_id: id.to_string(),
                class,
                params: BTreeMap::new(),
                requested_tokens: tokens,
            },
        )])
    }

    #[test]
    fn structural_errors() {
        let chart = parse_str(
            r#"<scxml initial="A">
                 <state id="A" initial="B">
                   <state id="A1"/>
                   <transition event="go" target="Missing"/>
                 </state>
                 <state id="B"/>
                 <state id="B"/>
               </scxml>"#,
        )
        .unwrap();
        let result = validate(&chart, &SkillBindings::new(), false);

        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("more than once")));
        assert!(result.errors.iter().any(|e| e.contains("unknown state 'Missing'")));
        assert!(result.errors.iter().any(|e| e.contains("not a descendant")));
    }

    #[test]
    fn unreachable_states_and_missing_final_are_warnings() {
        let chart = parse_str(
            r#"<scxml initial="A">
                 <state id="A"><transition event="go" target="B"/></state>
                 <state id="B"/>
                 <state id="Island"/>
               </scxml>"#,
        )
        .unwrap();
        let result = validate(&chart, &SkillBindings::new(), false);

        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("'Island' is unreachable")));
        assert!(result.warnings.iter().any(|w| w.contains("No final state")));
        assert!(!result.warnings.iter().any(|w| w.contains("'B' is unreachable")));
    }

    #[test]
    fn exit_coverage_respects_ancestors_and_strictness() {
        let chart = parse_str(
            r#"<scxml initial="Outer">
                 <state id="Outer">
                   <state id="Wait#w"><transition event="Wait.success" target="Done"/></state>
                   <transition event="Wait.error" target="Done"/>
                 </state>
                 <final id="Done"/>
               </scxml>"#,
        )
        .unwrap();
        let tokens = vec![
            ExitToken::success(),
            ExitToken::error(),
            ExitToken::fatal(),
        ];
        let bindings = bind(&chart, "Wait#w", tokens);

        let lenient = validate(&chart, &bindings, false);
        assert!(lenient.is_valid());
        assert_eq!(
            lenient.warnings,
            vec!["Exit event 'Wait.fatal' of skill state 'Wait#w' has no transition"]
        );

        let strict = validate(&chart, &bindings, true);
        assert_eq!(strict.errors.len(), 1);
    }

    #[test]
    fn skill_states_must_be_atomic() {
        let chart = parse_str(
            r#"<scxml initial="Noop#n"><state id="Noop#n"><state id="Inner"/></state></scxml>"#,
        )
        .unwrap();
        let bindings = bind(&chart, "Noop#n", vec![]);
        let result = validate(&chart, &bindings, false);
        assert!(result.errors.iter().any(|e| e.contains("must be atomic")));
    }
}
