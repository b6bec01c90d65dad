//! Statechart semantics without threads.
//!
//! Follows the W3C SCXML algorithm: transitions are selected in document
//! order from the atomic states upwards, conflicting transitions are
//! removed, the exit set is exited in reverse document order and the entry
//! set is entered in document order. Skill runners are attached through
//! [`InterpreterHooks`].

use crate::scxml::{
    parse_literal, ConditionContext, Executable, HistoryKind, StateChart, StateIdx, StateKind,
    TransitionIdx, TransitionType, ROOT,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DONE_STATE_PREFIX: &str = "done.state.";
pub const ERROR_EXECUTION: &str = "error.execution";

const DEFAULT_MAX_MICROSTEPS: usize = 10_000;

/// Callbacks fired while states are entered and exited.
pub trait InterpreterHooks {
    fn on_entry(&mut self, _chart: &StateChart, _state: StateIdx) {}

    fn on_exit(&mut self, _chart: &StateChart, _state: StateIdx) {}
}

impl InterpreterHooks for () {}

#[derive(Debug, Clone)]
struct DelayedEvent {
    event: String,
    send_id: Option<String>,
    due: Instant,
}

#[derive(Default)]
struct EntrySet {
    states: BTreeSet<StateIdx>,
    /// parent of a history state -> its default transition
    history_content: HashMap<StateIdx, TransitionIdx>,
}

/// Parses `<send delay>` values: `500ms`, `2s`, `1.5s`, `1m` or plain milliseconds.
pub fn parse_delay(text: &str) -> Option<Duration> {
    let text = text.trim().trim_matches('\'');
    let (number, unit) = if let Some(n) = text.strip_suffix("ms") {
        (n, "ms")
    } else if let Some(n) = text.strip_suffix('s') {
        (n, "s")
    } else if let Some(n) = text.strip_suffix('m') {
        (n, "m")
    } else {
        (text, "ms")
    };
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let secs = match unit {
        "s" => value,
        "m" => value * 60.0,
        _ => value / 1000.0,
    };
    Some(Duration::from_secs_f64(secs))
}

pub struct Interpreter {
    chart: Arc<StateChart>,
    configuration: BTreeSet<StateIdx>,
    history: HashMap<StateIdx, Vec<StateIdx>>,
    internal: VecDeque<String>,
    delayed: Vec<DelayedEvent>,
    variables: BTreeMap<String, Value>,
    visits: BTreeMap<String, u64>,
    current_event: Option<String>,
    running: bool,
    finished: bool,
    max_microsteps: usize,
}

impl Interpreter {
    pub fn new(chart: Arc<StateChart>) -> Self {
        let variables = chart
            .states
            .iter()
            .flat_map(|s| s.datamodel.iter())
            .filter(|d| !d.is_config())
            .map(|d| (d.id.clone(), d.value.clone()))
            .collect();

        Self {
            chart,
            configuration: BTreeSet::new(),
            history: HashMap::new(),
            internal: VecDeque::new(),
            delayed: Vec::new(),
            variables,
            visits: BTreeMap::new(),
            current_event: None,
            running: false,
            finished: false,
            max_microsteps: DEFAULT_MAX_MICROSTEPS,
        }
    }

    pub fn with_max_microsteps(mut self, max: usize) -> Self {
        self.max_microsteps = max.max(1);
        self
    }

    pub fn chart(&self) -> &Arc<StateChart> {
        &self.chart
    }

    /// Enter the initial configuration and run until stable.
    pub fn start(&mut self, hooks: &mut dyn InterpreterHooks) {
        if self.running {
            return;
        }
        self.running = true;
        self.finished = false;

        let chart = Arc::clone(&self.chart);
        let mut entry = EntrySet::default();
        for &s in &chart.root().initial {
            self.add_descendants(s, &mut entry);
        }
        for &s in &chart.root().initial {
            self.add_ancestors(s, ROOT, &mut entry);
        }
        self.enter_set(entry, hooks);
        self.run_to_stability(hooks);
    }

    /// Process one external event as a macrostep.
    ///
    /// Returns `true` when at least one transition was taken for it.
    pub fn process_event(&mut self, event: &str, hooks: &mut dyn InterpreterHooks) -> bool {
        if !self.running {
            return false;
        }
        self.current_event = Some(event.to_string());
        let enabled = self.select_transitions(Some(event));
        let handled = !enabled.is_empty();
        if handled {
            self.microstep(&enabled, hooks);
        }
        self.run_to_stability(hooks);
        handled
    }

    /// Exit every active state and drop pending events.
    pub fn stop(&mut self, hooks: &mut dyn InterpreterHooks) {
        let active = self.configuration.clone();
        self.exit_set(active, hooks);
        self.internal.clear();
        self.delayed.clear();
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// A top-level final state was reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn configuration(&self) -> Vec<StateIdx> {
        self.configuration.iter().copied().collect()
    }

    /// Active atomic state ids in document order
    pub fn current_states(&self) -> Vec<String> {
        self.configuration
            .iter()
            .filter(|s| self.chart.state(**s).is_atomic())
            .map(|s| self.chart.state(*s).id.clone())
            .collect()
    }

    /// Every active state id in document order
    pub fn active_states(&self) -> Vec<String> {
        self.configuration
            .iter()
            .map(|s| self.chart.state(*s).id.clone())
            .collect()
    }

    pub fn visits(&self) -> &BTreeMap<String, u64> {
        &self.visits
    }

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    pub fn next_delayed_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|d| d.due).min()
    }

    pub fn pending_delayed(&self) -> usize {
        self.delayed.len()
    }

    /// Remove and return the delayed events due at `now`, earliest first.
    pub fn take_due_events(&mut self, now: Instant) -> Vec<String> {
        let (mut ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.delayed)
            .into_iter()
            .partition(|d| d.due <= now);
        self.delayed = pending;
        ready.sort_by_key(|d| d.due);
        ready.into_iter().map(|d| d.event).collect()
    }

    fn run_to_stability(&mut self, hooks: &mut dyn InterpreterHooks) {
        let mut steps = 0usize;
        while self.running {
            let mut enabled = self.select_transitions(None);
            if enabled.is_empty() {
                let Some(event) = self.internal.pop_front() else {
                    break;
                };
                self.current_event = Some(event.clone());
                enabled = self.select_transitions(Some(&event));
            }
            if !enabled.is_empty() {
                self.microstep(&enabled, hooks);
            }

            steps += 1;
            if steps >= self.max_microsteps {
                tracing::error!(
                    "Macrostep exceeded {} microsteps; dropping {} internal events",
                    self.max_microsteps,
                    self.internal.len()
                );
                self.internal.clear();
                break;
            }
        }
    }

    fn select_transitions(&self, event: Option<&str>) -> Vec<TransitionIdx> {
        let chart = &self.chart;
        let mut enabled = Vec::new();
        let atomic: Vec<StateIdx> = self
            .configuration
            .iter()
            .copied()
            .filter(|s| chart.state(*s).is_atomic())
            .collect();

        for state in atomic {
            let mut chain = vec![state];
            chain.extend(chart.proper_ancestors(state, None));

            'chain: for s in chain {
                for &t in &chart.state(s).transitions {
                    let transition = chart.transition(t);
                    let matched = match event {
                        None => transition.is_eventless(),
                        Some(name) => !transition.is_eventless() && transition.matches(name),
                    };
                    if matched
                        && transition
                            .cond
                            .as_ref()
                            .map_or(true, |c| c.evaluate(self))
                    {
                        if !enabled.contains(&t) {
                            enabled.push(t);
                        }
                        break 'chain;
                    }
                }
            }
        }
        self.remove_conflicting(enabled)
    }

    fn remove_conflicting(&self, enabled: Vec<TransitionIdx>) -> Vec<TransitionIdx> {
        let mut filtered: Vec<TransitionIdx> = Vec::new();
        for t1 in enabled {
            let exit1 = self.compute_exit_set(&[t1]);
            let source1 = self.chart.transition(t1).source;
            let mut preempted = false;
            let mut replaced = Vec::new();

            for &t2 in &filtered {
                let exit2 = self.compute_exit_set(&[t2]);
                if exit1.is_disjoint(&exit2) {
                    continue;
                }
                if self
                    .chart
                    .is_descendant(source1, self.chart.transition(t2).source)
                {
                    replaced.push(t2);
                } else {
                    preempted = true;
                    break;
                }
            }

            if !preempted {
                filtered.retain(|t| !replaced.contains(t));
                filtered.push(t1);
            }
        }
        filtered
    }

    fn microstep(&mut self, enabled: &[TransitionIdx], hooks: &mut dyn InterpreterHooks) {
        let chart = Arc::clone(&self.chart);
        let exit = self.compute_exit_set(enabled);
        self.exit_set(exit, hooks);
        for &t in enabled {
            self.execute(&chart.transition(t).actions);
        }

        let mut entry = EntrySet::default();
        for &t in enabled {
            let transition = chart.transition(t);
            for &s in &transition.targets {
                self.add_descendants(s, &mut entry);
            }
            if let Some(domain) = self.transition_domain(t) {
                for s in self.effective_targets(&transition.targets) {
                    self.add_ancestors(s, domain, &mut entry);
                }
            }
        }
        self.enter_set(entry, hooks);
    }

    fn effective_targets(&self, targets: &[StateIdx]) -> Vec<StateIdx> {
        let mut result = Vec::new();
        for &s in targets {
            let resolved = if self.chart.state(s).is_history() {
                match self.history.get(&s) {
                    Some(recorded) => recorded.clone(),
                    None => self.effective_targets(&self.history_default(s)),
                }
            } else {
                vec![s]
            };
            for r in resolved {
                if !result.contains(&r) {
                    result.push(r);
                }
            }
        }
        result
    }

    /// Targets of a history state that has nothing recorded yet
    fn history_default(&self, history: StateIdx) -> Vec<StateIdx> {
        let node = self.chart.state(history);
        if let Some(&t) = node.transitions.first() {
            return self.chart.transition(t).targets.clone();
        }
        let parent = node.parent.unwrap_or(ROOT);
        if self.chart.state(parent).is_parallel() {
            self.chart.child_states(parent).collect()
        } else {
            self.chart.state(parent).initial.clone()
        }
    }

    fn transition_domain(&self, t: TransitionIdx) -> Option<StateIdx> {
        let transition = self.chart.transition(t);
        let targets = self.effective_targets(&transition.targets);
        if targets.is_empty() {
            return None;
        }
        if transition.kind == TransitionType::Internal
            && self.chart.state(transition.source).is_compound()
            && targets
                .iter()
                .all(|s| self.chart.is_descendant(*s, transition.source))
        {
            return Some(transition.source);
        }

        let mut states = vec![transition.source];
        states.extend(targets);
        Some(self.find_lcca(&states))
    }

    /// Least common compound ancestor
    fn find_lcca(&self, states: &[StateIdx]) -> StateIdx {
        let Some((first, rest)) = states.split_first() else {
            return ROOT;
        };
        for ancestor in self.chart.proper_ancestors(*first, None) {
            if (ancestor == ROOT || self.chart.state(ancestor).is_compound())
                && rest.iter().all(|s| self.chart.is_descendant(*s, ancestor))
            {
                return ancestor;
            }
        }
        ROOT
    }

    fn compute_exit_set(&self, transitions: &[TransitionIdx]) -> BTreeSet<StateIdx> {
        let mut exit = BTreeSet::new();
        for &t in transitions {
            if let Some(domain) = self.transition_domain(t) {
                exit.extend(
                    self.configuration
                        .iter()
                        .copied()
                        .filter(|s| self.chart.is_descendant(*s, domain)),
                );
            }
        }
        exit
    }

    fn exit_set(&mut self, exit: BTreeSet<StateIdx>, hooks: &mut dyn InterpreterHooks) {
        let chart = Arc::clone(&self.chart);

        for &s in &exit {
            for &h in &chart.state(s).children {
                let StateKind::History(kind) = chart.state(h).kind else {
                    continue;
                };
                let recorded: Vec<StateIdx> = self
                    .configuration
                    .iter()
                    .copied()
                    .filter(|c| match kind {
                        HistoryKind::Deep => {
                            chart.state(*c).is_atomic() && chart.is_descendant(*c, s)
                        }
                        HistoryKind::Shallow => chart.state(*c).parent == Some(s),
                    })
                    .collect();
                self.history.insert(h, recorded);
            }
        }

        for &s in exit.iter().rev() {
            hooks.on_exit(&chart, s);
            self.execute(&chart.state(s).onexit);
            self.configuration.remove(&s);
        }
    }

    fn add_descendants(&self, state: StateIdx, entry: &mut EntrySet) {
        let chart = &self.chart;
        let node = chart.state(state);

        if node.is_history() {
            let parent = node.parent.unwrap_or(ROOT);
            let targets = match self.history.get(&state) {
                Some(recorded) => recorded.clone(),
                None => {
                    if let Some(&t) = node.transitions.first() {
                        entry.history_content.insert(parent, t);
                    }
                    self.history_default(state)
                }
            };
            for &s in &targets {
                self.add_descendants(s, entry);
            }
            for &s in &targets {
                self.add_ancestors(s, parent, entry);
            }
            return;
        }

        entry.states.insert(state);
        if node.is_compound() {
            for &s in &node.initial {
                self.add_descendants(s, entry);
            }
            for &s in &node.initial {
                self.add_ancestors(s, state, entry);
            }
        } else if node.is_parallel() {
            for child in chart.child_states(state) {
                if !entry.states.iter().any(|s| chart.is_descendant(*s, child)) {
                    self.add_descendants(child, entry);
                }
            }
        }
    }

    fn add_ancestors(&self, state: StateIdx, ancestor: StateIdx, entry: &mut EntrySet) {
        let chart = &self.chart;
        for anc in chart.proper_ancestors(state, Some(ancestor)) {
            if anc == ROOT {
                break;
            }
            entry.states.insert(anc);
            if chart.state(anc).is_parallel() {
                for child in chart.child_states(anc) {
                    if !entry.states.iter().any(|s| chart.is_descendant(*s, child)) {
                        self.add_descendants(child, entry);
                    }
                }
            }
        }
    }

    fn enter_set(&mut self, entry: EntrySet, hooks: &mut dyn InterpreterHooks) {
        let chart = Arc::clone(&self.chart);

        for &s in &entry.states {
            if s == ROOT {
                continue;
            }
            let node = chart.state(s);
            self.configuration.insert(s);
            *self.visits.entry(node.id.clone()).or_insert(0) += 1;

            self.execute(&node.onentry);
            if let Some(&t) = entry.history_content.get(&s) {
                self.execute(&chart.transition(t).actions);
            }
            hooks.on_entry(&chart, s);

            if !node.is_final() {
                continue;
            }
            let parent = node.parent.unwrap_or(ROOT);
            if parent == ROOT {
                tracing::debug!("Final state '{}' reached", node.id);
                self.running = false;
                self.finished = true;
                continue;
            }

            self.internal
                .push_back(format!("{}{}", DONE_STATE_PREFIX, chart.state(parent).id));
            if let Some(grandparent) = chart.state(parent).parent {
                if chart.state(grandparent).is_parallel()
                    && chart
                        .child_states(grandparent)
                        .all(|c| self.is_in_final_state(c))
                {
                    self.internal.push_back(format!(
                        "{}{}",
                        DONE_STATE_PREFIX,
                        chart.state(grandparent).id
                    ));
                }
            }
        }
    }

    fn is_in_final_state(&self, state: StateIdx) -> bool {
        let node = self.chart.state(state);
        if node.is_compound() {
            self.chart
                .child_states(state)
                .any(|c| self.chart.state(c).is_final() && self.configuration.contains(&c))
        } else if node.is_parallel() {
            self.chart
                .child_states(state)
                .all(|c| self.is_in_final_state(c))
        } else {
            false
        }
    }

    fn execute(&mut self, actions: &[Executable]) {
        for action in actions {
            match action {
                Executable::Raise { event } => self.internal.push_back(event.clone()),
                Executable::Send { event, delay, id } => {
                    let delay = match delay.as_deref() {
                        None => Duration::ZERO,
                        Some(text) => match parse_delay(text) {
                            Some(delay) => delay,
                            None => {
                                tracing::warn!("Invalid delay '{}' for event '{}'", text, event);
                                self.internal.push_back(ERROR_EXECUTION.to_string());
                                return;
                            }
                        },
                    };
                    self.delayed.push(DelayedEvent {
                        event: event.clone(),
                        send_id: id.clone(),
                        due: Instant::now() + delay,
                    });
                }
                Executable::Cancel { send_id } => {
                    self.delayed
                        .retain(|d| d.send_id.as_deref() != Some(send_id.as_str()));
                }
                Executable::Log { label, expr } => {
                    let value = match expr.as_deref() {
                        None => String::new(),
                        Some(e) => match self.evaluate_value(e) {
                            Some(value) => value.to_string(),
                            None => {
                                self.internal.push_back(ERROR_EXECUTION.to_string());
                                return;
                            }
                        },
                    };
                    tracing::info!("[{}] {}", label.as_deref().unwrap_or("log"), value);
                }
                Executable::Assign { location, expr } => {
                    if !self.variables.contains_key(location) {
                        tracing::warn!("Assignment to undeclared location '{}'", location);
                        self.internal.push_back(ERROR_EXECUTION.to_string());
                        return;
                    }
                    match self.evaluate_value(expr) {
                        Some(value) => {
                            self.variables.insert(location.clone(), value);
                        }
                        None => {
                            self.internal.push_back(ERROR_EXECUTION.to_string());
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Value of an `<assign>`/`<log>` expression: a variable, a literal or
    /// a chain of `+`/`-` over those. `None` when the expression cannot be
    /// evaluated.
    fn evaluate_value(&self, expr: &str) -> Option<Value> {
        let expr = expr.trim();
        let quoted = expr.len() >= 2
            && (expr.starts_with('\'') || expr.starts_with('"'))
            && expr[1..].find(&expr[..1]) == Some(expr.len() - 2);
        if !quoted {
            for op in [" + ", " - "] {
                if let Some((left, right)) = expr.rsplit_once(op) {
                    let left = self.evaluate_value(left)?;
                    let right = self.evaluate_value(right)?;
                    return arithmetic(&left, op.trim(), &right);
                }
            }
        }
        Some(self.variable(expr).unwrap_or_else(|| parse_literal(expr)))
    }
}

fn arithmetic(left: &Value, op: &str, right: &Value) -> Option<Value> {
    if let (Some(a), Some(b)) = (left.as_i64(), right.as_i64()) {
        let result = if op == "+" { a.checked_add(b) } else { a.checked_sub(b) };
        if result.is_none() {
            tracing::warn!("Integer overflow evaluating {} {} {}", left, op, right);
        }
        return result.map(Value::from);
    }
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return Some(Value::from(if op == "+" { a + b } else { a - b }));
    }
    if op == "+" {
        let text = |v: &Value| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Some(Value::String(format!("{}{}", text(left), text(right))));
    }
    tracing::warn!("Cannot subtract {} from {}", right, left);
    None
}

impl ConditionContext for Interpreter {
    fn is_active(&self, state_id: &str) -> bool {
        self.chart
            .index_of(state_id)
            .is_some_and(|idx| self.configuration.contains(&idx))
    }

    fn variable(&self, name: &str) -> Option<Value> {
        match name {
            "_event" | "_event.name" => self.current_event.clone().map(Value::String),
            _ => self.variables.get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scxml::parse_str;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        log: Vec<String>,
    }

    impl InterpreterHooks for Recorder {
        fn on_entry(&mut self, chart: &StateChart, state: StateIdx) {
            self.log.push(format!("+{}", chart.state(state).id));
        }

        fn on_exit(&mut self, chart: &StateChart, state: StateIdx) {
            self.log.push(format!("-{}", chart.state(state).id));
        }
    }

    fn started(xml: &str) -> Interpreter {
        let mut interpreter = Interpreter::new(Arc::new(parse_str(xml).unwrap()));
        interpreter.start(&mut ());
        interpreter
    }

    fn fire(interpreter: &mut Interpreter, event: &str) -> bool {
        interpreter.process_event(event, &mut ())
    }

    #[test]
    fn simple_transitions_until_final() {
        let mut sm = started(
            r#"<scxml initial="A">
                 <state id="A"><transition event="go" target="B"/></state>
                 <state id="B"><transition event="done" target="End"/></state>
                 <final id="End"/>
               </scxml>"#,
        );
        assert_eq!(sm.current_states(), vec!["A"]);
        assert!(fire(&mut sm, "go"));
        assert!(!fire(&mut sm, "unknown"));
        assert_eq!(sm.current_states(), vec!["B"]);
        assert!(fire(&mut sm, "done"));

        assert_eq!(sm.current_states(), vec!["End"]);
        assert!(sm.is_finished());
        assert!(!sm.is_running());
        assert!(!fire(&mut sm, "go"));
        assert_eq!(sm.visits().get("A"), Some(&1));
    }

    #[test]
    fn compound_completion_raises_done_event() {
        let mut sm = started(
            r#"<scxml initial="Task">
                 <state id="Task" initial="Step1">
                   <state id="Step1"><transition event="next" target="Step2"/></state>
                   <final id="Step2"/>
                   <transition event="done.state.Task" target="Finished"/>
                 </state>
                 <final id="Finished"/>
               </scxml>"#,
        );
        assert_eq!(sm.active_states(), vec!["Task", "Step1"]);
        fire(&mut sm, "next");
        assert_eq!(sm.current_states(), vec!["Finished"]);
        assert!(sm.is_finished());
    }

    const PARALLEL: &str = r#"<scxml initial="P">
         <parallel id="P">
           <state id="R1" initial="a1">
             <state id="a1"><transition event="e1" target="a2"/><transition event="e" target="Out"/></state>
             <final id="a2"/>
           </state>
           <state id="R2" initial="b1">
             <state id="b1"><transition event="e2" target="b2"/><transition event="e" target="b2"/></state>
             <final id="b2"/>
           </state>
           <transition event="done.state.P" target="Out"/>
         </parallel>
         <state id="Out"/>
       </scxml>"#;

    #[test]
    fn parallel_regions_complete_together() {
        let mut sm = started(PARALLEL);
        assert_eq!(sm.current_states(), vec!["a1", "b1"]);
        fire(&mut sm, "e1");
        assert_eq!(sm.current_states(), vec!["a2", "b1"]);
        fire(&mut sm, "e2");
        assert_eq!(sm.current_states(), vec!["Out"]);
    }

    #[test]
    fn conflicting_transitions_keep_document_order() {
        let mut sm = started(PARALLEL);
        fire(&mut sm, "e");
        assert_eq!(sm.current_states(), vec!["Out"]);
    }

    #[test]
    fn shallow_and_deep_history() {
        let mut sm = started(
            r#"<scxml initial="Work">
                 <state id="Work" initial="Inner">
                   <history id="HD" type="deep"/>
                   <history id="HS" type="shallow"/>
                   <state id="Inner" initial="I1">
                     <state id="I1"><transition event="next" target="I2"/></state>
                     <state id="I2"/>
                   </state>
                   <transition event="pause" target="Paused"/>
                 </state>
                 <state id="Paused">
                   <transition event="deep" target="HD"/>
                   <transition event="shallow" target="HS"/>
                 </state>
               </scxml>"#,
        );
        fire(&mut sm, "next");
        fire(&mut sm, "pause");
        assert_eq!(sm.current_states(), vec!["Paused"]);
        fire(&mut sm, "shallow");
        assert_eq!(sm.current_states(), vec!["I1"]);

        fire(&mut sm, "next");
        fire(&mut sm, "pause");
        fire(&mut sm, "deep");
        assert_eq!(sm.current_states(), vec!["I2"]);
    }

    #[test]
    fn history_default_transition_when_nothing_recorded() {
        let mut sm = started(
            r#"<scxml initial="Idle">
                 <state id="Idle"><transition event="go" target="H"/></state>
                 <state id="Work">
                   <history id="H"><transition target="W2"/></history>
                   <state id="W1"/>
                   <state id="W2"/>
                 </state>
               </scxml>"#,
        );
        fire(&mut sm, "go");
        assert_eq!(sm.current_states(), vec!["W2"]);
    }

    #[test]
    fn eventless_transitions_with_assign_and_guards() {
        let sm = started(
            r#"<scxml initial="Loop">
                 <datamodel><data id="count" expr="0"/></datamodel>
                 <state id="Loop">
                   <onentry><assign location="count" expr="count + 1"/></onentry>
                   <transition cond="count &lt; 3" target="Loop"/>
                   <transition cond="count &gt;= 3" target="Done"/>
                 </state>
                 <final id="Done"/>
               </scxml>"#,
        );
        assert_eq!(sm.current_states(), vec!["Done"]);
        assert_eq!(sm.variables().get("count"), Some(&json!(3)));
        assert_eq!(sm.visits().get("Loop"), Some(&3));
    }

    #[test]
    fn integer_overflow_in_assign_raises_error_execution() {
        let sm = started(
            r#"<scxml initial="A">
                 <datamodel><data id="n" expr="9223372036854775807"/></datamodel>
                 <state id="A">
                   <onentry><assign location="n" expr="n + 1"/></onentry>
                   <transition event="error.execution" target="Err"/>
                 </state>
                 <state id="Err"/>
               </scxml>"#,
        );
        assert!(sm.is_running());
        assert_eq!(sm.current_states(), vec!["Err"]);
        assert_eq!(sm.variables().get("n"), Some(&json!(i64::MAX)));
    }

    #[test]
    fn subtracting_text_raises_error_execution() {
        let sm = started(
            r#"<scxml initial="A">
                 <datamodel><data id="s" expr="'abc'"/></datamodel>
                 <state id="A">
                   <onentry><assign location="s" expr="s - 1"/></onentry>
                   <transition event="error.execution" target="Err"/>
                 </state>
                 <state id="Err"/>
               </scxml>"#,
        );
        assert_eq!(sm.current_states(), vec!["Err"]);
        assert_eq!(sm.variables().get("s"), Some(&json!("abc")));
    }

    #[test]
    fn runaway_eventless_loop_is_cut_off() {
        let chart = parse_str(
            r#"<scxml initial="Loop">
                 <state id="Loop" initial="A">
                   <transition event="halt" target="Done"/>
                   <state id="A"><transition target="B"/></state>
                   <state id="B"><transition target="A"/></state>
                 </state>
                 <final id="Done"/>
               </scxml>"#,
        )
        .unwrap();
        let mut sm = Interpreter::new(Arc::new(chart)).with_max_microsteps(10);
        sm.start(&mut ());

        assert!(sm.is_running());
        let entries = sm.visits().get("A").copied().unwrap_or(0)
            + sm.visits().get("B").copied().unwrap_or(0);
        assert!(entries <= 11, "{} entries", entries);

        assert!(fire(&mut sm, "halt"));
        assert!(sm.is_finished());
        assert_eq!(sm.current_states(), vec!["Done"]);
    }

    #[test]
    fn raised_events_are_processed_in_order() {
        let sm = started(
            r#"<scxml initial="S1">
                 <state id="S1">
                   <onentry><raise event="a"/><raise event="b"/></onentry>
                   <transition event="a" target="S2"/>
                 </state>
                 <state id="S2"><transition event="b" target="S3"/></state>
                 <state id="S3"/>
               </scxml>"#,
        );
        assert_eq!(sm.current_states(), vec!["S3"]);
    }

    #[test]
    fn internal_transitions_do_not_reenter_source() {
        let mut sm = started(
            r#"<scxml initial="Outer">
                 <state id="Outer" initial="In1">
                   <state id="In1"/>
                   <state id="In2"/>
                   <transition event="int" type="internal" target="In2"/>
                   <transition event="ext" target="In1"/>
                 </state>
               </scxml>"#,
        );
        fire(&mut sm, "int");
        assert_eq!(sm.current_states(), vec!["In2"]);
        assert_eq!(sm.visits().get("Outer"), Some(&1));
        fire(&mut sm, "ext");
        assert_eq!(sm.current_states(), vec!["In1"]);
        assert_eq!(sm.visits().get("Outer"), Some(&2));
    }

    #[test]
    fn delayed_send_and_cancel() {
        let mut sm = started(
            r#"<scxml initial="Waiting">
                 <state id="Waiting">
                   <onentry><send event="timeout" delay="1s" id="t"/><send event="now"/></onentry>
                   <transition event="abort"><cancel sendid="t"/></transition>
                 </state>
               </scxml>"#,
        );
        assert_eq!(sm.take_due_events(Instant::now()), vec!["now"]);
        assert_eq!(sm.pending_delayed(), 1);
        assert!(sm.next_delayed_due().is_some());

        let later = Instant::now() + Duration::from_secs(2);
        let mut other = started(
            r#"<scxml initial="W"><state id="W"><onentry><send event="timeout" delay="1s"/></onentry></state></scxml>"#,
        );
        assert_eq!(other.take_due_events(later), vec!["timeout"]);

        fire(&mut sm, "abort");
        assert_eq!(sm.pending_delayed(), 0);
        assert_eq!(sm.current_states(), vec!["Waiting"]);
    }

    #[test]
    fn bad_delay_raises_error_execution() {
        let sm = started(
            r#"<scxml initial="A">
                 <state id="A">
                   <onentry><send event="x" delay="soon"/></onentry>
                   <transition event="error.execution" target="Err"/>
                 </state>
                 <state id="Err"/>
               </scxml>"#,
        );
        assert_eq!(sm.current_states(), vec!["Err"]);
        assert_eq!(sm.pending_delayed(), 0);
    }

    #[test]
    fn hooks_follow_entry_and_exit_order() {
        let chart = Arc::new(
            parse_str(
                r#"<scxml initial="Outer">
                     <state id="Outer"><state id="Inner"/></state>
                   </scxml>"#,
            )
            .unwrap(),
        );
        let mut hooks = Recorder::default();
        let mut sm = Interpreter::new(chart);
        sm.start(&mut hooks);
        sm.stop(&mut hooks);

        assert_eq!(hooks.log, vec!["+Outer", "+Inner", "-Inner", "-Outer"]);
        assert!(sm.current_states().is_empty());
        assert!(!sm.is_running());
        assert!(!sm.is_finished());
    }

    #[test]
    fn delay_formats() {
        assert_eq!(parse_delay("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_delay("2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_delay("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_delay("250"), Some(Duration::from_millis(250)));
        assert_eq!(parse_delay("soon"), None);
        assert_eq!(parse_delay("-1s"), None);
    }
}
