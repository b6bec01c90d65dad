use crate::config::ControllerConfig;
use crate::core::{SkillBindings, SkillConfigurator, SkillEnvironment, SkillRegistry};
use crate::engine::interpreter::{Interpreter, InterpreterHooks};
use crate::engine::runner::{PauseGate, RunnerSpec, SkillRunner};
use crate::error::{BonsaiError, BonsaiResult};
use crate::scxml::{StateChart, StateIdx};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Input of the control thread.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ControlMessage {
    Event(String),
    SkillExit {
        state: StateIdx,
        generation: u64,
        event: String,
    },
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachinePhase {
    Idle,
    Running,
    Paused,
    /// A top-level final state was entered
    Finished,
    Stopped,
}

impl MachinePhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// State published by the control thread after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub phase: MachinePhase,
    pub current_states: Vec<String>,
    pub active_states: Vec<String>,
    pub visits: BTreeMap<String, u64>,
    pub events_processed: u64,
}

impl Default for MachineSnapshot {
    fn default() -> Self {
        Self {
            phase: MachinePhase::Idle,
            current_states: Vec::new(),
            active_states: Vec::new(),
            visits: BTreeMap::new(),
            events_processed: 0,
        }
    }
}

/// Starts a skill runner on every entry of a bound state and cancels it on exit.
struct SkillSupervisor {
    bindings: Arc<SkillBindings>,
    registry: SkillRegistry,
    env: SkillEnvironment,
    gate: PauseGate,
    sender: Sender<ControlMessage>,
    loop_delay: Duration,
    next_generation: u64,
    generations: HashMap<StateIdx, u64>,
    active: HashMap<StateIdx, SkillRunner>,
    retired: Vec<SkillRunner>,
}

impl SkillSupervisor {
    fn is_current(&self, state: StateIdx, generation: u64) -> bool {
        self.generations.get(&state) == Some(&generation)
    }

    fn finished(&mut self, state: StateIdx) {
        self.generations.remove(&state);
        if let Some(runner) = self.active.remove(&state) {
            self.retired.push(runner);
        }
    }

    fn shutdown(&mut self, deadline: Instant) {
        let runners = self.active.drain().map(|(_, r)| r);
        self.retired.extend(runners);
        self.generations.clear();
        for runner in &self.retired {
            runner.cancel();
        }
        for runner in &mut self.retired {
            runner.join_until(deadline);
        }
        self.retired.clear();
    }
}

impl InterpreterHooks for SkillSupervisor {
    fn on_entry(&mut self, _chart: &StateChart, state: StateIdx) {
        let Some(binding) = self.bindings.get(&state) else {
            return;
        };
        self.next_generation += 1;
        let generation = self.next_generation;
        self.generations.insert(state, generation);

        let spec = RunnerSpec {
            state,
            state_id: binding.state_id.clone(),
            generation,
            simple_name: binding.simple_name().to_string(),
            loop_delay: self.loop_delay,
        };
        let started = self.registry.create(&binding.class).and_then(|skill| {
            let configurator =
                SkillConfigurator::new(&binding.state_id, binding.params.clone(), self.env.clone());
            SkillRunner::spawn(
                skill,
                configurator,
                spec.clone(),
                self.gate.clone(),
                self.sender.clone(),
            )
        });

        match started {
            Ok(runner) => {
                self.active.insert(state, runner);
            }
            Err(e) => {
                tracing::error!("Cannot start skill for state '{}': {}", binding.state_id, e);
                let _ = self.sender.send(ControlMessage::SkillExit {
                    state,
                    generation,
                    event: format!("{}.fatal", spec.simple_name),
                });
            }
        }
    }

    fn on_exit(&mut self, _chart: &StateChart, state: StateIdx) {
        self.generations.remove(&state);
        if let Some(runner) = self.active.remove(&state) {
            runner.cancel();
            self.retired.push(runner);
        }
        self.retired.retain(|r| !r.is_finished());
    }
}

struct ControlLoop {
    interpreter: Interpreter,
    supervisor: SkillSupervisor,
    receiver: Receiver<ControlMessage>,
    shared: Arc<RwLock<MachineSnapshot>>,
    gate: PauseGate,
    paused: bool,
    held: VecDeque<String>,
    events_processed: u64,
    stop_timeout: Duration,
}

impl ControlLoop {
    fn run(mut self) {
        tracing::info!("State machine started");
        self.interpreter.start(&mut self.supervisor);
        self.publish();

        while self.interpreter.is_running() {
            let message = match self.wait_timeout() {
                Some(timeout) => match self.receiver.recv_timeout(timeout) {
                    Ok(message) => Some(message),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.receiver.recv() {
                    Ok(message) => Some(message),
                    Err(_) => break,
                },
            };

            match message {
                None => {}
                Some(ControlMessage::Event(event)) => self.external(event),
                Some(ControlMessage::SkillExit {
                    state,
                    generation,
                    event,
                }) => {
                    if self.supervisor.is_current(state, generation) {
                        self.supervisor.finished(state);
                        self.external(event);
                    } else {
                        tracing::debug!("Dropping stale skill exit '{}'", event);
                    }
                }
                Some(ControlMessage::Pause) => {
                    self.paused = true;
                    self.gate.pause();
                }
                Some(ControlMessage::Resume) => {
                    self.paused = false;
                    self.gate.resume();
                    while let Some(event) = self.held.pop_front() {
                        self.dispatch(&event);
                    }
                }
                Some(ControlMessage::Stop) => break,
            }

            if !self.paused {
                for event in self.interpreter.take_due_events(Instant::now()) {
                    self.dispatch(&event);
                }
            }
            self.publish();
        }

        let deadline = Instant::now() + self.stop_timeout;
        if self.interpreter.is_finished() {
            tracing::info!(
                "State machine finished in {:?}",
                self.interpreter.current_states()
            );
            self.supervisor.shutdown(deadline);
        } else {
            self.interpreter.stop(&mut self.supervisor);
            self.supervisor.shutdown(deadline);
            tracing::info!("State machine stopped");
        }
        self.gate.resume();
        self.publish();
    }

    /// Time until the next delayed event; `None` blocks indefinitely.
    fn wait_timeout(&self) -> Option<Duration> {
        if self.paused {
            return None;
        }
        self.interpreter
            .next_delayed_due()
            .map(|due| due.saturating_duration_since(Instant::now()))
    }

    fn external(&mut self, event: String) {
        if self.paused {
            tracing::debug!("Holding '{}' until resumed", event);
            self.held.push_back(event);
        } else {
            self.dispatch(&event);
        }
    }

    fn dispatch(&mut self, event: &str) {
        if !self.interpreter.is_running() {
            return;
        }
        self.events_processed += 1;
        if self.interpreter.process_event(event, &mut self.supervisor) {
            tracing::debug!("'{}' -> {:?}", event, self.interpreter.current_states());
        } else {
            tracing::debug!("Event '{}' matched no transition", event);
        }
    }

    fn publish(&self) {
        let phase = if self.interpreter.is_finished() {
            MachinePhase::Finished
        } else if !self.interpreter.is_running() {
            MachinePhase::Stopped
        } else if self.paused {
            MachinePhase::Paused
        } else {
            MachinePhase::Running
        };
        let mut shared = self.shared.write();
        shared.phase = phase;
        shared.current_states = self.interpreter.current_states();
        shared.active_states = self.interpreter.active_states();
        shared.visits = self.interpreter.visits().clone();
        shared.events_processed = self.events_processed;
    }
}

/// A statechart whose skill states run skills on their own threads.
///
/// All interpretation happens on one control thread fed by a channel;
/// queries read the snapshot it publishes after every step.
pub struct SkillStateMachine {
    chart: Arc<StateChart>,
    bindings: Arc<SkillBindings>,
    registry: SkillRegistry,
    env: SkillEnvironment,
    config: ControllerConfig,
    gate: PauseGate,
    shared: Arc<RwLock<MachineSnapshot>>,
    sender: Mutex<Option<Sender<ControlMessage>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SkillStateMachine {
    pub fn new(
        chart: Arc<StateChart>,
        bindings: SkillBindings,
        registry: SkillRegistry,
        env: SkillEnvironment,
        config: ControllerConfig,
    ) -> Self {
        Self {
            chart,
            bindings: Arc::new(bindings),
            registry,
            env,
            config,
            gate: PauseGate::new(),
            shared: Arc::new(RwLock::new(MachineSnapshot::default())),
            sender: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn chart(&self) -> &Arc<StateChart> {
        &self.chart
    }

    pub fn bindings(&self) -> &SkillBindings {
        &self.bindings
    }

    /// Spawn the control thread and enter the initial configuration.
    pub fn start(&self) -> BonsaiResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(BonsaiError::InvalidState(
                "state machine was already started".to_string(),
            ));
        }

        let (sender, receiver) = channel::unbounded();
        let control = ControlLoop {
            interpreter: Interpreter::new(Arc::clone(&self.chart))
                .with_max_microsteps(self.config.max_microsteps),
            supervisor: SkillSupervisor {
                bindings: Arc::clone(&self.bindings),
                registry: self.registry.clone(),
                env: self.env.clone(),
                gate: self.gate.clone(),
                sender: sender.clone(),
                loop_delay: self.config.skill_loop_delay(),
                next_generation: 0,
                generations: HashMap::new(),
                active: HashMap::new(),
                retired: Vec::new(),
            },
            receiver,
            shared: Arc::clone(&self.shared),
            gate: self.gate.clone(),
            paused: false,
            held: VecDeque::new(),
            events_processed: 0,
            stop_timeout: self.config.stop_timeout(),
        };

        self.shared.write().phase = MachinePhase::Running;
        let spawned = thread::Builder::new()
            .name("bonsai-state-machine".to_string())
            .spawn(move || control.run());
        match spawned {
            Ok(h) => {
                *handle = Some(h);
                *self.sender.lock() = Some(sender);
                Ok(())
            }
            Err(e) => {
                self.shared.write().phase = MachinePhase::Idle;
                Err(e.into())
            }
        }
    }

    fn send(&self, message: ControlMessage) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Queue an external event. Returns `false` if the machine is not running.
    pub fn fire_event(&self, event: &str) -> bool {
        if !self.is_running() || !self.send(ControlMessage::Event(event.to_string())) {
            tracing::warn!("Ignoring event '{}': state machine is not running", event);
            return false;
        }
        true
    }

    pub fn pause(&self) -> BonsaiResult<()> {
        if !self.is_running() {
            return Err(BonsaiError::InvalidState(
                "cannot pause a machine that is not running".to_string(),
            ));
        }
        self.gate.pause();
        self.send(ControlMessage::Pause);
        let mut shared = self.shared.write();
        if shared.phase == MachinePhase::Running {
            shared.phase = MachinePhase::Paused;
        }
        Ok(())
    }

    pub fn resume(&self) -> BonsaiResult<()> {
        if !self.is_running() {
            return Err(BonsaiError::InvalidState(
                "cannot resume a machine that is not running".to_string(),
            ));
        }
        self.send(ControlMessage::Resume);
        self.gate.resume();
        let mut shared = self.shared.write();
        if shared.phase == MachinePhase::Paused {
            shared.phase = MachinePhase::Running;
        }
        Ok(())
    }

    /// Cancel all skills, exit the active states and join the control thread.
    pub fn stop(&self) -> BonsaiResult<()> {
        self.send(ControlMessage::Stop);
        self.sender.lock().take();

        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };
        let deadline = Instant::now() + self.config.stop_timeout() * 2;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                return Err(BonsaiError::Timeout(format!(
                    "state machine did not stop within {:?}",
                    self.config.stop_timeout()
                )));
            }
            thread::sleep(Duration::from_millis(2));
        }
        handle
            .join()
            .map_err(|_| BonsaiError::internal("state machine thread panicked"))
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        self.shared.read().clone()
    }

    pub fn status(&self) -> MachinePhase {
        self.shared.read().phase
    }

    /// Started and neither finished nor stopped (a paused machine is running)
    pub fn is_running(&self) -> bool {
        self.status().is_active()
    }

    pub fn is_paused(&self) -> bool {
        self.status() == MachinePhase::Paused
    }

    pub fn is_finished(&self) -> bool {
        self.status() == MachinePhase::Finished
    }

    pub fn current_states(&self) -> Vec<String> {
        self.shared.read().current_states.clone()
    }

    pub fn active_states(&self) -> Vec<String> {
        self.shared.read().active_states.clone()
    }

    pub fn state_visits(&self) -> BTreeMap<String, u64> {
        self.shared.read().visits.clone()
    }
}

impl Drop for SkillStateMachine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Dropping state machine: {}", e);
        }
    }
}

impl std::fmt::Debug for SkillStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillStateMachine")
            .field("name", &self.chart.name)
            .field("status", &self.status())
            .field("skills", &self.bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{skill_class_of, SkillBinding};
    use crate::scxml::parse_str;

    fn machine(xml: &str) -> SkillStateMachine {
        let chart = parse_str(xml).unwrap();
        let mut bindings = SkillBindings::new();
        for (idx, state) in chart.states.iter().enumerate().skip(1) {
            if let Some(class) = skill_class_of(&state.id) {
                bindings.insert(
                    idx,
                    SkillBinding {
                        state_id: state.id.clone(),
                        class: class.to_string(),
                        params: state
                            .datamodel
                            .iter()
                            .filter(|d| d.is_config())
                            .map(|d| (d.config_key().to_string(), d.value.clone()))
                            .collect(),
                        requested_tokens: Vec::new(),
                    },
                );
            }
        }
        SkillStateMachine::new(
            Arc::new(chart),
            bindings,
            SkillRegistry::with_builtins(),
            SkillEnvironment {
                default_slots: true,
                ..Default::default()
            },
            ControllerConfig::testing(),
        )
    }

    fn wait_for(sm: &SkillStateMachine, mut done: impl FnMut(&SkillStateMachine) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if done(sm) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn skills_drive_transitions_to_final() {
        let sm = machine(
            r##"<scxml initial="Noop#first">
                 <state id="Noop#first"><transition event="Noop.success" target="Wait#pause"/></state>
                 <state id="Wait#pause">
                   <datamodel><data id="#_TIMEOUT" expr="20"/></datamodel>
                   <transition event="Wait.success" target="Done"/>
                 </state>
                 <final id="Done"/>
               </scxml>"##,
        );
        assert_eq!(sm.status(), MachinePhase::Idle);
        sm.start().unwrap();
        assert!(sm.start().is_err());

        assert!(wait_for(&sm, |m| m.is_finished()));
        assert_eq!(sm.current_states(), vec!["Done"]);
        assert_eq!(sm.state_visits().get("Wait#pause"), Some(&1));
        assert!(!sm.fire_event("late"));
        sm.stop().unwrap();
    }

    #[test]
    fn external_events_and_stop() {
        let sm = machine(
            r#"<scxml initial="Idle">
                 <state id="Idle"><transition event="go" target="Busy"/></state>
                 <state id="Busy"/>
               </scxml>"#,
        );
        assert!(!sm.fire_event("go"));
        sm.start().unwrap();
        assert!(wait_for(&sm, |m| m.current_states() == vec!["Idle"]));
        assert!(sm.fire_event("go"));
        assert!(wait_for(&sm, |m| m.current_states() == vec!["Busy"]));

        sm.stop().unwrap();
        assert_eq!(sm.status(), MachinePhase::Stopped);
        assert!(sm.current_states().is_empty());
    }

    #[test]
    fn events_fired_while_paused_are_held() {
        let sm = machine(
            r#"<scxml initial="A">
                 <state id="A"><transition event="next" target="B"/></state>
                 <state id="B"/>
               </scxml>"#,
        );
        sm.start().unwrap();
        assert!(wait_for(&sm, |m| m.current_states() == vec!["A"]));
        sm.pause().unwrap();
        assert!(sm.is_paused());
        assert!(sm.fire_event("next"));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(sm.current_states(), vec!["A"]);

        sm.resume().unwrap();
        assert!(wait_for(&sm, |m| m.current_states() == vec!["B"]));
        sm.stop().unwrap();
    }

    #[test]
    fn delayed_events_are_delivered() {
        let sm = machine(
            r#"<scxml initial="A">
                 <state id="A">
                   <onentry><send event="tick" delay="30ms"/></onentry>
                   <transition event="tick" target="B"/>
                 </state>
                 <final id="B"/>
               </scxml>"#,
        );
        sm.start().unwrap();
        assert!(wait_for(&sm, |m| m.is_finished()));
    }

    #[test]
    fn exiting_a_skill_state_cancels_the_skill() {
        let sm = machine(
            r##"<scxml initial="Wait#long">
                 <state id="Wait#long">
                   <datamodel><data id="#_TIMEOUT" expr="60000"/></datamodel>
                   <transition event="skip" target="Noop#after"/>
                   <transition event="Wait.success" target="Bad"/>
                 </state>
                 <state id="Noop#after"><transition event="Noop.success" target="Done"/></state>
                 <state id="Bad"/>
                 <final id="Done"/>
               </scxml>"##,
        );
        sm.start().unwrap();
        assert!(wait_for(&sm, |m| m.current_states() == vec!["Wait#long"]));
        sm.fire_event("skip");
        assert!(wait_for(&sm, |m| m.is_finished()));
        assert_eq!(sm.current_states(), vec!["Done"]);
        assert_eq!(sm.state_visits().get("Bad"), None);
    }

    #[test]
    fn unknown_skill_class_fires_fatal() {
        let sm = machine(
            r#"<scxml initial="Ghost#g">
                 <state id="Ghost#g"><transition event="Ghost.fatal" target="Done"/></state>
                 <final id="Done"/>
               </scxml>"#,
        );
        sm.start().unwrap();
        assert!(wait_for(&sm, |m| m.is_finished()));
    }
}
