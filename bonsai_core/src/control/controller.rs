use crate::communication::{CoreObjects, Hub};
use crate::config::{BonsaiConfig, ControllerConfig};
use crate::control::loader::{load_behavior, BehaviorSource, LoadingResults};
use crate::control::publisher::{SnapshotSource, StateChangeListener, StatePublisher, StateSnapshot};
use crate::core::{SkillEnvironment, SkillRegistry};
use crate::engine::{MachinePhase, SkillStateMachine};
use crate::error::{BonsaiError, BonsaiResult};
use crate::memory::WorkingMemory;
use crate::scxml::{ParseOptions, TransitionType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const WAIT_POLL: Duration = Duration::from_millis(5);

/// Summary of the controller, as reported locally and over the remote protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub loaded: bool,
    pub running: bool,
    pub paused: bool,
    pub finished: bool,
    pub current_states: Vec<String>,
    /// Source of the loaded behavior (`<inline>` for documents passed as text)
    pub behavior: Option<String>,
    /// Changes on every successful load
    pub behavior_id: Option<Uuid>,
}

/// An outgoing transition of a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionInfo {
    pub events: Vec<String>,
    pub targets: Vec<String>,
    pub cond: Option<String>,
    pub internal: bool,
}

struct Active {
    id: Uuid,
    source: String,
    machine: Arc<SkillStateMachine>,
}

/// Owns the single loaded behavior and drives its lifecycle.
///
/// All methods take `&self`; wrap the controller in an `Arc` to share it
/// between threads.
pub struct StateMachineController {
    config: ControllerConfig,
    parse_options: ParseOptions,
    registry: SkillRegistry,
    env: SkillEnvironment,
    active: Arc<RwLock<Option<Active>>>,
    publisher: StatePublisher,
}

impl StateMachineController {
    pub fn new(
        config: ControllerConfig,
        registry: SkillRegistry,
        objects: CoreObjects,
        memory: WorkingMemory,
    ) -> BonsaiResult<Self> {
        config.validate()?;

        let active: Arc<RwLock<Option<Active>>> = Arc::new(RwLock::new(None));
        let polled = Arc::clone(&active);
        let source: SnapshotSource =
            Arc::new(move || polled.read().as_ref().map(|a| a.machine.snapshot()));
        let publisher = StatePublisher::spawn(source, config.publisher_interval())?;

        Ok(Self {
            config,
            parse_options: ParseOptions::default(),
            registry,
            env: SkillEnvironment {
                objects,
                memory,
                ..Default::default()
            },
            active,
            publisher,
        })
    }

    /// Controller configured from a [`BonsaiConfig`], include mappings included.
    pub fn from_config(
        config: &BonsaiConfig,
        registry: SkillRegistry,
        objects: CoreObjects,
        memory: WorkingMemory,
    ) -> BonsaiResult<Self> {
        Ok(Self::new(config.controller.clone(), registry, objects, memory)?
            .with_parse_options(config.parse_options()))
    }

    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse_options = options;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.env.memory
    }

    pub fn objects(&self) -> &CoreObjects {
        &self.env.objects
    }

    fn machine(&self) -> BonsaiResult<Arc<SkillStateMachine>> {
        self.active
            .read()
            .as_ref()
            .map(|a| Arc::clone(&a.machine))
            .ok_or(BonsaiError::NotLoaded)
    }

    /// Load a behavior from a file path or an inline SCXML document.
    ///
    /// On success the new behavior replaces the loaded one, which is stopped
    /// first. On failure the loaded behavior is kept untouched.
    pub fn load(&self, source: &str) -> LoadingResults {
        let source = BehaviorSource::detect(source);
        let (mut results, behavior) = load_behavior(
            &source,
            &self.config,
            &self.registry,
            &self.env,
            &self.parse_options,
        );
        let Some(behavior) = behavior else {
            return results;
        };

        let machine = Arc::new(SkillStateMachine::new(
            behavior.chart,
            behavior.bindings,
            self.registry.clone(),
            behavior.env,
            self.config.clone(),
        ));
        let next = Active {
            id: Uuid::new_v4(),
            source: source.describe(),
            machine,
        };

        let previous = self.active.write().replace(next);
        if let Some(previous) = previous {
            tracing::info!("Replacing behavior '{}'", previous.source);
            if let Err(e) = previous.machine.stop() {
                results.warn(format!("Previous behavior did not stop cleanly: {}", e));
            }
        }
        results
    }

    pub fn is_loaded(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn start(&self) -> BonsaiResult<()> {
        let machine = self.machine()?;
        match machine.status() {
            MachinePhase::Idle => machine.start(),
            phase => Err(BonsaiError::InvalidState(format!(
                "cannot start a behavior that is {:?}; load it again to restart",
                phase
            ))),
        }
    }

    pub fn stop(&self) -> BonsaiResult<()> {
        let machine = self.machine()?;
        if !machine.is_running() {
            return Err(BonsaiError::InvalidState(
                "behavior is not running".to_string(),
            ));
        }
        machine.stop()
    }

    pub fn pause(&self) -> BonsaiResult<()> {
        let machine = self.machine()?;
        if machine.is_paused() {
            return Err(BonsaiError::InvalidState("behavior is already paused".to_string()));
        }
        machine.pause()
    }

    pub fn resume(&self) -> BonsaiResult<()> {
        let machine = self.machine()?;
        if !machine.is_paused() {
            return Err(BonsaiError::InvalidState("behavior is not paused".to_string()));
        }
        machine.resume()
    }

    /// Queue an external event. `false` when no behavior is running.
    pub fn fire_event(&self, event: &str) -> bool {
        match self.machine() {
            Ok(machine) => machine.fire_event(event),
            Err(_) => {
                tracing::warn!("Ignoring event '{}': no behavior loaded", event);
                false
            }
        }
    }

    /// Active atomic states in document order; empty when nothing runs.
    pub fn current_states(&self) -> Vec<String> {
        self.machine()
            .map(|m| m.current_states())
            .unwrap_or_default()
    }

    /// All state ids of the loaded behavior in document order.
    pub fn state_ids(&self) -> BonsaiResult<Vec<String>> {
        Ok(self.machine()?.chart().state_ids())
    }

    /// Outgoing transitions of `state`, in document order.
    pub fn transitions(&self, state: &str) -> BonsaiResult<Vec<TransitionInfo>> {
        let machine = self.machine()?;
        let chart = machine.chart();
        let idx = chart
            .index_of(state)
            .ok_or_else(|| BonsaiError::StateId(state.to_string()))?;

        Ok(chart
            .state(idx)
            .transitions
            .iter()
            .map(|t| {
                let t = chart.transition(*t);
                TransitionInfo {
                    events: t.events.clone(),
                    targets: t.target_ids.clone(),
                    cond: t.cond.as_ref().map(|c| c.source().to_string()),
                    internal: t.kind == TransitionType::Internal,
                }
            })
            .collect())
    }

    pub fn status(&self) -> ControllerStatus {
        let active = self.active.read();
        let Some(active) = active.as_ref() else {
            return ControllerStatus::default();
        };
        let snapshot = active.machine.snapshot();
        ControllerStatus {
            loaded: true,
            running: snapshot.phase.is_active(),
            paused: snapshot.phase == MachinePhase::Paused,
            finished: snapshot.phase == MachinePhase::Finished,
            current_states: snapshot.current_states,
            behavior: Some(active.source.clone()),
            behavior_id: Some(active.id),
        }
    }

    pub fn state_visits(&self) -> BonsaiResult<std::collections::BTreeMap<String, u64>> {
        Ok(self.machine()?.state_visits())
    }

    /// Poll until `state` is active. `false` on timeout.
    pub fn wait_for_state(&self, state: &str, timeout: Duration) -> bool {
        self.wait_until(timeout, || {
            self.machine()
                .map(|m| m.active_states().iter().any(|s| s == state))
                .unwrap_or(false)
        })
    }

    /// Poll until a top-level final state is reached. `false` on timeout.
    pub fn wait_until_finished(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, || {
            self.machine().map(|m| m.is_finished()).unwrap_or(false)
        })
    }

    fn wait_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(WAIT_POLL);
        }
    }

    pub fn add_listener(&self, listener: Box<dyn StateChangeListener>) {
        self.publisher.add_listener(listener);
    }

    /// Topic receiving a [`StateSnapshot`] on every state change.
    pub fn state_topic(&self) -> Hub<StateSnapshot> {
        self.publisher.hub().clone()
    }

    /// Stop the loaded behavior, if any, and forget it.
    pub fn unload(&self) -> BonsaiResult<()> {
        match self.active.write().take() {
            Some(active) => active.machine.stop(),
            None => Ok(()),
        }
    }
}

impl Drop for StateMachineController {
    fn drop(&mut self) {
        if let Err(e) = self.unload() {
            tracing::warn!("Stopping behavior on shutdown: {}", e);
        }
    }
}

impl std::fmt::Debug for StateMachineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachineController")
            .field("status", &self.status())
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}
