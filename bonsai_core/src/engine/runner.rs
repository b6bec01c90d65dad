use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator};
use crate::engine::machine::ControlMessage;
use crate::error::BonsaiResult;
use crate::scxml::StateIdx;
use crossbeam::channel::Sender;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PAUSE_POLL: Duration = Duration::from_millis(20);
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Shared pause switch; skill runners block on it before each `execute`.
#[derive(Clone, Default)]
pub struct PauseGate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        *self.inner.0.lock() = true;
    }

    pub fn resume(&self) {
        *self.inner.0.lock() = false;
        self.inner.1.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block while paused. Returns `false` if `cancel` was raised meanwhile.
    pub fn wait_while_paused(&self, cancel: &AtomicBool) -> bool {
        let (lock, cond) = &*self.inner;
        let mut paused = lock.lock();
        while *paused {
            if cancel.load(Ordering::Acquire) {
                return false;
            }
            cond.wait_for(&mut paused, PAUSE_POLL);
        }
        !cancel.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for PauseGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PauseGate")
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Identity of one skill activation.
#[derive(Debug, Clone)]
pub struct RunnerSpec {
    pub state: StateIdx,
    pub state_id: String,
    /// Incremented on every entry of a skill state; stale exits are dropped
    pub generation: u64,
    pub simple_name: String,
    pub loop_delay: Duration,
}

/// Thread running one skill through its lifecycle.
pub struct SkillRunner {
    spec: RunnerSpec,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SkillRunner {
    pub(crate) fn spawn(
        skill: Box<dyn Skill>,
        configurator: SkillConfigurator,
        spec: RunnerSpec,
        gate: PauseGate,
        sender: Sender<ControlMessage>,
    ) -> BonsaiResult<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        let thread_cancel = Arc::clone(&cancel);
        let thread_spec = spec.clone();

        let handle = thread::Builder::new()
            .name(format!("skill:{}", spec.state_id))
            .spawn(move || {
                run(skill, configurator, thread_spec, gate, thread_cancel, sender)
            })?;

        tracing::debug!(
            "Started skill '{}' for state '{}' (generation {})",
            spec.simple_name,
            spec.state_id,
            spec.generation
        );
        Ok(Self {
            spec,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn spec(&self) -> &RunnerSpec {
        &self.spec
    }

    /// Ask the skill to stop; it fires no event afterwards.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Join if the thread ends before `deadline`; otherwise leave it detached.
    pub fn join_until(&mut self, deadline: Instant) -> bool {
        while !self.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Skill in state '{}' did not stop in time; detaching",
                    self.spec.state_id
                );
                self.handle = None;
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        true
    }
}

impl std::fmt::Debug for SkillRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillRunner")
            .field("state", &self.spec.state_id)
            .field("generation", &self.spec.generation)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

fn sleep_unless_cancelled(delay: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// configure -> init -> execute* -> end. `None` when cancelled.
fn lifecycle(
    skill: &mut dyn Skill,
    configurator: &mut SkillConfigurator,
    spec: &RunnerSpec,
    gate: &PauseGate,
    cancel: &AtomicBool,
) -> Option<ExitToken> {
    if let Err(e) = skill.configure(configurator) {
        tracing::error!("Skill in state '{}' failed to configure: {}", spec.state_id, e);
        return Some(ExitToken::fatal());
    }
    configurator.finish();

    if !skill.init() {
        tracing::warn!("Skill in state '{}' failed to initialize", spec.state_id);
        return Some(ExitToken::fatal());
    }

    loop {
        if !gate.wait_while_paused(cancel) {
            return None;
        }
        let token = skill.execute();
        if token.is_loop() {
            let delay = token.loop_delay().unwrap_or(spec.loop_delay);
            if !sleep_unless_cancelled(delay, cancel) {
                return None;
            }
            continue;
        }
        if cancel.load(Ordering::Acquire) {
            return None;
        }
        return Some(skill.end(token));
    }
}

fn run(
    mut skill: Box<dyn Skill>,
    mut configurator: SkillConfigurator,
    spec: RunnerSpec,
    gate: PauseGate,
    cancel: Arc<AtomicBool>,
    sender: Sender<ControlMessage>,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        lifecycle(skill.as_mut(), &mut configurator, &spec, &gate, &cancel)
    }));

    let token = match outcome {
        Ok(Some(token)) => token,
        Ok(None) => {
            tracing::debug!("Skill in state '{}' cancelled", spec.state_id);
            return;
        }
        Err(_) => {
            tracing::error!("Skill in state '{}' panicked", spec.state_id);
            ExitToken::fatal()
        }
    };
    if cancel.load(Ordering::Acquire) {
        return;
    }

    if token.status() != ExitStatus::Fatal
        && !configurator
            .requested_tokens()
            .iter()
            .any(|t| t.same_outcome(&token))
    {
        tracing::warn!(
            "Skill in state '{}' ended with unrequested token '{}'",
            spec.state_id,
            token
        );
    }

    let event = token.event_name(&spec.simple_name);
    tracing::debug!("State '{}' exits with '{}'", spec.state_id, event);
    let message = ControlMessage::SkillExit {
        state: spec.state,
        generation: spec.generation,
        event,
    };
    if sender.send(message).is_err() {
        tracing::debug!("State machine gone before '{}' finished", spec.state_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SkillEnvironment;
    use crate::skills::{FailInit, Noop, Wait};
    use crossbeam::channel::{unbounded, Receiver};
    use std::collections::BTreeMap;

    struct Panics;

    impl Skill for Panics {
        fn configure(&mut self, _: &mut SkillConfigurator) -> BonsaiResult<()> {
            Ok(())
        }

        fn execute(&mut self) -> ExitToken {
            panic!("boom");
        }
    }

    struct Forever;

    impl Skill for Forever {
        fn configure(&mut self, _: &mut SkillConfigurator) -> BonsaiResult<()> {
            Ok(())
        }

        fn execute(&mut self) -> ExitToken {
            ExitToken::loop_with(Duration::from_millis(5))
        }
    }

    fn spawn(
        skill: Box<dyn Skill>,
        name: &str,
        params: BTreeMap<String, serde_json::Value>,
        gate: PauseGate,
    ) -> (SkillRunner, Receiver<ControlMessage>) {
        let (tx, rx) = unbounded();
        let state_id = format!("{}#t", name);
        let configurator = SkillConfigurator::new(&state_id, params, SkillEnvironment::default());
        let spec = RunnerSpec {
            state: 1,
            state_id,
            generation: 7,
            simple_name: name.to_string(),
            loop_delay: Duration::from_millis(1),
        };
        let runner = SkillRunner::spawn(skill, configurator, spec, gate, tx).unwrap();
        (runner, rx)
    }

    fn exit_event(rx: &Receiver<ControlMessage>) -> Option<String> {
        match rx.recv_timeout(Duration::from_secs(2)) {
            Ok(ControlMessage::SkillExit {
                generation, event, ..
            }) => {
                assert_eq!(generation, 7);
                Some(event)
            }
            _ => None,
        }
    }

    #[test]
    fn successful_skill_fires_its_token() {
        let (_runner, rx) = spawn(Box::new(Noop::default()), "Noop", BTreeMap::new(), PauseGate::new());
        assert_eq!(exit_event(&rx).as_deref(), Some("Noop.success"));
    }

    #[test]
    fn failed_init_and_panics_are_fatal() {
        let (_r1, rx1) = spawn(Box::new(FailInit), "FailInit", BTreeMap::new(), PauseGate::new());
        assert_eq!(exit_event(&rx1).as_deref(), Some("FailInit.fatal"));

        let (_r2, rx2) = spawn(Box::new(Panics), "Panics", BTreeMap::new(), PauseGate::new());
        assert_eq!(exit_event(&rx2).as_deref(), Some("Panics.fatal"));
    }

    #[test]
    fn cancelled_runner_fires_nothing() {
        let (mut runner, rx) = spawn(Box::new(Forever), "Forever", BTreeMap::new(), PauseGate::new());
        thread::sleep(Duration::from_millis(20));
        runner.cancel();
        assert!(runner.join_until(Instant::now() + Duration::from_secs(2)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn paused_gate_holds_execution() {
        let gate = PauseGate::new();
        gate.pause();
        let params = BTreeMap::from([("TIMEOUT".to_string(), serde_json::json!(10))]);
        let (_runner, rx) = spawn(Box::new(Wait::default()), "Wait", params, gate.clone());

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        gate.resume();
        assert_eq!(exit_event(&rx).as_deref(), Some("Wait.success"));
    }
}
