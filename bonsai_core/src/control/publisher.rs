use crate::communication::Hub;
use crate::engine::{MachinePhase, MachineSnapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Hub topic carrying every [`StateSnapshot`].
pub const STATE_TOPIC: &str = "bonsai/current_states";

/// Published whenever the active configuration or phase changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Counts published snapshots, starting at 1
    pub sequence: u64,
    pub phase: MachinePhase,
    pub current_states: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Receives state changes on the publisher thread.
///
/// Implementations must return quickly; a slow listener delays all others.
/// Listeners added while a change is being delivered first see the next one.
pub trait StateChangeListener: Send {
    fn on_state_change(&mut self, snapshot: &StateSnapshot);
}

impl<F> StateChangeListener for F
where
    F: FnMut(&StateSnapshot) + Send,
{
    fn on_state_change(&mut self, snapshot: &StateSnapshot) {
        self(snapshot)
    }
}

pub(crate) type SnapshotSource = Arc<dyn Fn() -> Option<MachineSnapshot> + Send + Sync>;
type Listeners = Arc<Mutex<Vec<Box<dyn StateChangeListener>>>>;

/// Polls a machine snapshot source and fans changes out to listeners and a Hub topic.
pub struct StatePublisher {
    listeners: Listeners,
    hub: Hub<StateSnapshot>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatePublisher {
    pub(crate) fn spawn(source: SnapshotSource, interval: Duration) -> std::io::Result<Self> {
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));
        let hub = Hub::new(STATE_TOPIC);
        let running = Arc::new(AtomicBool::new(true));

        let poller = Poller {
            source,
            listeners: Arc::clone(&listeners),
            hub: hub.clone(),
            last: None,
            sequence: 0,
        };
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("bonsai-state-publisher".to_string())
            .spawn(move || poller.run(&flag, interval))?;

        Ok(Self {
            listeners,
            hub,
            running,
            handle: Some(handle),
        })
    }

    pub fn add_listener(&self, listener: Box<dyn StateChangeListener>) {
        self.listeners.lock().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn hub(&self) -> &Hub<StateSnapshot> {
        &self.hub
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("State publisher thread panicked");
            }
        }
    }
}

impl Drop for StatePublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StatePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatePublisher")
            .field("listeners", &self.listener_count())
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish()
    }
}

struct Poller {
    source: SnapshotSource,
    listeners: Listeners,
    hub: Hub<StateSnapshot>,
    last: Option<(MachinePhase, Vec<String>)>,
    sequence: u64,
}

impl Poller {
    fn run(mut self, running: &AtomicBool, interval: Duration) {
        tracing::debug!("State publisher polling every {:?}", interval);
        while running.load(Ordering::Acquire) {
            self.poll();
            thread::sleep(interval);
        }
    }

    fn poll(&mut self) {
        let Some(machine) = (self.source)() else {
            self.last = None;
            return;
        };
        let current = (machine.phase, machine.current_states);
        if self.last.as_ref() == Some(&current) {
            return;
        }

        self.sequence += 1;
        let snapshot = StateSnapshot {
            sequence: self.sequence,
            phase: current.0,
            current_states: current.1.clone(),
            timestamp: Utc::now(),
        };
        self.last = Some(current);

        tracing::trace!("State change #{}: {:?}", snapshot.sequence, snapshot.current_states);
        // Called unlocked so listeners may register further listeners.
        let mut notified = std::mem::take(&mut *self.listeners.lock());
        for listener in notified.iter_mut() {
            listener.on_state_change(&snapshot);
        }
        let mut listeners = self.listeners.lock();
        notified.append(&mut listeners);
        *listeners = notified;
        drop(listeners);

        self.hub.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn machine(phase: MachinePhase, states: &[&str]) -> MachineSnapshot {
        MachineSnapshot {
            phase,
            current_states: states.iter().map(|s| s.to_string()).collect(),
            active_states: Vec::new(),
            visits: BTreeMap::new(),
            events_processed: 0,
        }
    }

    #[test]
    fn publishes_only_changes() {
        let current = Arc::new(Mutex::new(Some(machine(MachinePhase::Running, &["A"]))));
        let source_state = Arc::clone(&current);
        let source: SnapshotSource = Arc::new(move || source_state.lock().clone());

        let mut publisher = StatePublisher::spawn(source, Duration::from_millis(2)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        publisher.add_listener(Box::new(move |s: &StateSnapshot| {
            sink.lock().push(s.current_states.clone())
        }));
        let topic = publisher.hub().subscribe();

        thread::sleep(Duration::from_millis(30));
        *current.lock() = Some(machine(MachinePhase::Running, &["B"]));
        thread::sleep(Duration::from_millis(30));
        publisher.shutdown();

        let seen = seen.lock().clone();
        assert_eq!(seen.last(), Some(&vec!["B".to_string()]));
        assert!(seen.len() <= 2);

        let published = topic.try_iter();
        assert_eq!(published.last().unwrap().current_states, vec!["B".to_string()]);
        assert!(published.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[test]
    fn listener_can_register_another_listener() {
        let current = Arc::new(Mutex::new(Some(machine(MachinePhase::Running, &["A"]))));
        let source_state = Arc::clone(&current);
        let mut publisher = StatePublisher::spawn(
            Arc::new(move || source_state.lock().clone()),
            Duration::from_millis(2),
        )
        .unwrap();

        let late_seen = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::clone(&publisher.listeners);
        let sink = Arc::clone(&late_seen);
        let mut registered = false;
        publisher.add_listener(Box::new(move |_: &StateSnapshot| {
            if !registered {
                registered = true;
                let sink = Arc::clone(&sink);
                registry.lock().push(Box::new(move |s: &StateSnapshot| {
                    sink.lock().push(s.current_states.clone())
                }));
            }
        }));
        let topic = publisher.hub().subscribe();

        thread::sleep(Duration::from_millis(30));
        *current.lock() = Some(machine(MachinePhase::Running, &["B"]));
        let reached_b = std::iter::from_fn(|| topic.recv_timeout(Duration::from_secs(1)))
            .any(|s| s.current_states == vec!["B".to_string()]);
        assert!(reached_b);
        publisher.shutdown();

        assert_eq!(publisher.listener_count(), 2);
        assert_eq!(late_seen.lock().last(), Some(&vec!["B".to_string()]));
    }

    #[test]
    fn phase_change_alone_is_published() {
        let current = Arc::new(Mutex::new(Some(machine(MachinePhase::Running, &["A"]))));
        let source_state = Arc::clone(&current);
        let mut publisher = StatePublisher::spawn(
            Arc::new(move || source_state.lock().clone()),
            Duration::from_millis(2),
        )
        .unwrap();
        let topic = publisher.hub().subscribe();

        *current.lock() = Some(machine(MachinePhase::Paused, &["A"]));
        let paused = std::iter::from_fn(|| topic.recv_timeout(Duration::from_secs(1)))
            .find(|s| s.phase == MachinePhase::Paused);
        assert!(paused.is_some());
        publisher.shutdown();
    }
}
