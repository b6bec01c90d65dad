use crate::commands::environment::core_objects;
use crate::commands::validate::print_results;
use anyhow::{bail, Context, Result};
use bonsai_core::config::BonsaiConfig;
use bonsai_core::control::{StateMachineController, StateSnapshot};
use bonsai_core::core::SkillRegistry;
use bonsai_core::engine::MachinePhase;
use bonsai_core::memory::WorkingMemory;
use colored::Colorize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const EVENT_SETTLE: Duration = Duration::from_millis(100);
const POLL: Duration = Duration::from_millis(20);

/// How a local run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Finished(Vec<String>),
    TimedOut(Vec<String>),
    Interrupted(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this long; `None` runs until a final state or Ctrl+C
    pub duration: Option<Duration>,
    /// Fired in order once the behavior has started
    pub events: Vec<String>,
    /// Print every state change
    pub verbose_states: bool,
}

/// Run a behavior in-process until it finishes, times out or is interrupted.
pub fn run_behavior(
    file: &Path,
    config: &BonsaiConfig,
    options: &RunOptions,
    interrupted: Arc<AtomicBool>,
) -> Result<RunOutcome> {
    let controller = StateMachineController::from_config(
        config,
        SkillRegistry::with_builtins(),
        core_objects(),
        WorkingMemory::new(),
    )
    .context("Failed to create controller")?;

    let source = file.to_str().context("Behavior path is not valid UTF-8")?;
    let results = controller.load(source);
    print_results(&results);
    if !results.success() {
        bail!("{} failed to load", file.display());
    }

    if options.verbose_states {
        controller.add_listener(Box::new(|snapshot: &StateSnapshot| {
            println!(
                "{} [{}] {}",
                "→".cyan(),
                snapshot.sequence,
                snapshot.current_states.join(", ").yellow()
            );
        }));
    }

    println!("{} Running {}", "→".cyan(), file.display().to_string().yellow());
    controller.start()?;

    for event in &options.events {
        std::thread::sleep(EVENT_SETTLE);
        tracing::debug!("Firing '{}' in {:?}", event, controller.current_states());
        if controller.fire_event(event) {
            println!("{} Fired {}", "→".cyan(), event.green());
        } else {
            println!("{} Event {} not accepted", "!".yellow(), event);
        }
    }

    let started = Instant::now();
    let outcome = loop {
        let status = controller.status();
        if status.finished {
            break RunOutcome::Finished(status.current_states);
        }
        if interrupted.load(Ordering::SeqCst) {
            break RunOutcome::Interrupted(status.current_states);
        }
        if options.duration.is_some_and(|d| started.elapsed() >= d) {
            break RunOutcome::TimedOut(status.current_states);
        }
        std::thread::sleep(POLL);
    };

    tracing::debug!("Run ended: {:?}", outcome);
    if controller.status().running {
        controller.stop()?;
    }
    if let Ok(visits) = controller.state_visits() {
        let total: u64 = visits.values().sum();
        println!("   {} state entries", total.to_string().dimmed());
    }

    match &outcome {
        RunOutcome::Finished(states) => println!(
            "\n{} in {}",
            "✅ Finished".green().bold(),
            states.join(", ").yellow()
        ),
        RunOutcome::TimedOut(states) => println!(
            "\n{} while in {}",
            "⏱ Stopped after timeout".yellow().bold(),
            states.join(", ")
        ),
        RunOutcome::Interrupted(states) => println!(
            "\n{} while in {}",
            "Interrupted".yellow().bold(),
            states.join(", ")
        ),
    }
    Ok(outcome)
}

/// Phase name for status lines.
pub fn phase_label(phase: MachinePhase) -> &'static str {
    match phase {
        MachinePhase::Idle => "idle",
        MachinePhase::Running => "running",
        MachinePhase::Paused => "paused",
        MachinePhase::Finished => "finished",
        MachinePhase::Stopped => "stopped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, xml: &str) -> std::path::PathBuf {
        let file = dir.join("behavior.scxml");
        std::fs::write(&file, xml).unwrap();
        file
    }

    #[test]
    fn events_drive_behavior_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(
            dir.path(),
            r##"<scxml initial="Ready">
                 <state id="Ready"><transition event="go" target="Wait#w"/></state>
                 <state id="Wait#w">
                   <datamodel><data id="#_TIMEOUT" expr="5"/></datamodel>
                   <transition event="Wait.success" target="Done"/>
                 </state>
                 <final id="Done"/>
               </scxml>"##,
        );
        let options = RunOptions {
            duration: Some(Duration::from_secs(5)),
            events: vec!["go".to_string()],
            verbose_states: true,
        };

        let outcome =
            run_behavior(&file, &BonsaiConfig::default(), &options, Arc::new(AtomicBool::new(false)))
                .unwrap();
        assert_eq!(outcome, RunOutcome::Finished(vec!["Done".to_string()]));
    }

    #[test]
    fn duration_bounds_endless_behaviors() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), r#"<scxml initial="Idle"><state id="Idle"/></scxml>"#);
        let options = RunOptions {
            duration: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let outcome =
            run_behavior(&file, &BonsaiConfig::default(), &options, Arc::new(AtomicBool::new(false)))
                .unwrap();
        assert_eq!(outcome, RunOutcome::TimedOut(vec!["Idle".to_string()]));
    }

    #[test]
    fn invalid_behavior_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), r#"<scxml initial="Nowhere"><state id="Idle"/></scxml>"#);
        let result = run_behavior(
            &file,
            &BonsaiConfig::default(),
            &RunOptions::default(),
            Arc::new(AtomicBool::new(false)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn phase_labels() {
        assert_eq!(phase_label(MachinePhase::Paused), "paused");
    }
}
