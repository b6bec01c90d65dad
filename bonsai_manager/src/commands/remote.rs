use crate::commands::run::phase_label;
use crate::commands::validate::print_results;
use anyhow::{Context, Result};
use bonsai_core::control::{ControllerStatus, HttpRemote, RemoteControl};
use bonsai_core::engine::MachinePhase;
use colored::Colorize;
use std::path::PathBuf;

/// Operation sent to a daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    Status,
    States,
    Start,
    Stop,
    Pause,
    Resume,
    Fire(String),
    /// Read locally, sent inline
    Load(PathBuf),
}

fn phase_of(status: &ControllerStatus) -> MachinePhase {
    if status.finished {
        MachinePhase::Finished
    } else if status.paused {
        MachinePhase::Paused
    } else if status.running {
        MachinePhase::Running
    } else {
        MachinePhase::Idle
    }
}

pub fn print_status(status: &ControllerStatus) {
    if !status.loaded {
        println!("   {}", "No behavior loaded".dimmed());
        return;
    }
    println!(
        "   Behavior: {}",
        status.behavior.as_deref().unwrap_or("?").yellow()
    );
    println!("   Phase: {}", phase_label(phase_of(status)).green());
    println!("   States: {}", status.current_states.join(", ").yellow());
}

/// Execute one action against the daemon at `addr` (`host`, `host:port` or URL).
pub fn execute_remote(addr: &str, action: RemoteAction) -> Result<()> {
    let remote = HttpRemote::new(addr)?;
    tracing::debug!("Remote action {:?} against {}", action, remote.base_url());
    println!("{} {} {:?}", "→".cyan(), remote.base_url().yellow(), action);
    run_action(&remote, action)
}

/// Execute one action through any [`RemoteControl`].
pub fn run_action(remote: &dyn RemoteControl, action: RemoteAction) -> Result<()> {
    match action {
        RemoteAction::Status => print_status(&remote.status()?),
        RemoteAction::States => {
            for state in remote.current_states()? {
                println!("   {}", state.yellow());
            }
        }
        RemoteAction::Start => {
            remote.start()?;
            println!("{}", "✅ Started".green().bold());
        }
        RemoteAction::Stop => {
            remote.stop()?;
            println!("{}", "✅ Stopped".green().bold());
        }
        RemoteAction::Pause => {
            remote.pause()?;
            println!("{}", "✅ Paused".green().bold());
        }
        RemoteAction::Resume => {
            remote.resume()?;
            println!("{}", "✅ Resumed".green().bold());
        }
        RemoteAction::Fire(event) => {
            if remote.fire_event(&event)? {
                println!("{} {}", "✅ Fired".green().bold(), event);
            } else {
                anyhow::bail!("event '{}' was not accepted; is a behavior running?", event);
            }
        }
        RemoteAction::Load(file) => {
            let xml = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let results = remote.load(&xml)?;
            print_results(&results);
            if !results.success() {
                anyhow::bail!("{} was rejected", file.display());
            }
            println!("{}", "✅ Loaded".green().bold());
        }
    }
    Ok(())
}
