use anyhow::Context;
use bonsai_core::config::BonsaiConfig;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bonsai_manager::commands::remote::{self, RemoteAction};
use bonsai_manager::commands::{run, validate};

#[derive(Parser)]
#[command(name = "bonsai")]
#[command(about = "BONSAI - SCXML skill state machines")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (.toml, .yaml); defaults to the first one found
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Show engine logs
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a behavior without running it
    Validate {
        file: PathBuf,
        /// Treat unhandled exit tokens and unused parameters as errors
        #[arg(short = 's', long = "strict")]
        strict: bool,
    },

    /// Run a behavior in-process
    Run {
        file: PathBuf,
        /// Stop after this many seconds
        #[arg(short = 'd', long = "duration")]
        duration: Option<f64>,
        /// Event to fire after start (repeatable, fired in order)
        #[arg(short = 'e', long = "event")]
        events: Vec<String>,
        /// Print every state change
        #[arg(short = 'w', long = "watch")]
        watch: bool,
    },

    /// Control a bonsai_daemon
    Remote {
        /// Daemon address: host, host:port or URL
        addr: String,
        #[command(subcommand)]
        action: RemoteCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Controller status
    Status,
    /// Active atomic states
    States,
    Start,
    Stop,
    Pause,
    Resume,
    /// Fire an external event
    Fire { event: String },
    /// Send a local behavior file to the daemon
    Load { file: PathBuf },
}

impl From<RemoteCommands> for RemoteAction {
    fn from(command: RemoteCommands) -> Self {
        match command {
            RemoteCommands::Status => RemoteAction::Status,
            RemoteCommands::States => RemoteAction::States,
            RemoteCommands::Start => RemoteAction::Start,
            RemoteCommands::Stop => RemoteAction::Stop,
            RemoteCommands::Pause => RemoteAction::Pause,
            RemoteCommands::Resume => RemoteAction::Resume,
            RemoteCommands::Fire { event } => RemoteAction::Fire(event),
            RemoteCommands::Load { file } => RemoteAction::Load(file),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "bonsai_core=debug,bonsai_manager=debug"
    } else {
        "bonsai_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BonsaiConfig> {
    match path {
        Some(path) => BonsaiConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration '{}'", path.display())),
        None => BonsaiConfig::load().context("Failed to load configuration"),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run_command(cli.command, cli.config.as_deref()) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Validate { file, strict } => {
            let config = load_config(config_path)?;
            if !validate::validate_behavior(&file, &config, strict)? {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Run {
            file,
            duration,
            events,
            watch,
        } => {
            let config = load_config(config_path)?;
            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&interrupted);
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                .context("Failed to install Ctrl+C handler")?;

            let options = run::RunOptions {
                duration: duration.and_then(|d| Duration::try_from_secs_f64(d).ok()),
                events,
                verbose_states: watch,
            };
            run::run_behavior(&file, &config, &options, interrupted)?;
            Ok(())
        }

        Commands::Remote { addr, action } => remote::execute_remote(&addr, action.into()),

        Commands::Version => {
            bonsai_manager::version::print_version_info();
            Ok(())
        }
    }
}
