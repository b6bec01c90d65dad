//! # BONSAI - Behaviors as SCXML skill state machines
//!
//! BONSAI runs robot behaviors written as SCXML statecharts. Each atomic
//! state may be bound to a skill; the skill runs while its state is active
//! and its exit token drives the next transition.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bonsai::prelude::*;
//!
//! #[derive(Default)]
//! struct Beep {
//!     done: Option<ExitToken>,
//! }
//!
//! impl Skill for Beep {
//!     fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()> {
//!         self.done = Some(configurator.request_exit_token(ExitStatus::Success));
//!         Ok(())
//!     }
//!
//!     fn execute(&mut self) -> ExitToken {
//!         println!("beep");
//!         self.done.clone().unwrap_or_else(ExitToken::success)
//!     }
//! }
//!
//! let mut registry = SkillRegistry::with_builtins();
//! registry.register_default::<Beep>("sound.Beep");
//!
//! let controller = StateMachineController::new(
//!     ControllerConfig::standard(),
//!     registry,
//!     CoreObjects::new(),
//!     WorkingMemory::new(),
//! )?;
//! let results = controller.load("behaviors/beep.scxml");
//! if results.success() {
//!     controller.start()?;
//!     controller.wait_until_finished(Duration::from_secs(10));
//! }
//! # Ok::<(), BonsaiError>(())
//! ```

// Re-export core components
pub use bonsai_core::{self, *};

/// The BONSAI prelude - everything needed to write skills and drive behaviors
pub mod prelude {
    // Skills
    pub use bonsai_core::core::{
        ExitStatus, ExitToken, Skill, SkillConfigurator, SkillEnvironment, SkillRegistry,
    };
    pub use bonsai_core::skills::{Counter, FailInit, Noop, Speak, Wait, WriteSlot};

    // Control
    pub use bonsai_core::config::{BonsaiConfig, ControllerConfig};
    pub use bonsai_core::control::{
        ControllerStatus, HttpRemote, LoadingResults, LocalRemote, RemoteControl,
        StateChangeListener, StateMachineController, StateSnapshot,
    };

    // Communication and memory
    pub use bonsai_core::communication::{
        Actuator, CoreObjects, Hub, HubActuator, HubSensor, Sensor,
    };
    pub use bonsai_core::memory::{MemorySlot, WorkingMemory};

    // Error types
    pub use bonsai_core::error::{BonsaiError, BonsaiResult};
    pub type Result<T> = BonsaiResult<T>;

    // Common std types
    pub use std::sync::Arc;
    pub use std::time::{Duration, Instant};

    // Common traits
    pub use serde::{Deserialize, Serialize};

    // Re-export anyhow for error handling
    pub use anyhow::{anyhow, bail, ensure, Context, Result as AnyResult};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get BONSAI version
pub fn version() -> &'static str {
    VERSION
}
