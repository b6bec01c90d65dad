//! # BONSAI Core
//!
//! Runtime of the BONSAI skill state machine framework.
//!
//! A behavior is an SCXML statechart whose atomic states are bound to skills.
//! When a skill state is entered its skill runs on its own thread; the exit
//! token it ends with (`Talk.success`, `Drive.error.blocked`, ...) is fired
//! back into the statechart as an event.
//!
//! - **scxml**: Parsing, includes and validation of behaviors
//! - **core**: The `Skill` trait, exit tokens, configurators and the skill registry
//! - **engine**: Statechart interpreter and the threaded `SkillStateMachine`
//! - **control**: `StateMachineController`, state listeners and remote control
//! - **memory**: Working memory shared by skills through typed slots
//! - **communication**: Hub topics and the actuator/sensor registry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bonsai_core::{ControllerConfig, CoreObjects, SkillRegistry, StateMachineController, WorkingMemory};
//! use std::time::Duration;
//!
//! let controller = StateMachineController::new(
//!     ControllerConfig::standard(),
//!     SkillRegistry::with_builtins(),
//!     CoreObjects::new(),
//!     WorkingMemory::new(),
//! )?;
//!
//! let results = controller.load(r##"
//!     <scxml initial="Wait#pause">
//!       <state id="Wait#pause">
//!         <datamodel><data id="#_TIMEOUT" expr="100"/></datamodel>
//!         <transition event="Wait.success" target="Done"/>
//!       </state>
//!       <final id="Done"/>
//!     </scxml>"##);
//! assert!(results.success(), "{}", results);
//!
//! controller.start()?;
//! controller.wait_until_finished(Duration::from_secs(1));
//! # Ok::<(), bonsai_core::BonsaiError>(())
//! ```

pub mod communication;
pub mod config;
pub mod control;
pub mod core;
pub mod engine;
pub mod error;
pub mod memory;
pub mod params;
pub mod scxml;
pub mod skills;

// Re-export commonly used types for easy access
pub use communication::{CoreObjects, Hub};
pub use config::{BonsaiConfig, ControllerConfig, DaemonConfig};
pub use control::{
    ControllerStatus, HttpRemote, LoadingResults, LocalRemote, RemoteControl,
    StateChangeListener, StateMachineController, StateSnapshot,
};
pub use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator, SkillRegistry};
pub use engine::{MachinePhase, SkillStateMachine};
pub use error::{BonsaiError, BonsaiResult};
pub use memory::{MemorySlot, WorkingMemory};
pub use params::RuntimeParams;
