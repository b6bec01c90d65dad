//! # Behavior control
//!
//! - **loader**: SCXML source -> checked chart plus skill bindings (`LoadingResults`)
//! - **controller**: `StateMachineController`, owner of the single loaded behavior
//! - **publisher**: polling thread notifying `StateChangeListener`s and a Hub topic
//! - **remote**: `RemoteControl` protocol with local and HTTP implementations
//!
//! ```rust,no_run
//! use bonsai_core::communication::CoreObjects;
//! use bonsai_core::config::ControllerConfig;
//! use bonsai_core::control::StateMachineController;
//! use bonsai_core::core::SkillRegistry;
//! use bonsai_core::memory::WorkingMemory;
//!
//! let controller = StateMachineController::new(
//!     ControllerConfig::standard(),
//!     SkillRegistry::with_builtins(),
//!     CoreObjects::new(),
//!     WorkingMemory::new(),
//! )?;
//! let results = controller.load("behaviors/greet.scxml");
//! if results.success() {
//!     controller.start()?;
//! }
//! # Ok::<(), bonsai_core::error::BonsaiError>(())
//! ```

pub mod controller;
pub mod loader;
pub mod publisher;
pub mod remote;

pub use controller::{ControllerStatus, StateMachineController, TransitionInfo};
pub use loader::{load_behavior, BehaviorSource, LoadedBehavior, LoadingResults};
pub use publisher::{StateChangeListener, StatePublisher, StateSnapshot, STATE_TOPIC};
pub use remote::{
    normalize_url, ErrorResponse, EventRequest, EventResponse, HttpRemote, LoadRequest,
    LocalRemote, RemoteControl, StatesResponse, DEFAULT_DAEMON_PORT,
};
