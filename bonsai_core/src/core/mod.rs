//! # Core skill types for the BONSAI framework
//!
//! - **Skill**: The trait every behavior unit implements
//! - **ExitToken / ExitStatus**: Skill results, fired as state machine events
//! - **SkillConfigurator**: Parameter, slot, actuator and sensor requests of a skill
//! - **SkillRegistry**: Class name to constructor table used when binding states
//!
//! ## Skill Lifecycle
//!
//! Every time a skill state is entered a fresh instance is created and:
//! 1. **Configuration** - `configure()` requests what the skill needs
//! 2. **Initialization** - `init()` acquires resources
//! 3. **Execution** - `execute()` is called until it returns a non-loop token
//! 4. **End** - `end()` may rewrite the final token, which is then fired

pub mod binding;
pub mod configurator;
pub mod registry;
pub mod skill;

pub use binding::{SkillBinding, SkillBindings};
pub use configurator::{SkillConfigurator, SkillEnvironment};
pub use registry::SkillRegistry;
pub use skill::{simple_name, skill_class_of, ExitStatus, ExitToken, Skill};
