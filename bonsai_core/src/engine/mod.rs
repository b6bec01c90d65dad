//! # Skill state machine engine
//!
//! - **interpreter**: W3C statechart algorithm, single threaded and deterministic
//! - **runner**: One thread per active skill, cancelled when its state exits
//! - **machine**: [`SkillStateMachine`], the control thread tying both together

pub mod interpreter;
pub mod machine;
pub mod runner;

pub use interpreter::{parse_delay, Interpreter, InterpreterHooks, DONE_STATE_PREFIX, ERROR_EXECUTION};
pub use machine::{MachinePhase, MachineSnapshot, SkillStateMachine};
pub use runner::{PauseGate, RunnerSpec, SkillRunner};
