//! # SCXML behaviors
//!
//! - **model**: Arena representation of a statechart (states in document order)
//! - **expr**: Guard conditions and datamodel literals
//! - **parser**: roxmltree based reader with `src` includes
//! - **validation**: Structural and skill exit checks run at load time

pub mod expr;
pub mod model;
pub mod parser;
pub mod validation;

pub use expr::{parse_literal, Condition, ConditionContext};
pub use model::{
    descriptor_matches, DataEntry, Executable, HistoryKind, StateChart, StateIdx, StateKind,
    StateNode, TransitionIdx, TransitionNode, TransitionType, ROOT,
};
pub use parser::{parse_file, parse_file_with, parse_str, parse_str_with, ParseOptions};
pub use validation::{validate, ValidationResult};
