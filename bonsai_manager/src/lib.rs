//! BONSAI Manager Library
//!
//! Commands behind the `bonsai` CLI: validating behaviors, running them
//! in-process and controlling a remote `bonsai_daemon`.

pub mod commands;
pub mod version;
