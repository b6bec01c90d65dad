//! Built-in skills
//!
//! Small behaviors that need no hardware. Robot-specific skills live in
//! downstream crates and are registered the same way.

mod counter;
mod fail_init;
mod noop;
mod speak;
mod wait;
mod write_slot;

pub use counter::Counter;
pub use fail_init::FailInit;
pub use noop::Noop;
pub use speak::Speak;
pub use wait::Wait;
pub use write_slot::WriteSlot;

use crate::core::SkillRegistry;

/// Register every built-in skill under its plain class name.
pub fn register_builtins(registry: &mut SkillRegistry) {
    registry
        .register_default::<Noop>("Noop")
        .register_default::<Wait>("Wait")
        .register_default::<WriteSlot>("WriteSlot")
        .register_default::<Counter>("Counter")
        .register_default::<Speak>("Speak")
        .register_default::<FailInit>("FailInit");
}
