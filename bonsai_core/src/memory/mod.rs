//! # Working memory for BONSAI
//!
//! Skills exchange data through a shared blackboard instead of talking to each other:
//!
//! - **WorkingMemory**: Thread-safe tree of JSON values addressed by slash paths
//! - **MemorySlot**: Typed handle bound to one path, handed out by the skill configurator
//! - **SlotMapping**: Per-state table resolving a skill's slot keys to memory paths
//!
//! ## Slot configuration
//!
//! Slot keys are resolved from the `#_SLOTS` datamodel entry of a behavior:
//!
//! ```xml
//! <data id="#_SLOTS">
//!     <slots>
//!         <slot key="Target" state="nav.Drive#approach" xpath="/nav/target"/>
//!     </slots>
//! </data>
//! ```

pub mod slot;
pub mod working_memory;

pub use slot::{MemorySlot, SlotMapping};
pub use working_memory::WorkingMemory;
