//! # Communication layer for BONSAI
//!
//! Skills reach the outside world only through this module:
//!
//! - **Hub**: In-process publish/subscribe topic with per-subscriber queues
//! - **Actuator / Sensor**: Boundary traits implemented by middleware adapters
//! - **CoreObjects**: Named actuator/sensor registry handed to skill configurators
//!
//! ## Usage Patterns
//!
//! ```rust
//! use bonsai_core::communication::{CoreObjects, Hub, HubActuator};
//! use std::sync::Arc;
//!
//! let speech: Hub<String> = Hub::new("speech");
//! let objects = CoreObjects::new();
//! objects.add_actuator("SpeechActuator", Arc::new(HubActuator::new("speech", speech)));
//! ```

pub mod hub;
pub mod objects;
pub mod traits;

pub use hub::{Hub, HubMetrics, HubSubscriber};
pub use objects::CoreObjects;
pub use traits::{Actuator, HubActuator, HubSensor, Publisher, Sensor, Subscriber};
