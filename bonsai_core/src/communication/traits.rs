//! Common traits at the middleware boundary
//!
//! Skills never talk to a transport directly. They are handed actuators
//! (outputs) and sensors (inputs) that implement these traits; the in-process
//! Hub provides the default implementations.

use crate::communication::hub::{Hub, HubSubscriber};
use crate::error::BonsaiResult;
use std::fmt::Debug;
use std::time::Duration;

/// Common trait for publisher/sender implementations
pub trait Publisher<T>: Send + Sync + Clone + Debug {
    /// Send a message - returns Ok on success, Err on failure
    fn send(&self, msg: T) -> BonsaiResult<()>;

    /// Try to send without reporting the error
    fn try_send(&self, msg: T) -> bool {
        self.send(msg).is_ok()
    }
}

/// Common trait for subscriber/receiver implementations
pub trait Subscriber<T>: Send + Sync + Clone + Debug {
    /// Receive a message without blocking
    fn recv(&self) -> Option<T>;

    /// Check if messages are available
    fn has_messages(&self) -> bool {
        false
    }
}

/// Output adapter handed to skills (speech, navigation goals, grippers, ...).
pub trait Actuator: Send + Sync {
    fn name(&self) -> &str;
}

/// Input adapter handed to skills.
pub trait Sensor<T>: Send + Sync {
    fn name(&self) -> &str;

    /// Newest reading, waiting at most `timeout` for one to arrive.
    fn read_last(&self, timeout: Duration) -> Option<T>;

    fn has_next(&self) -> bool;

    /// Drop all pending readings.
    fn clear(&self);
}

/// Actuator that publishes each command on a Hub topic.
#[derive(Debug, Clone)]
pub struct HubActuator<T> {
    name: String,
    hub: Hub<T>,
}

impl<T: Clone + Send + 'static> HubActuator<T> {
    pub fn new(name: &str, hub: Hub<T>) -> Self {
        Self {
            name: name.to_string(),
            hub,
        }
    }

    /// Returns how many subscribers received the command.
    pub fn command(&self, cmd: T) -> usize {
        self.hub.send(cmd)
    }

    pub fn hub(&self) -> &Hub<T> {
        &self.hub
    }
}

impl<T: Clone + Send + 'static> Actuator for HubActuator<T> {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Sensor backed by a Hub subscription.
pub struct HubSensor<T> {
    name: String,
    subscriber: HubSubscriber<T>,
}

impl<T: Clone + Send + 'static> HubSensor<T> {
    pub fn new(name: &str, hub: &Hub<T>) -> Self {
        Self {
            name: name.to_string(),
            subscriber: hub.subscribe(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Sensor<T> for HubSensor<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_last(&self, timeout: Duration) -> Option<T> {
        self.subscriber
            .latest()
            .or_else(|| self.subscriber.recv_timeout(timeout))
    }

    fn has_next(&self) -> bool {
        self.subscriber.has_pending()
    }

    fn clear(&self) {
        self.subscriber.try_iter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_reads_newest_value() {
        let hub: Hub<i32> = Hub::new("range");
        let sensor = HubSensor::new("RangeSensor", &hub);
        let actuator = HubActuator::new("RangeActuator", hub.clone());

        actuator.command(1);
        actuator.command(2);
        assert!(sensor.has_next());
        assert_eq!(sensor.read_last(Duration::from_millis(1)), Some(2));
        assert_eq!(sensor.read_last(Duration::from_millis(1)), None);
    }

    #[test]
    fn clear_discards_pending() {
        let hub: Hub<i32> = Hub::new("range");
        let sensor = HubSensor::new("RangeSensor", &hub);
        hub.send(5);
        sensor.clear();
        assert!(!sensor.has_next());
    }
}
