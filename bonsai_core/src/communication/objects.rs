use crate::error::{BonsaiError, BonsaiResult};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

type Object = Arc<dyn Any + Send + Sync>;

/// Named actuators and sensors available to skills.
///
/// Objects are stored type-erased and handed out typed; asking for a name
/// with the wrong type is reported like a missing object.
#[derive(Clone, Default)]
pub struct CoreObjects {
    actuators: Arc<RwLock<BTreeMap<String, Object>>>,
    sensors: Arc<RwLock<BTreeMap<String, Object>>>,
}

impl CoreObjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_actuator<A: Send + Sync + 'static>(&self, name: &str, actuator: Arc<A>) {
        self.actuators.write().insert(name.to_string(), actuator);
    }

    pub fn add_sensor<S: Send + Sync + 'static>(&self, name: &str, sensor: Arc<S>) {
        self.sensors.write().insert(name.to_string(), sensor);
    }

    pub fn actuator<A: Send + Sync + 'static>(&self, name: &str) -> BonsaiResult<Arc<A>> {
        Self::lookup(&self.actuators, "actuator", name)
    }

    pub fn sensor<S: Send + Sync + 'static>(&self, name: &str) -> BonsaiResult<Arc<S>> {
        Self::lookup(&self.sensors, "sensor", name)
    }

    pub fn actuator_names(&self) -> Vec<String> {
        self.actuators.read().keys().cloned().collect()
    }

    pub fn sensor_names(&self) -> Vec<String> {
        self.sensors.read().keys().cloned().collect()
    }

    fn lookup<T: Send + Sync + 'static>(
        table: &RwLock<BTreeMap<String, Object>>,
        kind: &str,
        name: &str,
    ) -> BonsaiResult<Arc<T>> {
        let object = table
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BonsaiError::config(format!("No {} named '{}'", kind, name)))?;

        object.downcast::<T>().map_err(|_| {
            BonsaiError::config(format!(
                "{} '{}' is not a {}",
                kind,
                name,
                std::any::type_name::<T>()
            ))
        })
    }
}

impl std::fmt::Debug for CoreObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreObjects")
            .field("actuators", &self.actuator_names())
            .field("sensors", &self.sensor_names())
            .finish()
    }
}
