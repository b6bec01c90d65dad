use bonsai_core::communication::{CoreObjects, Hub, HubActuator};
use bonsai_core::core::SkillEnvironment;
use bonsai_core::memory::WorkingMemory;
use std::sync::Arc;

/// Actuators offered to behaviors run or checked by the CLI.
pub fn core_objects() -> CoreObjects {
    let speech: Hub<String> = Hub::new("speech");
    let objects = CoreObjects::new();
    objects.add_actuator("SpeechActuator", Arc::new(HubActuator::new("speech", speech)));
    tracing::debug!("Registered actuators: {:?}", objects.actuator_names());
    objects
}

/// Same objects a local run gets, over a fresh working memory.
pub fn skill_environment() -> SkillEnvironment {
    SkillEnvironment {
        objects: core_objects(),
        memory: WorkingMemory::new(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speech_actuator_is_registered() {
        let env = skill_environment();
        assert!(env
            .objects
            .actuator::<HubActuator<String>>("SpeechActuator")
            .is_ok());
        assert!(env.memory.is_empty());
    }
}
