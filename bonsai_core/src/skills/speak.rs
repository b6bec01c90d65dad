use crate::communication::HubActuator;
use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator};
use crate::error::BonsaiResult;
use std::sync::Arc;

/// Sends `#_MESSAGE` to the `SpeechActuator`.
#[derive(Default)]
pub struct Speak {
    message: String,
    actuator: Option<Arc<HubActuator<String>>>,
    token_success: Option<ExitToken>,
}

impl Skill for Speak {
    fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()> {
        self.message = configurator.request_value("MESSAGE")?;
        self.actuator = Some(configurator.request_actuator("SpeechActuator")?);
        self.token_success = Some(configurator.request_exit_token(ExitStatus::Success));
        Ok(())
    }

    fn execute(&mut self) -> ExitToken {
        if let Some(actuator) = &self.actuator {
            let listeners = actuator.command(self.message.clone());
            tracing::debug!("Said '{}' to {} listener(s)", self.message, listeners);
        }
        self.token_success.clone().unwrap_or_else(ExitToken::success)
    }
}
