use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator};
use crate::error::BonsaiResult;

/// Succeeds immediately.
#[derive(Debug, Default)]
pub struct Noop {
    token_success: Option<ExitToken>,
}

impl Skill for Noop {
    fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()> {
        self.token_success = Some(configurator.request_exit_token(ExitStatus::Success));
        Ok(())
    }

    fn execute(&mut self) -> ExitToken {
        self.token_success.clone().unwrap_or_else(ExitToken::success)
    }
}
