use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator};
use crate::error::BonsaiResult;

/// Refuses to initialize, so the runner ends it with `fatal`.
#[derive(Debug, Default)]
pub struct FailInit;

impl Skill for FailInit {
    fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()> {
        configurator.request_exit_token(ExitStatus::Fatal);
        Ok(())
    }

    fn init(&mut self) -> bool {
        false
    }

    fn execute(&mut self) -> ExitToken {
        ExitToken::fatal()
    }
}
