use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator};
use crate::error::BonsaiResult;
use crate::memory::MemorySlot;

/// Writes `#_VALUE` into the `Target` slot.
#[derive(Debug, Default)]
pub struct WriteSlot {
    value: String,
    slot: Option<MemorySlot<String>>,
    token_success: Option<ExitToken>,
    token_error: Option<ExitToken>,
}

impl Skill for WriteSlot {
    fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()> {
        self.value = configurator.request_value("VALUE")?;
        self.slot = Some(configurator.request_slot("Target")?);
        self.token_success = Some(configurator.request_exit_token(ExitStatus::Success));
        self.token_error = Some(configurator.request_exit_token(ExitStatus::Error));
        Ok(())
    }

    fn execute(&mut self) -> ExitToken {
        let written = self.slot.as_ref().map(|slot| slot.memorize(&self.value));
        match written {
            Some(Ok(())) => self.token_success.clone().unwrap_or_else(ExitToken::success),
            Some(Err(e)) => {
                tracing::warn!("WriteSlot failed: {}", e);
                self.token_error.clone().unwrap_or_else(ExitToken::error)
            }
            None => ExitToken::error(),
        }
    }
}
