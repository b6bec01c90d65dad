use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator};
use crate::error::BonsaiResult;
use crate::memory::MemorySlot;

/// Increments the `Count` slot; ends with `success.limit` once it reaches `#_LIMIT`.
#[derive(Debug, Default)]
pub struct Counter {
    limit: i64,
    slot: Option<MemorySlot<i64>>,
    token_success: Option<ExitToken>,
    token_limit: Option<ExitToken>,
    token_error: Option<ExitToken>,
}

impl Skill for Counter {
    fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()> {
        self.limit = configurator.request_optional_int("LIMIT", 3)?;
        self.slot = Some(configurator.request_slot("Count")?);
        self.token_success = Some(configurator.request_exit_token(ExitStatus::Success));
        self.token_limit = Some(configurator.request_exit_token_with(ExitStatus::Success, "limit"));
        self.token_error = Some(configurator.request_exit_token(ExitStatus::Error));
        Ok(())
    }

    fn execute(&mut self) -> ExitToken {
        let Some(slot) = &self.slot else {
            return ExitToken::error();
        };

        let count = match slot.recall() {
            Ok(current) => current.unwrap_or(0) + 1,
            Err(e) => {
                tracing::warn!("Counter slot unreadable: {}", e);
                return self.token_error.clone().unwrap_or_else(ExitToken::error);
            }
        };
        if let Err(e) = slot.memorize(&count) {
            tracing::warn!("Counter slot unwritable: {}", e);
            return self.token_error.clone().unwrap_or_else(ExitToken::error);
        }

        if count >= self.limit {
            self.token_limit
                .clone()
                .unwrap_or_else(|| ExitToken::success().with_suffix("limit"))
        } else {
            self.token_success.clone().unwrap_or_else(ExitToken::success)
        }
    }
}
