use crate::core::{ExitStatus, ExitToken, Skill, SkillConfigurator};
use crate::error::BonsaiResult;
use std::time::{Duration, Instant};

const KEY_TIMEOUT: &str = "TIMEOUT";
const DEFAULT_TIMEOUT_MS: i64 = 1000;
const MAX_POLL: Duration = Duration::from_millis(50);

/// Waits `#_TIMEOUT` milliseconds, then succeeds.
#[derive(Debug)]
pub struct Wait {
    timeout: Duration,
    started: Option<Instant>,
    token_success: ExitToken,
}

impl Default for Wait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS as u64),
            started: None,
            token_success: ExitToken::success(),
        }
    }
}

impl Skill for Wait {
    fn configure(&mut self, configurator: &mut SkillConfigurator) -> BonsaiResult<()> {
        let timeout = configurator.request_optional_int(KEY_TIMEOUT, DEFAULT_TIMEOUT_MS)?;
        if timeout < 0 {
            return Err(crate::error::BonsaiError::configuration(
                configurator.state_id(),
                KEY_TIMEOUT,
                "timeout must not be negative",
            ));
        }
        self.timeout = Duration::from_millis(timeout as u64);
        self.token_success = configurator.request_exit_token(ExitStatus::Success);
        Ok(())
    }

    fn init(&mut self) -> bool {
        self.started = Some(Instant::now());
        true
    }

    fn execute(&mut self) -> ExitToken {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        if elapsed >= self.timeout {
            return self.token_success.clone();
        }
        ExitToken::loop_with((self.timeout - elapsed).min(MAX_POLL))
    }
}
