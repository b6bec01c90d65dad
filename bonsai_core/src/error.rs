//! Error types shared by every BONSAI crate.

use std::sync::PoisonError;
use thiserror::Error;

/// Convenient result alias used across bonsai_core.
pub type BonsaiResult<T> = Result<T, BonsaiError>;

/// The one error type that crosses module boundaries in bonsai_core.
#[derive(Debug, Error)]
pub enum BonsaiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SCXML parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A skill could not be configured for the state it is bound to.
    #[error("Skill configuration failed in state '{state}' for '{key}': {message}")]
    Configuration {
        state: String,
        key: String,
        message: String,
    },

    #[error("Invalid state id '{0}'")]
    StateId(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Loading failed: {0}")]
    Loading(String),

    #[error("Skill error: {0}")]
    Skill(String),

    #[error("No state machine loaded")]
    NotLoaded,

    #[error("Invalid controller state: {0}")]
    InvalidState(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl BonsaiError {
    pub fn config(msg: impl Into<String>) -> Self {
        BonsaiError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BonsaiError::Internal(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        BonsaiError::Parse(msg.into())
    }

    /// Skill configuration failure for `key` in `state`.
    pub fn configuration(
        state: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        BonsaiError::Configuration {
            state: state.into(),
            key: key.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for BonsaiError {
    fn from(err: serde_json::Error) -> Self {
        BonsaiError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for BonsaiError {
    fn from(err: serde_yaml::Error) -> Self {
        BonsaiError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for BonsaiError {
    fn from(err: toml::de::Error) -> Self {
        BonsaiError::Config(err.to_string())
    }
}

impl From<roxmltree::Error> for BonsaiError {
    fn from(err: roxmltree::Error) -> Self {
        BonsaiError::Parse(err.to_string())
    }
}

impl<T> From<PoisonError<T>> for BonsaiError {
    fn from(err: PoisonError<T>) -> Self {
        BonsaiError::Internal(format!("Lock poisoned: {}", err))
    }
}

impl From<reqwest::Error> for BonsaiError {
    fn from(err: reqwest::Error) -> Self {
        BonsaiError::Remote(err.to_string())
    }
}
