//! Error taxonomy for the engine and its collaborators

use thiserror::Error;

/// Errors produced while evaluating a tick
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("insufficient history: need {needed} bars, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("invalid zone: {0}")]
    InvalidZone(String),

    #[error("modification rejected for ticket {ticket}: {reason}")]
    ModificationRejected { ticket: u64, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Startup configuration failures. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(String),

    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("unknown strategy '{name}'. Available: {available}")]
    UnknownStrategy { name: String, available: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by the broker/terminal collaborator
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected (code {code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("unknown ticket {0}")]
    UnknownTicket(u64),
}

